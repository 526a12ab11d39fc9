//! Execution request/result contracts shared by the assembler, the
//! execution unit, and the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::provider::Usage;

/// What the planner picked from the compact indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub tool_ids: Vec<String>,
    #[serde(default)]
    pub fact_ids: Vec<String>,
    #[serde(default = "default_format_name")]
    pub format_name: String,
    #[serde(default)]
    pub strategy_hint: String,
    /// Planner's description of a good result; reported, not enforced.
    #[serde(default)]
    pub expected_output: String,
}

pub fn default_format_name() -> String {
    "plain_text".to_string()
}

/// A fully resolved, self-contained unit of work.
///
/// Built only by the request assembler and never mutated afterwards; the
/// execution unit borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub objective: String,
    pub tool_ids: BTreeSet<String>,
    pub context_facts: Vec<String>,
    pub format_name: String,
    pub output_schema: serde_json::Value,
    pub strategy_hint: String,
    pub max_iterations: u32,
    pub attempt: u32,
}

/// One dispatched tool call and its literal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub result: String,
    /// The call failed, was rejected, or timed out.
    #[serde(default)]
    pub is_error: bool,
}

/// Why an attempt (or the whole objective) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Selection referenced unknown records.
    Assembly,
    /// The model gave up after tool errors, or the step budget ran out.
    ToolExecution,
    /// Identical state repeated across the stagnation window.
    Stagnation,
    /// The model provider failed.
    Provider,
    /// The attempt ceiling was reached.
    CircuitBroken,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assembly => "assembly",
            Self::ToolExecution => "tool_execution",
            Self::Stagnation => "stagnation",
            Self::Provider => "provider",
            Self::CircuitBroken => "circuit_broken",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub iterations: u32,
    pub tool_calls: u32,
    pub tokens: Usage,
}

/// What one execution attempt produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub matched_expected: bool,
    pub tool_outputs: Vec<ToolOutput>,
    pub final_output: Option<serde_json::Value>,
    pub attempt: u32,
    pub error: Option<ExecutionFailure>,
    pub stagnation_triggered: bool,
    pub usage: ResourceUsage,
}

impl ExecutionResult {
    /// A failed attempt that never reached a tool (assembly or planning).
    pub fn not_started(attempt: u32, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            matched_expected: false,
            tool_outputs: Vec::new(),
            final_output: None,
            attempt,
            error: Some(ExecutionFailure {
                kind,
                message: message.into(),
            }),
            stagnation_triggered: false,
            usage: ResourceUsage::default(),
        }
    }

    /// One-line summary used in retry prompts and lesson inference.
    pub fn summary(&self) -> String {
        match (&self.error, &self.final_output) {
            (Some(err), _) => err.to_string(),
            (None, Some(output)) => {
                let text = match output {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                text.chars().take(300).collect()
            }
            (None, None) => "no output".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_defaults_to_plain_text() {
        let selection: Selection = serde_json::from_str(r#"{"tool_ids":["shell"]}"#).unwrap();
        assert_eq!(selection.format_name, "plain_text");
        assert!(selection.fact_ids.is_empty());
    }

    #[test]
    fn failure_summary_carries_kind() {
        let result = ExecutionResult::not_started(2, FailureKind::Assembly, "unresolved tool reference 'x'");
        assert!(!result.success);
        assert_eq!(result.attempt, 2);
        assert_eq!(result.summary(), "[assembly] unresolved tool reference 'x'");
    }

    #[test]
    fn success_summary_unwraps_strings() {
        let result = ExecutionResult {
            success: true,
            matched_expected: true,
            tool_outputs: vec![],
            final_output: Some(serde_json::json!("a.txt")),
            attempt: 1,
            error: None,
            stagnation_triggered: false,
            usage: ResourceUsage::default(),
        };
        assert_eq!(result.summary(), "a.txt");
    }
}
