//! Capability forge contracts.
//!
//! A [`Candidate`] is a proposed tool: metadata, a WebAssembly text module,
//! and probe cases. A [`SandboxHarness`] evaluates it in isolation and, only
//! after a passing [`Verdict`], turns it into a runnable [`Tool`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ForgeError;
use crate::knowledge::{ToolImpl, ToolRecord};
use crate::tool::{SYSTEM_TOOL_PREFIX, Tool};

/// One input with a substring the output must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeCase {
    pub input: serde_json::Value,
    pub expect_contains: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters_schema: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    /// WebAssembly text format.
    pub module: String,
    #[serde(default)]
    pub probes: Vec<ProbeCase>,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl Candidate {
    /// Reject candidates that could never be registered.
    pub fn validate(&self) -> Result<(), ForgeError> {
        let invalid = |reason: &str| ForgeError::InvalidCandidate {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(invalid("name must be non-empty snake_case"));
        }
        if self.name.starts_with(SYSTEM_TOOL_PREFIX) {
            return Err(invalid("the system_ prefix is reserved"));
        }
        if self.module.trim().is_empty() {
            return Err(invalid("module is empty"));
        }
        if self.probes.is_empty() {
            return Err(invalid("at least one probe case is required"));
        }
        Ok(())
    }

    /// Rebuild a candidate from a persisted forged tool. Registered tools have no module.
    pub fn from_record(record: &ToolRecord) -> Option<Self> {
        match &record.implementation {
            ToolImpl::Wasm { module } => Some(Self {
                name: record.name.clone(),
                description: record.summary.clone(),
                parameters_schema: record.input_schema.clone(),
                tags: record.tags.clone(),
                module: module.clone(),
                probes: Vec::new(),
            }),
            ToolImpl::Registered => None,
        }
    }
}

/// Result of evaluating a candidate. `passed` is true only with no failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub failures: Vec<String>,
}

impl Verdict {
    pub fn from_failures(failures: Vec<String>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::from_failures(vec![reason.into()])
    }
}

/// A resource-limited environment that can judge and host forged tools.
#[async_trait]
pub trait SandboxHarness: Send + Sync {
    /// Compile the module and run every probe under the sandbox limits.
    async fn evaluate(&self, candidate: &Candidate) -> Verdict;

    /// Build a runnable tool. Callers only do this after a passing verdict
    /// or when re-hydrating a tool that passed in an earlier session.
    fn instantiate(&self, candidate: &Candidate) -> Result<Arc<dyn Tool>, ForgeError>;
}
