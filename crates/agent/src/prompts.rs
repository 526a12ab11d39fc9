//! Prompt text for the execution unit and the planner.

use taskforge_core::execution::ExecutionRequest;
use taskforge_core::knowledge::{CapabilityRecord, KnowledgeSnapshot, PatternRecord};

pub const TASK_COMPLETE_TOOL: &str = "system_task_complete";
pub const REPORT_FAILURE_TOOL: &str = "system_report_failure";

/// Longest tool-record dump sent for fact extraction.
pub const FACT_EXTRACTION_MAX_CHARS: usize = 2000;

pub const ROUTE_SYSTEM: &str = "\
You are the planner of a local task agent. Decide whether the user is asking you to DO something \
that requires running a tool, or is just communicating (sharing information, a preference, a question \
you can answer directly, small talk).
Output ONLY valid JSON. No explanation, no markdown fences.
{\"route\": \"chat\" | \"task\", \"response\": \"<reply if chat, null if task>\"}
- \"chat\": reply naturally in the user's language.
- \"task\": set response to null.
\"I usually use X\" states a preference; it is not a request to launch X.";

pub const SELECTION_SYSTEM: &str = "\
You are the planner of a local task agent. Select the resources needed to build one execution request.
Output ONLY valid JSON. No explanation, no markdown fences.
{
  \"tool_ids\": [\"<tool_name>\", ...],
  \"fact_ids\": [\"<fact_id>\", ...],
  \"format_name\": \"<format_name>\",
  \"strategy_hint\": \"<one sentence>\",
  \"expected_output\": \"<success criterion>\"
}
Rules:
- tool_ids must be exact names from AVAILABLE TOOLS
- fact_ids must be exact ids from AVAILABLE FACTS
- format_name must be an exact name from AVAILABLE OUTPUT FORMATS
- Select only what is necessary.";

pub const FACT_EXTRACTION_SYSTEM: &str = "\
You extract facts. Extract ONLY literal values that appear in these tool execution results.
Output ONLY valid JSON. No explanation, no markdown fences.
{\"facts\": [{\"key\": \"...\", \"category\": \"...\", \"value\": \"...\"}]}
- key: stable snake_case identifier
- value: copied exactly from a tool result, never paraphrased
- category: a short natural category
Only include facts specific to this environment, user, or project. If nothing concrete was observed, \
return {\"facts\": []}.";

pub const LESSON_SYSTEM: &str = "\
You review a completed task and propose reusable knowledge. Every proposal is reviewed by a human \
before it is stored.
Output ONLY valid JSON. No explanation, no markdown fences.
{\"lessons\": [{\"lesson_type\": \"new_fact|correction|new_pattern\", \"content\": { ... }, \"confidence\": 0.0}]}
- new_fact: content = {\"key\": \"...\", \"category\": \"...\", \"value\": \"...\"}
- correction: content = {\"key\": \"...\", \"value\": \"...\"}
- new_pattern: content = {\"pattern_name\": \"...\", \"context_tags\": [...], \"approach\": \"...\"}
- confidence: your honest estimate, 0.0 to 1.0
Only include lessons that are genuinely new or corrective. If nothing, return {\"lessons\": []}.";

pub const FORGE_SYSTEM: &str = "\
You write small sandboxed tools as WebAssembly text modules.
The module must export `memory`, `alloc(len: i32) -> i32` and `execute(ptr: i32, len: i32) -> i32`. \
`execute` receives the JSON arguments as UTF-8 at `ptr` and returns a pointer to a NUL-terminated \
UTF-8 result. No imports are available.
Output ONLY valid JSON. No explanation, no markdown fences.
{
  \"name\": \"<snake_case>\",
  \"description\": \"<one line>\",
  \"parameters_schema\": { JSON schema },
  \"tags\": [\"...\"],
  \"module\": \"(module ...)\",
  \"probes\": [{\"input\": { ... }, \"expect_contains\": \"...\"}]
}
Provide at least one probe the tool must pass.";

/// Instruction text for one execution attempt.
///
/// Built only from the request: nothing from earlier conversations or
/// attempts leaks in beyond the attempt number.
pub fn execution_instructions(request: &ExecutionRequest, tool_lines: &[String]) -> String {
    let mut parts = vec![
        "You are an execution unit. Complete the objective using only the tools listed below.".to_string(),
        String::new(),
        format!("OBJECTIVE: {}", request.objective),
        String::new(),
        "AVAILABLE TOOLS:".to_string(),
    ];
    parts.extend(tool_lines.iter().map(|l| format!("- {l}")));

    if !request.context_facts.is_empty() {
        parts.push(String::new());
        parts.push("CONTEXT FACTS:".to_string());
        parts.extend(request.context_facts.iter().map(|f| format!("- {f}")));
    }

    if !request.strategy_hint.is_empty() {
        parts.push(String::new());
        parts.push(format!("STRATEGY: {}", request.strategy_hint));
    }

    parts.push(String::new());
    parts.push(format!(
        "OUTPUT FORMAT REQUIRED ({}): {}",
        request.format_name, request.output_schema
    ));

    if request.attempt > 1 {
        parts.push(String::new());
        parts.push(format!(
            "ATTEMPT: {} (earlier attempts failed; try a different approach)",
            request.attempt
        ));
    }

    parts.push(String::new());
    parts.push(format!(
        "When the objective is done, call {TASK_COMPLETE_TOOL} with the final output. \
         If it cannot be done, call {REPORT_FAILURE_TOOL} with the reason."
    ));
    parts.join("\n")
}

/// User message for the selection step.
pub fn selection_prompt(
    objective: &str,
    snapshot: &KnowledgeSnapshot,
    fact_preview_chars: usize,
    patterns: &[&PatternRecord],
    reliability: &[(&CapabilityRecord, f64)],
    previous_error: Option<&str>,
    attempt: u32,
) -> String {
    let formats: Vec<String> = snapshot
        .formats
        .iter()
        .map(|f| format!("{}: {}", f.name, f.schema))
        .collect();

    let mut parts = vec![
        format!("USER INTENT: {objective}"),
        String::new(),
        format!("AVAILABLE TOOLS:\n{}", bulleted(&snapshot.tool_index())),
        String::new(),
        format!("AVAILABLE FACTS (id | key = preview):\n{}", bulleted(&snapshot.fact_index(fact_preview_chars))),
        String::new(),
        format!("AVAILABLE OUTPUT FORMATS:\n{}", bulleted(&formats)),
        String::new(),
        format!(
            "RELEVANT PATTERNS:\n{}",
            bulleted(
                &patterns
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.approach))
                    .collect::<Vec<_>>()
            )
        ),
    ];

    if !reliability.is_empty() {
        parts.push(String::new());
        parts.push("TOOL RELIABILITY (from execution history, prefer reliable tools):".to_string());
        for (record, ratio) in reliability {
            let mut line = format!(
                "- {}: {:.0}% reliability ({}/{} calls",
                record.tool,
                ratio * 100.0,
                record.successes,
                record.total_calls
            );
            if let Some(failure) = &record.last_failure {
                let short: String = failure.chars().take(60).collect();
                line.push_str(&format!(", last failure: {short}"));
            }
            line.push(')');
            parts.push(line);
        }
    }

    if let Some(error) = previous_error.filter(|_| attempt > 1) {
        parts.push(String::new());
        parts.push(format!("PREVIOUS ATTEMPT FAILED (attempt {}):", attempt - 1));
        parts.push(format!("Error: {error}"));
        parts.push("Adjust your tool/fact selection to avoid this error.".to_string());
    }

    parts.join("\n")
}

fn bulleted(lines: &[String]) -> String {
    if lines.is_empty() {
        return "None".to_string();
    }
    lines.iter().map(|l| format!("- {l}")).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn request(attempt: u32) -> ExecutionRequest {
        ExecutionRequest {
            objective: "list files in /tmp".into(),
            tool_ids: BTreeSet::from(["list_directory".to_string()]),
            context_facts: vec!["os_name = linux".into()],
            format_name: "plain_text".into(),
            output_schema: serde_json::json!({"result": "str"}),
            strategy_hint: "list the directory".into(),
            max_iterations: 10,
            attempt,
        }
    }

    #[test]
    fn instructions_carry_every_section() {
        let text = execution_instructions(&request(1), &["list_directory: List a directory".into()]);
        for section in ["OBJECTIVE:", "AVAILABLE TOOLS:", "CONTEXT FACTS:", "STRATEGY:", "OUTPUT FORMAT REQUIRED"] {
            assert!(text.contains(section), "missing {section}");
        }
        assert!(!text.contains("ATTEMPT:"));
        assert!(text.contains(TASK_COMPLETE_TOOL));
    }

    #[test]
    fn retries_mention_attempt_number() {
        let text = execution_instructions(&request(3), &[]);
        assert!(text.contains("ATTEMPT: 3"));
    }

    #[test]
    fn selection_prompt_reports_reliability_and_previous_error() {
        let now = Utc::now();
        let cap = CapabilityRecord {
            tool: "shell".into(),
            total_calls: 4,
            successes: 1,
            last_failure: Some("Error: permission denied".into()),
            provenance: taskforge_core::knowledge::Provenance::Calibration,
            created_at: now,
            updated_at: now,
        };
        let snapshot = KnowledgeSnapshot::default();
        let text = selection_prompt("x", &snapshot, 80, &[], &[(&cap, 0.25)], Some("[stagnation] same output"), 2);
        assert!(text.contains("shell: 25% reliability (1/4 calls, last failure: Error: permission denied)"));
        assert!(text.contains("PREVIOUS ATTEMPT FAILED (attempt 1)"));
        assert!(text.contains("[stagnation] same output"));
        assert!(text.contains("AVAILABLE TOOLS:\nNone"));
    }

    #[test]
    fn first_attempt_has_no_failure_section() {
        let text = selection_prompt("x", &KnowledgeSnapshot::default(), 80, &[], &[], Some("old"), 1);
        assert!(!text.contains("PREVIOUS ATTEMPT FAILED"));
    }
}
