//! Request assembly: selection + knowledge snapshot → execution request.
//!
//! Pure plumbing. Every identifier in the selection is resolved against the
//! snapshot; the first one that does not resolve fails the assembly. No model
//! calls, no I/O, deterministic for identical inputs.

use std::collections::BTreeSet;
use taskforge_core::error::{AssemblyError, RecordKind};
use taskforge_core::execution::{ExecutionRequest, Selection, default_format_name};
use taskforge_core::knowledge::KnowledgeSnapshot;

pub fn assemble(
    objective: &str,
    selection: &Selection,
    snapshot: &KnowledgeSnapshot,
    attempt: u32,
    max_iterations: u32,
) -> Result<ExecutionRequest, AssemblyError> {
    if selection.tool_ids.is_empty() {
        return Err(AssemblyError::EmptySelection);
    }

    let mut tool_ids = BTreeSet::new();
    for id in &selection.tool_ids {
        let record = snapshot.tool(id).ok_or_else(|| unresolved(RecordKind::Tool, id))?;
        tool_ids.insert(record.name.clone());
    }

    // Duplicate fact ids collapse to one context line, keeping selection order.
    let mut context_facts: Vec<String> = Vec::with_capacity(selection.fact_ids.len());
    for id in &selection.fact_ids {
        let line = snapshot
            .fact(id)
            .ok_or_else(|| unresolved(RecordKind::Fact, id))?
            .context_line();
        if !context_facts.contains(&line) {
            context_facts.push(line);
        }
    }

    let format_name = if selection.format_name.trim().is_empty() {
        default_format_name()
    } else {
        selection.format_name.trim().to_string()
    };
    let format = snapshot
        .format(&format_name)
        .ok_or_else(|| unresolved(RecordKind::Format, &format_name))?;

    Ok(ExecutionRequest {
        objective: objective.to_string(),
        tool_ids,
        context_facts,
        format_name,
        output_schema: format.schema.clone(),
        strategy_hint: selection.strategy_hint.trim().to_string(),
        max_iterations,
        attempt,
    })
}

fn unresolved(kind: RecordKind, id: &str) -> AssemblyError {
    AssemblyError::UnresolvedReference {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskforge_core::knowledge::{FactRecord, FormatRecord, Provenance, ToolImpl, ToolRecord};

    fn snapshot() -> KnowledgeSnapshot {
        let now = Utc::now();
        KnowledgeSnapshot {
            tools: vec![ToolRecord {
                id: "t-1".into(),
                name: "list_directory".into(),
                tags: vec!["filesystem".into()],
                summary: "List a directory".into(),
                input_schema: serde_json::json!({"type": "object"}),
                implementation: ToolImpl::Registered,
                provenance: Provenance::Seeded,
                created_at: now,
            }],
            facts: vec![FactRecord {
                id: "f-1".into(),
                key: "os_name".into(),
                category: "environment".into(),
                value: "linux".into(),
                source: "environment_scan".into(),
                provenance: Provenance::Seeded,
                confidence: 0.9,
                created_at: now,
                updated_at: now,
            }],
            formats: vec![FormatRecord {
                id: "fmt-1".into(),
                name: "plain_text".into(),
                schema: serde_json::json!({"result": "str"}),
                provenance: Provenance::Seeded,
                created_at: now,
            }],
            ..Default::default()
        }
    }

    fn selection(tools: &[&str], facts: &[&str], format: &str) -> Selection {
        Selection {
            tool_ids: tools.iter().map(|s| s.to_string()).collect(),
            fact_ids: facts.iter().map(|s| s.to_string()).collect(),
            format_name: format.into(),
            strategy_hint: " list it ".into(),
            expected_output: String::new(),
        }
    }

    #[test]
    fn resolves_tools_facts_and_format() {
        let request = assemble(
            "list files in /tmp",
            &selection(&["t-1"], &["os_name"], "plain_text"),
            &snapshot(),
            2,
            10,
        )
        .unwrap();
        assert_eq!(request.tool_ids.iter().collect::<Vec<_>>(), vec!["list_directory"]);
        assert_eq!(request.context_facts, vec!["os_name = linux"]);
        assert_eq!(request.output_schema, serde_json::json!({"result": "str"}));
        assert_eq!(request.strategy_hint, "list it");
        assert_eq!(request.attempt, 2);
        assert_eq!(request.max_iterations, 10);
    }

    #[test]
    fn unknown_tool_is_unresolved() {
        let err = assemble("x", &selection(&["web_search"], &[], "plain_text"), &snapshot(), 1, 10).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::UnresolvedReference {
                kind: RecordKind::Tool,
                id: "web_search".into()
            }
        );
    }

    #[test]
    fn unknown_fact_and_format_are_unresolved() {
        let err = assemble("x", &selection(&["list_directory"], &["f-9"], "plain_text"), &snapshot(), 1, 10)
            .unwrap_err();
        assert!(matches!(err, AssemblyError::UnresolvedReference { kind: RecordKind::Fact, .. }));

        let err = assemble("x", &selection(&["list_directory"], &[], "csv_table"), &snapshot(), 1, 10).unwrap_err();
        assert!(matches!(err, AssemblyError::UnresolvedReference { kind: RecordKind::Format, .. }));
    }

    #[test]
    fn empty_selection_fails() {
        let err = assemble("x", &selection(&[], &[], "plain_text"), &snapshot(), 1, 10).unwrap_err();
        assert_eq!(err, AssemblyError::EmptySelection);
    }

    #[test]
    fn blank_format_defaults_to_plain_text() {
        let request = assemble("x", &selection(&["list_directory"], &["f-1", "os_name"], ""), &snapshot(), 1, 5).unwrap();
        assert_eq!(request.format_name, "plain_text");
        assert_eq!(request.context_facts.len(), 1);
    }

    #[test]
    fn assembly_is_deterministic() {
        let sel = selection(&["list_directory"], &["os_name"], "plain_text");
        let snap = snapshot();
        assert_eq!(assemble("x", &sel, &snap, 1, 10).unwrap(), assemble("x", &sel, &snap, 1, 10).unwrap());
    }
}
