//! Model-assisted planning: routing, selection, fact extraction, and lesson
//! inference.
//!
//! Every call asks for a JSON reply and has a fallback for unparseable or
//! failed replies, so planning itself never fails an objective.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use taskforge_core::execution::{ExecutionResult, Selection, ToolOutput, default_format_name};
use taskforge_core::knowledge::{FactDraft, KnowledgeSnapshot, Lesson, PatternDraft, PatternRecord};
use taskforge_core::message::Message;
use taskforge_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

use crate::json::parse_json;
use crate::learning::FactCandidate;
use crate::prompts;

/// Patterns offered to the planner per objective.
pub const PATTERN_LIMIT: usize = 2;

const OBJECTIVE_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Conversational; answer directly with this reply.
    Chat(String),
    /// Actionable; go through select → assemble → execute.
    Task,
}

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub temperature: f32,
    pub fact_preview_chars: usize,
    pub min_sample_size: u64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            fact_preview_chars: 80,
            min_sample_size: 2,
        }
    }
}

pub struct Planner {
    provider: Arc<dyn Provider>,
    model: String,
    settings: PlannerSettings,
}

#[derive(Deserialize)]
struct RouteReply {
    #[serde(default)]
    route: String,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Deserialize)]
struct FactsReply {
    #[serde(default)]
    facts: Vec<FactCandidate>,
}

#[derive(Deserialize)]
struct LessonsReply {
    #[serde(default)]
    lessons: Vec<RawLesson>,
}

#[derive(Deserialize)]
struct RawLesson {
    lesson_type: String,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default)]
    confidence: f64,
}

#[derive(Deserialize)]
struct RawPattern {
    pattern_name: String,
    #[serde(default)]
    context_tags: Vec<String>,
    approach: String,
}

impl Planner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            settings: PlannerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Conversational or actionable. Anything unparseable is a task.
    pub async fn route(&self, objective: &str) -> Route {
        let preview: String = objective.chars().take(OBJECTIVE_PREVIEW_CHARS).collect();
        let Some(reply) = self.call_json::<RouteReply>(prompts::ROUTE_SYSTEM, &preview).await else {
            return Route::Task;
        };
        match (reply.route.trim(), reply.response) {
            ("chat", Some(text)) if !text.trim().is_empty() => Route::Chat(text.trim().to_string()),
            _ => Route::Task,
        }
    }

    /// Patterns offered to the planner for this objective.
    pub fn relevant_patterns<'a>(&self, snapshot: &'a KnowledgeSnapshot, objective: &str) -> Vec<&'a PatternRecord> {
        snapshot
            .pattern_matches(objective)
            .into_iter()
            .take(PATTERN_LIMIT)
            .collect()
    }

    /// Choose tools, facts, and a format from the compact indices.
    ///
    /// Falls back to the first indexed tool with `plain_text`.
    pub async fn select(
        &self,
        objective: &str,
        snapshot: &KnowledgeSnapshot,
        previous_error: Option<&str>,
        attempt: u32,
    ) -> Selection {
        let patterns = self.relevant_patterns(snapshot, objective);
        let reliability = snapshot.capability_profile(self.settings.min_sample_size);
        let prompt = prompts::selection_prompt(
            objective,
            snapshot,
            self.settings.fact_preview_chars,
            &patterns,
            &reliability,
            previous_error,
            attempt,
        );
        match self.call_json::<Selection>(prompts::SELECTION_SYSTEM, &prompt).await {
            Some(selection) => selection,
            None => default_selection(snapshot),
        }
    }

    /// Ask which literal values in the outputs are worth keeping.
    ///
    /// Only successful outputs are shown. The answer is unverified here; the
    /// verified-fact path checks every value against the outputs again.
    pub async fn extract_facts(&self, outputs: &[ToolOutput]) -> Vec<FactCandidate> {
        let records: Vec<serde_json::Value> = outputs
            .iter()
            .filter(|o| !o.is_error && !o.result.is_empty())
            .map(|o| serde_json::json!({"tool": o.tool, "args": o.arguments, "result": o.result}))
            .collect();
        if records.is_empty() {
            return Vec::new();
        }
        let dump: String = serde_json::Value::Array(records)
            .to_string()
            .chars()
            .take(prompts::FACT_EXTRACTION_MAX_CHARS)
            .collect();
        let prompt = format!("TOOL EXECUTION RECORDS:\n{dump}");
        self.call_json::<FactsReply>(prompts::FACT_EXTRACTION_SYSTEM, &prompt)
            .await
            .map(|r| r.facts)
            .unwrap_or_default()
    }

    /// Ask for reusable lessons from a finished task. Malformed entries are skipped.
    pub async fn infer_lessons(&self, objective: &str, tools_used: &[String], result: &ExecutionResult) -> Vec<Lesson> {
        let output = result
            .final_output
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_else(|| "null".into());
        let prompt = format!(
            "TASK: {objective}\nTOOLS USED: {}\nRESULT: {output}",
            tools_used.join(", ")
        );
        let Some(reply) = self.call_json::<LessonsReply>(prompts::LESSON_SYSTEM, &prompt).await else {
            return Vec::new();
        };
        reply
            .lessons
            .into_iter()
            .filter_map(|raw| match to_lesson(raw) {
                Ok(lesson) => Some(lesson),
                Err(reason) => {
                    warn!(reason = %reason, "Skipped malformed lesson");
                    None
                }
            })
            .collect()
    }

    async fn call_json<T: DeserializeOwned>(&self, system: &str, user: &str) -> Option<T> {
        let request = ProviderRequest::new(&self.model, vec![Message::system(system), Message::user(user)])
            .with_temperature(self.settings.temperature)
            .with_json_mode();
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Planner call failed, using fallback");
                return None;
            }
        };
        match parse_json::<T>(&response.message.content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Planner returned invalid JSON, using fallback");
                debug!(reply = %response.message.content, "Unparseable planner reply");
                None
            }
        }
    }
}

/// First indexed tool with `plain_text`, used when selection can't be parsed.
pub fn default_selection(snapshot: &KnowledgeSnapshot) -> Selection {
    Selection {
        tool_ids: snapshot.tools.first().map(|t| vec![t.name.clone()]).unwrap_or_default(),
        fact_ids: Vec::new(),
        format_name: default_format_name(),
        strategy_hint: String::new(),
        expected_output: String::new(),
    }
}

fn to_lesson(raw: RawLesson) -> Result<Lesson, String> {
    let confidence = raw.confidence;
    match raw.lesson_type.as_str() {
        kind @ ("new_fact" | "correction") => {
            let mut draft: FactDraft =
                serde_json::from_value(raw.content).map_err(|e| format!("{kind} content: {e}"))?;
            if draft.key.trim().is_empty() || draft.value.trim().is_empty() {
                return Err(format!("{kind} needs a key and a value"));
            }
            if draft.source.is_empty() {
                draft.source = "lesson_inference".into();
            }
            Ok(Lesson::fact(kind == "correction", draft, confidence))
        }
        "new_pattern" => {
            let pattern: RawPattern =
                serde_json::from_value(raw.content).map_err(|e| format!("new_pattern content: {e}"))?;
            if pattern.pattern_name.trim().is_empty() || pattern.approach.trim().is_empty() {
                return Err("new_pattern needs a name and an approach".into());
            }
            Ok(Lesson::pattern(
                PatternDraft {
                    name: pattern.pattern_name,
                    tags: pattern.context_tags,
                    approach: pattern.approach,
                },
                confidence,
            ))
        }
        other => Err(format!("unknown lesson type '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use chrono::Utc;
    use taskforge_core::execution::ResourceUsage;
    use taskforge_core::knowledge::{LessonContent, LessonKind, Provenance, ToolImpl, ToolRecord};

    fn planner(replies: &[&str]) -> (Planner, Arc<SequentialMockProvider>) {
        let provider = Arc::new(SequentialMockProvider::new(
            replies.iter().map(|r| make_text_response(r)).collect(),
        ));
        (Planner::new(provider.clone(), "mock-model"), provider)
    }

    fn snapshot() -> KnowledgeSnapshot {
        KnowledgeSnapshot {
            tools: vec![ToolRecord {
                id: "t-1".into(),
                name: "list_directory".into(),
                tags: vec![],
                summary: "List a directory".into(),
                input_schema: serde_json::json!({}),
                implementation: ToolImpl::Registered,
                provenance: Provenance::Seeded,
                created_at: Utc::now(),
            }],
            ..Default::default()
        }
    }

    fn finished(output: serde_json::Value) -> ExecutionResult {
        ExecutionResult {
            success: true,
            matched_expected: true,
            tool_outputs: vec![],
            final_output: Some(output),
            attempt: 1,
            error: None,
            stagnation_triggered: false,
            usage: ResourceUsage::default(),
        }
    }

    #[tokio::test]
    async fn route_chat_and_task() {
        let (p, _) = planner(&[r#"{"route": "chat", "response": "Noted, you use vim."}"#]);
        assert_eq!(p.route("I usually use vim").await, Route::Chat("Noted, you use vim.".into()));

        let (p, _) = planner(&[r#"{"route": "task", "response": null}"#]);
        assert_eq!(p.route("list files in /tmp").await, Route::Task);
    }

    #[tokio::test]
    async fn unparseable_route_is_a_task() {
        let (p, _) = planner(&["I think this is a task?"]);
        assert_eq!(p.route("do it").await, Route::Task);
    }

    #[tokio::test]
    async fn planner_requests_json_mode() {
        let (p, provider) = planner(&[r#"{"route": "task"}"#]);
        p.route("x").await;
        let sent = &provider.requests()[0];
        assert!(sent.json_mode);
        assert!(sent.tools.is_empty());
    }

    #[tokio::test]
    async fn select_parses_reply() {
        let (p, _) = planner(&[
            "```json\n{\"tool_ids\": [\"list_directory\"], \"fact_ids\": [], \"format_name\": \"plain_text\", \"strategy_hint\": \"list /tmp\"}\n```",
        ]);
        let selection = p.select("list files in /tmp", &snapshot(), None, 1).await;
        assert_eq!(selection.tool_ids, vec!["list_directory"]);
        assert_eq!(selection.strategy_hint, "list /tmp");
    }

    #[tokio::test]
    async fn select_falls_back_to_first_tool() {
        let (p, _) = planner(&["not json"]);
        let selection = p.select("x", &snapshot(), None, 1).await;
        assert_eq!(selection, default_selection(&snapshot()));
        assert_eq!(selection.tool_ids, vec!["list_directory"]);
        assert_eq!(selection.format_name, "plain_text");
    }

    #[tokio::test]
    async fn extract_facts_skips_model_when_only_errors() {
        let (p, provider) = planner(&[]);
        let outputs = vec![ToolOutput {
            tool: "shell".into(),
            arguments: serde_json::json!({}),
            result: "Error: denied".into(),
            is_error: true,
        }];
        assert!(p.extract_facts(&outputs).await.is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn extract_facts_parses_candidates() {
        let (p, _) = planner(&[r#"{"facts": [{"key": "tmp_contents", "category": "filesystem", "value": "a.txt"}]}"#]);
        let outputs = vec![ToolOutput {
            tool: "list_directory".into(),
            arguments: serde_json::json!({"path": "/tmp"}),
            result: "a.txt".into(),
            is_error: false,
        }];
        let facts = p.extract_facts(&outputs).await;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "tmp_contents");
    }

    #[tokio::test]
    async fn infer_lessons_keeps_wellformed_entries() {
        let (p, _) = planner(&[r#"{"lessons": [
            {"lesson_type": "new_pattern", "content": {"pattern_name": "list_first", "context_tags": ["files"], "approach": "list before reading"}, "confidence": 0.7},
            {"lesson_type": "correction", "content": {"key": "python_version", "value": "3.12"}, "confidence": 0.9},
            {"lesson_type": "new_fact", "content": {"value": "missing key"}, "confidence": 0.5},
            {"lesson_type": "rumor", "content": {}, "confidence": 1.0}
        ]}"#]);
        let lessons = p.infer_lessons("list files", &["list_directory".into()], &finished(serde_json::json!("a.txt"))).await;
        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0].kind(), LessonKind::NewPattern);
        assert_eq!(lessons[1].kind(), LessonKind::Correction);
        match lessons[1].content() {
            LessonContent::Fact(draft) => {
                assert_eq!(draft.category, "general");
                assert_eq!(draft.source, "lesson_inference");
            }
            LessonContent::Pattern(_) => panic!("expected fact"),
        }
    }

    #[tokio::test]
    async fn provider_failure_yields_no_lessons() {
        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(
            taskforge_core::error::ProviderError::Network("down".into()),
        )]));
        let p = Planner::new(provider, "mock-model");
        assert!(p.infer_lessons("x", &[], &finished(serde_json::json!(null))).await.is_empty());
    }
}
