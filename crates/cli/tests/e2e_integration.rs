//! End-to-end tests: the orchestrator against a real SQLite knowledge store.
//!
//! The model is scripted; tools, store, calibration, and learning are real.

use std::sync::{Arc, Mutex};

use taskforge_agent::{EdgeKind, MissionTree, NodeStatus, Orchestrator, Outcome};
use taskforge_config::{AppConfig, AutonomyConfig};
use taskforge_core::error::{ProviderError, ToolError};
use taskforge_core::execution::FailureKind;
use taskforge_core::knowledge::{KnowledgeStore, Provenance};
use taskforge_core::message::{Message, MessageToolCall};
use taskforge_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use taskforge_core::tool::{Tool, ToolRegistry, ToolResult};
use taskforge_knowledge::{SqliteStore, bootstrap};
use taskforge_tools::default_registry;

// ── Scripted provider ────────────────────────────────────────────────────

struct ScriptedProvider {
    responses: Vec<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        self.responses
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::MalformedResponse(format!("script exhausted at call #{index}")))
    }
}

fn text(body: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(body),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "e2e-model".into(),
        metadata: serde_json::Map::new(),
    }
}

fn calls(name: &str, args: serde_json::Value) -> ProviderResponse {
    let mut response = text("");
    response.message.tool_calls = vec![MessageToolCall {
        id: format!("call_{name}"),
        name: name.into(),
        arguments: args.to_string(),
    }];
    response
}

fn route_task() -> ProviderResponse {
    text(r#"{"route": "task", "response": null}"#)
}

fn select(tool: &str) -> ProviderResponse {
    text(&format!(
        r#"{{"tool_ids": ["{tool}"], "fact_ids": [], "format_name": "plain_text", "strategy_hint": "", "expected_output": ""}}"#
    ))
}

// ── A tool that always refuses ───────────────────────────────────────────

struct RefusingTool {
    replies: Mutex<Vec<String>>,
}

impl RefusingTool {
    fn always(reply: &str) -> Arc<Self> {
        Self::sequence(&[reply])
    }

    /// Replies in order; the last one repeats.
    fn sequence(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
        })
    }
}

#[async_trait::async_trait]
impl Tool for RefusingTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop().unwrap_or_default()
        } else {
            replies.last().cloned().unwrap_or_default()
        };
        Ok(ToolResult::failed(reply))
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    workdir: std::path::PathBuf,
    store: Arc<SqliteStore>,
    registry: Arc<ToolRegistry>,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("work");
    std::fs::create_dir_all(&workdir).unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("knowledge.db")).await.unwrap());
    let registry = Arc::new(default_registry(&AutonomyConfig::default()));
    Harness {
        _dir: dir,
        workdir,
        store,
        registry,
    }
}

impl Harness {
    async fn orchestrator(&self, provider: Arc<ScriptedProvider>) -> Orchestrator {
        bootstrap(self.store.as_ref(), &self.registry, false).await.unwrap();
        let mut config = AppConfig::default();
        config.default_model = "e2e-model".into();
        Orchestrator::from_config(&config, provider, self.registry.clone(), self.store.clone())
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn listing_succeeds_and_writes_a_verified_fact() {
    let h = harness().await;
    std::fs::write(h.workdir.join("a.txt"), "").unwrap();
    std::fs::write(h.workdir.join("b.txt"), "").unwrap();
    let path = h.workdir.display().to_string();

    let provider = ScriptedProvider::new(vec![
        route_task(),
        select("list_directory"),
        calls("list_directory", serde_json::json!({"path": path})),
        calls("system_task_complete", serde_json::json!({"output": "a.txt\nb.txt"})),
        text(r#"{"facts": [{"key": "tmp_contents", "category": "filesystem", "value": "a.txt\nb.txt"}]}"#),
        text(r#"{"lessons": []}"#),
    ]);
    let orchestrator = h.orchestrator(provider.clone()).await;

    let outcome = orchestrator.process("list files in the work directory").await.unwrap();
    let Outcome::Completed(report) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(report.attempts, 1);
    assert_eq!(report.tool_outputs.len(), 1);
    assert_eq!(report.tool_outputs[0].tool, "list_directory");
    assert_eq!(report.tool_outputs[0].result, "a.txt\nb.txt");
    assert!(report.matched_expected);

    let fact = h.store.fact_by_key("tmp_contents").await.unwrap().unwrap();
    assert_eq!(fact.value, "a.txt\nb.txt");
    assert_eq!(fact.confidence, 1.0);
    assert_eq!(fact.provenance, Provenance::VerifiedExecution);

    let cap = h.store.capability("list_directory").await.unwrap().unwrap();
    assert_eq!((cap.total_calls, cap.successes), (1, 1));
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn identical_errors_trigger_stagnation_on_the_third_step() {
    let h = harness().await;
    h.registry.register(RefusingTool::always("permission denied"));

    let delete = || calls("file_delete", serde_json::json!({"path": "/etc/hosts"}));
    let provider = ScriptedProvider::new(vec![
        route_task(),
        select("file_delete"),
        delete(),
        delete(),
        delete(),
        // later attempts fail at assembly
        select("missing_tool"),
        select("missing_tool"),
    ]);
    let orchestrator = h.orchestrator(provider.clone()).await;

    let mut tree = MissionTree::new();
    let root = tree.add_root("delete /etc/hosts");
    let outcome = orchestrator.process_node(&mut tree, root).await.unwrap();
    let Outcome::CircuitBroken(broken) = outcome else {
        panic!("expected circuit break");
    };
    assert_eq!(broken.attempts, 3);
    let first = tree.node(root).unwrap();
    assert!(first.last_error.as_deref().unwrap().starts_with("[stagnation]"));
    assert_eq!(tree.node(root).unwrap().status, NodeStatus::CircuitBroken);
    assert_eq!(tree.children_by_edge(root, EdgeKind::Retry).len(), 2);

    // Attempt 1 stopped after exactly three dispatches, well under max_iterations.
    let cap = h.store.capability("file_delete").await.unwrap().unwrap();
    assert_eq!((cap.total_calls, cap.successes), (3, 0));
    assert_eq!(cap.last_failure.as_deref(), Some("permission denied"));
    assert_eq!(provider.calls(), 7);
}

#[tokio::test]
async fn three_differing_failures_break_the_circuit() {
    let h = harness().await;
    h.registry.register(RefusingTool::sequence(&[
        "Error: permission denied",
        "Error: file is locked",
        "Error: read-only file system",
    ]));

    let attempt = || {
        [
            select("file_delete"),
            calls("file_delete", serde_json::json!({"path": "/var/log/old.log"})),
            calls("system_report_failure", serde_json::json!({"reason": "the delete keeps failing"})),
        ]
    };
    let mut script = vec![route_task()];
    for _ in 0..3 {
        script.extend(attempt());
    }
    let provider = ScriptedProvider::new(script);
    let orchestrator = h.orchestrator(provider.clone()).await;

    let before = h.store.capability("file_delete").await.unwrap();
    assert!(before.is_none());

    let outcome = orchestrator.process("delete the old log").await.unwrap();
    let Outcome::CircuitBroken(broken) = outcome else {
        panic!("expected circuit break");
    };
    assert_eq!(broken.attempts, 3);
    assert!(broken.requires_intervention);
    assert_eq!(broken.last_error.kind, FailureKind::ToolExecution);

    let json = serde_json::to_value(&broken).unwrap();
    assert_eq!(json["attempts"], 3);
    assert_eq!(json["requires_intervention"], true);

    let cap = h.store.capability("file_delete").await.unwrap().unwrap();
    assert_eq!(cap.total_calls, 3);
    assert_eq!(cap.successes, 0);
    assert_eq!(cap.last_failure.as_deref(), Some("Error: read-only file system"));

    // Nothing was learned from failed attempts.
    assert!(h.store.pending_lessons().await.unwrap().is_empty());
    assert!(h.store.fact_by_key("tmp_contents").await.unwrap().is_none());
}

#[tokio::test]
async fn knowledge_survives_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("knowledge.db");
    {
        let store = SqliteStore::open(&db).await.unwrap();
        let registry = default_registry(&AutonomyConfig::default());
        bootstrap(&store, &registry, false).await.unwrap();
        store
            .record_observation(&taskforge_core::knowledge::Observation::success("shell"))
            .await
            .unwrap();
    }
    let store = SqliteStore::open(&db).await.unwrap();
    let cap = store.capability("shell").await.unwrap().unwrap();
    assert_eq!(cap.total_calls, 1);
    assert_eq!(cap.provenance, Provenance::Calibration);
    assert!(store.formats().await.unwrap().iter().any(|f| f.name == "plain_text"));
}
