//! Shared test helpers: scripted provider and tools.

use async_trait::async_trait;
use std::sync::Mutex;
use taskforge_core::error::{ProviderError, ToolError};
use taskforge_core::message::{Message, MessageToolCall};
use taskforge_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use taskforge_core::tool::{Tool, ToolResult};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and keeps
/// the request for inspection. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Responses and provider errors, in order.
    pub fn scripted(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                responses.len()
            );
        }
        requests.push(request);
        responses[index].clone()
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response carrying tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A response that calls `system_task_complete` with `output`.
pub fn make_complete_response(output: serde_json::Value) -> ProviderResponse {
    make_tool_call_response(vec![make_tool_call(
        "system_task_complete",
        serde_json::json!({ "output": output }),
    )])
}

/// A tool that replays scripted results; the last one repeats forever.
pub struct MockTool {
    name: String,
    results: Mutex<Vec<Result<ToolResult, ToolError>>>,
    calls: Mutex<Vec<serde_json::Value>>,
    ordering_independent: bool,
}

impl MockTool {
    pub fn new(name: &str, results: Vec<Result<ToolResult, ToolError>>) -> Self {
        Self {
            name: name.to_string(),
            results: Mutex::new(results),
            calls: Mutex::new(Vec::new()),
            ordering_independent: false,
        }
    }

    /// Always succeeds with `output`.
    pub fn ok(name: &str, output: &str) -> Self {
        Self::new(name, vec![Ok(ToolResult::ok(output))])
    }

    /// Always fails with `output` as its error text.
    pub fn failing(name: &str, output: &str) -> Self {
        Self::new(name, vec![Ok(ToolResult::failed(output))])
    }

    pub fn parallel(mut self) -> Self {
        self.ordering_independent = true;
        self
    }

    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn ordering_independent(&self) -> bool {
        self.ordering_independent
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(arguments);
        let mut results = self.results.lock().unwrap();
        if results.len() > 1 {
            results.remove(0)
        } else {
            clone_result(&results[0])
        }
    }
}

fn clone_result(result: &Result<ToolResult, ToolError>) -> Result<ToolResult, ToolError> {
    let err = match result {
        Ok(r) => return Ok(r.clone()),
        Err(e) => e,
    };
    Err(match err {
        ToolError::NotFound(name) => ToolError::NotFound(name.clone()),
        ToolError::ExecutionFailed { tool_name, reason } => ToolError::ExecutionFailed {
            tool_name: tool_name.clone(),
            reason: reason.clone(),
        },
        ToolError::Timeout { tool_name, timeout_secs } => ToolError::Timeout {
            tool_name: tool_name.clone(),
            timeout_secs: *timeout_secs,
        },
        ToolError::PermissionDenied { tool_name, reason } => ToolError::PermissionDenied {
            tool_name: tool_name.clone(),
            reason: reason.clone(),
        },
        ToolError::SandboxViolation(reason) => ToolError::SandboxViolation(reason.clone()),
        ToolError::InvalidArguments(reason) => ToolError::InvalidArguments(reason.clone()),
    })
}
