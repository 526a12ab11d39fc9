//! The execution unit: a bounded reason-act cycle over an isolated surface.
//!
//! Each call to [`ExecutionUnit::execute`] starts from nothing but the
//! request: a system message built from it, the objective as the only user
//! message, and a tool surface restricted to `request.tool_ids` plus the two
//! signal tools. The cycle ends on a completion or failure signal, on
//! stagnation (K identical step fingerprints), on a provider error, or when
//! `max_iterations` model steps are spent.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use taskforge_config::ExecutionConfig;
use taskforge_core::execution::{
    ExecutionFailure, ExecutionRequest, ExecutionResult, FailureKind, ResourceUsage, ToolOutput,
};
use taskforge_core::message::{Message, MessageToolCall};
use taskforge_core::provider::{Provider, ProviderRequest, ToolDefinition};
use taskforge_core::tool::{Tool, ToolRegistry};
use tracing::{debug, info, warn};

use crate::json::strip_fences;
use crate::prompts::{self, REPORT_FAILURE_TOOL, TASK_COMPLETE_TOOL};
use crate::stagnation::{StagnationDetector, fingerprint};

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// K
    pub stagnation_window: usize,
    pub tool_timeout: Duration,
    pub parallel_tool_calls: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            stagnation_window: config.stagnation_window,
            tool_timeout: Duration::from_secs(config.tool_timeout_secs),
            parallel_tool_calls: config.parallel_tool_calls,
        }
    }
}

pub struct ExecutionUnit {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    settings: ExecutionSettings,
}

enum Signal {
    Complete(serde_json::Value),
    Failure(String),
}

/// A tool call after validation against the surface.
enum Prepared {
    Rejected(ToolOutput),
    Ready {
        tool: Arc<dyn Tool>,
        arguments: serde_json::Value,
    },
}

impl ExecutionUnit {
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            settings: ExecutionSettings::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Run one attempt. Never returns an error: every failure is a result.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let surface = match self.registry.subset(request.tool_ids.iter().map(String::as_str)) {
            Ok(surface) => surface,
            Err(e) => {
                return ExecutionResult::not_started(request.attempt, FailureKind::Assembly, e.to_string());
            }
        };

        let mut definitions = surface.definitions();
        definitions.extend(signal_definitions());
        let tool_lines: Vec<String> = surface
            .all()
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect();

        let mut messages = vec![
            Message::system(prompts::execution_instructions(request, &tool_lines)),
            Message::user(&request.objective),
        ];
        let mut run = Run::new(request.attempt);
        let mut detector = StagnationDetector::new(self.settings.stagnation_window);

        info!(
            attempt = request.attempt,
            tools = ?request.tool_ids,
            max_iterations = request.max_iterations,
            "Starting execution"
        );

        for iteration in 1..=request.max_iterations {
            run.usage.iterations = iteration;
            debug!(attempt = request.attempt, iteration, "Execution step");

            let mut provider_request = ProviderRequest::new(&self.model, messages.clone())
                .with_tools(definitions.clone())
                .with_temperature(self.temperature);
            provider_request.max_tokens = self.max_tokens;

            let response = match self.provider.complete(provider_request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt = request.attempt, iteration, error = %e, "Provider failed");
                    return run.fail(FailureKind::Provider, e.to_string());
                }
            };
            if let Some(usage) = &response.usage {
                run.usage.tokens.add(usage);
            }

            if response.message.tool_calls.is_empty() {
                let text = response.message.content.trim().to_string();
                if text.is_empty() {
                    return run.fail(
                        FailureKind::ToolExecution,
                        "model returned neither tool calls nor text",
                    );
                }
                return run.succeed(text_output(&text), &request.output_schema);
            }

            let calls = response.message.tool_calls.clone();
            messages.push(response.message);

            let mut signal = None;
            let mut dispatchable = Vec::with_capacity(calls.len());
            for call in &calls {
                match call.name.as_str() {
                    TASK_COMPLETE_TOOL => {
                        let args = parse_arguments(call).unwrap_or(serde_json::Value::Null);
                        let output = match args {
                            serde_json::Value::Object(mut map) => {
                                map.remove("output").unwrap_or(serde_json::Value::Object(map))
                            }
                            other => other,
                        };
                        signal.get_or_insert(Signal::Complete(output));
                        messages.push(Message::tool_result(&call.id, "acknowledged"));
                    }
                    REPORT_FAILURE_TOOL => {
                        let reason = parse_arguments(call)
                            .ok()
                            .and_then(|a| a.get("reason").and_then(|r| r.as_str()).map(str::to_string))
                            .unwrap_or_else(|| "model reported failure without a reason".into());
                        signal.get_or_insert(Signal::Failure(reason));
                        messages.push(Message::tool_result(&call.id, "acknowledged"));
                    }
                    _ => dispatchable.push(call),
                }
            }

            let outputs = self.dispatch(&surface, &dispatchable).await;
            for (call, output) in dispatchable.iter().zip(outputs) {
                messages.push(Message::tool_result(&call.id, &output.result));
                run.usage.tool_calls += 1;
                let stagnant = detector.record(fingerprint(&output.tool, &output.result));
                run.outputs.push(output);
                if stagnant {
                    warn!(
                        attempt = request.attempt,
                        iteration,
                        tool = %call.name,
                        window = detector.window(),
                        "Stagnation detected"
                    );
                    let last = run.outputs.last().map(|o| o.result.clone()).unwrap_or_default();
                    let message = format!(
                        "'{}' produced identical output {} times in a row: {}",
                        call.name,
                        detector.window(),
                        last.chars().take(200).collect::<String>()
                    );
                    return run.fail(FailureKind::Stagnation, message);
                }
            }

            match signal {
                Some(Signal::Complete(output)) => return run.succeed(output, &request.output_schema),
                Some(Signal::Failure(reason)) => {
                    info!(attempt = request.attempt, reason = %reason, "Model reported failure");
                    return run.fail(FailureKind::ToolExecution, reason);
                }
                None => {}
            }
        }

        warn!(attempt = request.attempt, "Iteration budget exhausted");
        let message = format!("iteration budget of {} steps exhausted", request.max_iterations);
        run.fail(FailureKind::ToolExecution, message)
    }

    /// Validate and dispatch the calls of one step; outputs keep call order.
    async fn dispatch(&self, surface: &ToolRegistry, calls: &[&MessageToolCall]) -> Vec<ToolOutput> {
        let prepared: Vec<(&MessageToolCall, Prepared)> = calls.iter().map(|c| (*c, prepare(surface, c))).collect();

        let concurrent = self.settings.parallel_tool_calls
            && prepared.len() > 1
            && prepared.iter().all(|(_, p)| match p {
                Prepared::Ready { tool, .. } => tool.ordering_independent(),
                Prepared::Rejected(_) => true,
            });

        if concurrent {
            debug!(calls = prepared.len(), "Dispatching tool calls concurrently");
            join_all(prepared.into_iter().map(|(call, p)| self.run_prepared(call, p))).await
        } else {
            let mut outputs = Vec::with_capacity(prepared.len());
            for (call, p) in prepared {
                outputs.push(self.run_prepared(call, p).await);
            }
            outputs
        }
    }

    async fn run_prepared(&self, call: &MessageToolCall, prepared: Prepared) -> ToolOutput {
        let (tool, arguments) = match prepared {
            Prepared::Rejected(output) => return output,
            Prepared::Ready { tool, arguments } => (tool, arguments),
        };

        let timeout = self.settings.tool_timeout;
        let (result, is_error) = match tokio::time::timeout(timeout, tool.execute(arguments.clone())).await {
            Ok(Ok(result)) => (result.output, !result.success),
            Ok(Err(e)) => (format!("Error: {e}"), true),
            Err(_) => (
                format!("Error: tool '{}' timed out after {}s", call.name, timeout.as_secs()),
                true,
            ),
        };
        if is_error {
            debug!(tool = %call.name, "Tool returned an error result");
        }
        ToolOutput {
            tool: call.name.clone(),
            arguments,
            result,
            is_error,
        }
    }
}

fn prepare(surface: &ToolRegistry, call: &MessageToolCall) -> Prepared {
    let rejected = |arguments: serde_json::Value, reason: String| {
        Prepared::Rejected(ToolOutput {
            tool: call.name.clone(),
            arguments,
            result: format!("Error: {reason}"),
            is_error: true,
        })
    };

    let arguments = match parse_arguments(call) {
        Ok(arguments) => arguments,
        Err(reason) => return rejected(serde_json::Value::String(call.arguments.clone()), reason),
    };
    match surface.get(&call.name) {
        Some(tool) => Prepared::Ready { tool, arguments },
        None => rejected(
            arguments,
            format!("tool '{}' is not available in this execution", call.name),
        ),
    }
}

fn parse_arguments(call: &MessageToolCall) -> Result<serde_json::Value, String> {
    if call.arguments.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    match serde_json::from_str::<serde_json::Value>(&call.arguments) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(_) => Err(format!("arguments for '{}' must be a JSON object", call.name)),
        Err(e) => Err(format!("malformed arguments for '{}': {e}", call.name)),
    }
}

/// A JSON object reply is kept structured; anything else is plain text.
fn text_output(text: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(&strip_fences(text)) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => serde_json::Value::String(text.to_string()),
    }
}

/// Whether `output` has the shape the format schema asks for.
///
/// An object schema needs every key present; a plain string output matches
/// a schema whose only key is `result`. Non-object schemas accept anything.
pub fn matches_schema(output: &serde_json::Value, schema: &serde_json::Value) -> bool {
    let Some(keys) = schema.as_object() else {
        return true;
    };
    if keys.is_empty() {
        return true;
    }
    match output {
        serde_json::Value::Object(map) => keys.keys().all(|k| map.contains_key(k)),
        serde_json::Value::String(_) => keys.len() == 1 && keys.contains_key("result"),
        _ => false,
    }
}

fn signal_definitions() -> [ToolDefinition; 2] {
    [
        ToolDefinition {
            name: TASK_COMPLETE_TOOL.into(),
            description: "Declare the objective done and hand over the final output.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "output": { "description": "Final output in the required format" }
                },
                "required": ["output"]
            }),
        },
        ToolDefinition {
            name: REPORT_FAILURE_TOOL.into(),
            description: "Declare that the objective cannot be completed.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Why the objective cannot be completed" }
                },
                "required": ["reason"]
            }),
        },
    ]
}

struct Run {
    attempt: u32,
    outputs: Vec<ToolOutput>,
    usage: ResourceUsage,
}

impl Run {
    fn new(attempt: u32) -> Self {
        Self {
            attempt,
            outputs: Vec::new(),
            usage: ResourceUsage::default(),
        }
    }

    fn succeed(self, output: serde_json::Value, schema: &serde_json::Value) -> ExecutionResult {
        info!(
            attempt = self.attempt,
            iterations = self.usage.iterations,
            tool_calls = self.usage.tool_calls,
            "Execution succeeded"
        );
        ExecutionResult {
            success: true,
            matched_expected: matches_schema(&output, schema),
            tool_outputs: self.outputs,
            final_output: Some(output),
            attempt: self.attempt,
            error: None,
            stagnation_triggered: false,
            usage: self.usage,
        }
    }

    fn fail(self, kind: FailureKind, message: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            success: false,
            matched_expected: false,
            tool_outputs: self.outputs,
            final_output: None,
            attempt: self.attempt,
            error: Some(ExecutionFailure {
                kind,
                message: message.into(),
            }),
            stagnation_triggered: kind == FailureKind::Stagnation,
            usage: self.usage,
        }
    }
}
