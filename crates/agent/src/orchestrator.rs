//! The orchestrator: route → select → assemble → execute → learn, with a
//! bounded retry loop.
//!
//! Attempts for one objective are strictly sequential; each retry's
//! selection sees the previous attempt's error. Calibration runs after every
//! attempt. Facts and lessons are only learned from a successful attempt.
//! After the last allowed attempt fails, the circuit breaks and the caller
//! gets a structured [`CircuitBroken`] payload.

use serde::Serialize;
use std::sync::Arc;
use taskforge_config::AppConfig;
use taskforge_core::error::StoreError;
use taskforge_core::execution::{
    ExecutionFailure, ExecutionRequest, ExecutionResult, FailureKind, ResourceUsage, ToolOutput,
};
use taskforge_core::knowledge::KnowledgeStore;
use taskforge_core::provider::Provider;
use taskforge_core::tool::ToolRegistry;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::assembler::assemble;
use crate::calibrator::ErrorClassifier;
use crate::executor::{ExecutionSettings, ExecutionUnit};
use crate::learning;
use crate::mission::{EdgeKind, MissionTree, NodeStatus, UnknownNode};
use crate::planner::{Planner, PlannerSettings, Route};

/// Hard ceiling on attempts per objective.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Knowledge store failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mission(#[from] UnknownNode),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Clamped to `1..=3`.
    pub max_attempts: u32,
    pub max_iterations: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            max_iterations: 10,
        }
    }
}

/// What a completed objective produced.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub objective: String,
    pub attempts: u32,
    pub output: serde_json::Value,
    pub matched_expected: bool,
    /// The planner's own success criterion, for display.
    pub expected_output: String,
    pub tool_outputs: Vec<ToolOutput>,
    /// Keys written through the verified path.
    pub verified_facts: Vec<String>,
    pub lessons_queued: usize,
    pub usage: ResourceUsage,
}

/// The structured failure returned when every attempt failed.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBroken {
    pub objective: String,
    pub attempts: u32,
    pub last_error: ExecutionFailure,
    pub requires_intervention: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Conversational objective answered directly.
    Reply(String),
    Completed(TaskReport),
    CircuitBroken(CircuitBroken),
}

impl Outcome {
    pub fn is_circuit_broken(&self) -> bool {
        matches!(self, Self::CircuitBroken(_))
    }
}

pub struct Orchestrator {
    planner: Planner,
    executor: ExecutionUnit,
    store: Arc<dyn KnowledgeStore>,
    classifier: ErrorClassifier,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        executor: ExecutionUnit,
        store: Arc<dyn KnowledgeStore>,
        classifier: ErrorClassifier,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            planner,
            executor,
            store,
            classifier,
            settings,
        }
    }

    /// Wire every component from the application config.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let planner = Planner::new(provider.clone(), &config.default_model).with_settings(PlannerSettings {
            temperature: 0.0,
            fact_preview_chars: config.knowledge.fact_preview_chars,
            min_sample_size: config.knowledge.min_sample_size,
        });
        let executor = ExecutionUnit::new(provider, registry, &config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_settings(ExecutionSettings::from(&config.execution));
        Self::new(
            planner,
            executor,
            store,
            ErrorClassifier::from_config(&config.calibration),
            OrchestratorSettings {
                max_attempts: config.execution.max_attempts,
                max_iterations: config.execution.max_iterations,
            },
        )
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    /// Process one objective in a fresh mission tree.
    pub async fn process(&self, objective: &str) -> Result<Outcome, OrchestratorError> {
        let mut tree = MissionTree::new();
        let root = tree.add_root(objective);
        self.process_node(&mut tree, root).await
    }

    /// Process `objective` as a sub-task of `parent`.
    pub async fn process_subtask(
        &self,
        tree: &mut MissionTree,
        parent: usize,
        objective: &str,
    ) -> Result<(usize, Outcome), OrchestratorError> {
        let node = tree.add_child(parent, EdgeKind::SubTask, objective)?;
        let outcome = self.process_node(tree, node).await?;
        Ok((node, outcome))
    }

    /// Process the objective held by `node`. Retries become `Retry` children.
    pub async fn process_node(&self, tree: &mut MissionTree, node: usize) -> Result<Outcome, OrchestratorError> {
        let objective = tree.node(node).ok_or(UnknownNode(node))?.objective.clone();

        if let Route::Chat(reply) = self.planner.route(&objective).await {
            info!(objective = %preview(&objective), "Routed as conversation");
            tree.succeed(node)?;
            return Ok(Outcome::Reply(reply));
        }

        let max_attempts = self.settings.max_attempts.clamp(1, MAX_ATTEMPTS);
        let mut last_error: Option<ExecutionFailure> = None;
        let mut current = node;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                current = tree.add_child(node, EdgeKind::Retry, objective.clone())?;
            }
            tree.start(current, attempt)?;
            info!(attempt, max_attempts, objective = %preview(&objective), "Starting attempt");

            let snapshot = self.store.snapshot().await?;
            let previous = last_error.as_ref().map(|e| e.to_string());
            let selection = self
                .planner
                .select(&objective, &snapshot, previous.as_deref(), attempt)
                .await;

            let (request, result) =
                match assemble(&objective, &selection, &snapshot, attempt, self.settings.max_iterations) {
                    Ok(request) => {
                        let result = self.executor.execute(&request).await;
                        (Some(request), result)
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Assembly failed");
                        (None, ExecutionResult::not_started(attempt, FailureKind::Assembly, e.to_string()))
                    }
                };

            self.calibrate(request.as_ref(), &result).await?;

            if let (true, Some(request)) = (result.success, request.as_ref()) {
                tree.succeed(current)?;
                tree.succeed(node)?;
                for pattern in self.planner.relevant_patterns(&snapshot, &objective) {
                    if let Err(e) = self.store.touch_pattern(&pattern.name).await {
                        warn!(pattern = %pattern.name, error = %e, "Failed to record pattern use");
                    }
                }
                let (verified_facts, lessons_queued) = self.learn(&objective, request, &result).await;
                info!(attempt, facts = verified_facts.len(), lessons = lessons_queued, "Objective completed");
                return Ok(Outcome::Completed(TaskReport {
                    objective,
                    attempts: attempt,
                    output: result.final_output.unwrap_or(serde_json::Value::Null),
                    matched_expected: result.matched_expected,
                    expected_output: selection.expected_output,
                    tool_outputs: result.tool_outputs,
                    verified_facts,
                    lessons_queued,
                    usage: result.usage,
                }));
            }

            let failure = result.error.unwrap_or_else(|| ExecutionFailure {
                kind: FailureKind::ToolExecution,
                message: "attempt failed without an error".into(),
            });
            warn!(
                attempt,
                kind = failure.kind.as_str(),
                stagnation = result.stagnation_triggered,
                error = %failure.message,
                "Attempt failed"
            );
            tree.fail(current, failure.to_string())?;
            last_error = Some(failure);
        }

        tree.set_status(node, NodeStatus::CircuitBroken)?;
        let last_error = last_error.unwrap_or_else(|| ExecutionFailure {
            kind: FailureKind::CircuitBroken,
            message: "no attempt was made".into(),
        });
        error!(attempts = max_attempts, last_error = %last_error, "Circuit broken");
        Ok(Outcome::CircuitBroken(CircuitBroken {
            objective,
            attempts: max_attempts,
            message: format!("Reached the maximum of {max_attempts} attempts; human intervention required"),
            last_error,
            requires_intervention: true,
        }))
    }

    /// Update capability counters for the tools this attempt was allowed to use.
    async fn calibrate(&self, request: Option<&ExecutionRequest>, result: &ExecutionResult) -> Result<(), StoreError> {
        let Some(request) = request else {
            return Ok(());
        };
        let observations = self
            .classifier
            .observe(result.tool_outputs.iter().filter(|o| request.tool_ids.contains(&o.tool)));
        learning::calibrate(self.store.as_ref(), &observations).await?;
        Ok(())
    }

    /// Run the verified-fact and lesson paths. Failures are logged, never fatal.
    async fn learn(&self, objective: &str, request: &ExecutionRequest, result: &ExecutionResult) -> (Vec<String>, usize) {
        let candidates = self.planner.extract_facts(&result.tool_outputs).await;
        let written =
            learning::record_verified_facts(self.store.as_ref(), &self.classifier, &candidates, &result.tool_outputs)
                .await;
        let facts = match written {
            Ok(records) => records.into_iter().map(|r| r.key).collect(),
            Err(e) => {
                warn!(error = %e, "Verified fact write failed");
                Vec::new()
            }
        };

        let tools_used: Vec<String> = request.tool_ids.iter().cloned().collect();
        let lessons = self.planner.infer_lessons(objective, &tools_used, result).await;
        let queued = match learning::enqueue_lessons(self.store.as_ref(), lessons).await {
            Ok(queued) => queued.len(),
            Err(e) => {
                warn!(error = %e, "Lesson enqueue failed");
                0
            }
        };
        (facts, queued)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(60).collect()
}
