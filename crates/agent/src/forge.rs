//! Capability forge: synthesize a tool, judge it in a sandbox, and register
//! it only after a passing verdict.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use taskforge_core::error::ForgeError;
use taskforge_core::forge::{Candidate, SandboxHarness, Verdict};
use taskforge_core::knowledge::{KnowledgeStore, Provenance, ToolImpl, ToolRecord};
use taskforge_core::message::Message;
use taskforge_core::provider::{Provider, ProviderRequest};
use taskforge_core::tool::ToolRegistry;
use tracing::{info, warn};

use crate::json::parse_json;
use crate::mission::{EdgeKind, MissionTree, UnknownNode};
use crate::prompts;

/// Produces a candidate tool for a capability request.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate(&self, request: &str) -> Result<Candidate, ForgeError>;
}

/// Asks the model for the candidate as JSON.
pub struct ModelCandidateGenerator {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ModelCandidateGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl CandidateGenerator for ModelCandidateGenerator {
    async fn generate(&self, request: &str) -> Result<Candidate, ForgeError> {
        let provider_request = ProviderRequest::new(
            &self.model,
            vec![Message::system(prompts::FORGE_SYSTEM), Message::user(request)],
        )
        .with_temperature(0.0)
        .with_json_mode();
        let response = self
            .provider
            .complete(provider_request)
            .await
            .map_err(|e| ForgeError::Generation(e.to_string()))?;
        parse_json(&response.message.content).map_err(|e| ForgeError::Generation(format!("unparseable candidate: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForgeOutcome {
    Registered { record: ToolRecord, verdict: Verdict },
    Rejected { name: String, verdict: Verdict },
}

impl ForgeOutcome {
    pub fn verdict(&self) -> &Verdict {
        match self {
            Self::Registered { verdict, .. } | Self::Rejected { verdict, .. } => verdict,
        }
    }
}

pub struct CapabilityForge {
    generator: Arc<dyn CandidateGenerator>,
    harness: Arc<dyn SandboxHarness>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn KnowledgeStore>,
}

impl CapabilityForge {
    pub fn new(
        generator: Arc<dyn CandidateGenerator>,
        harness: Arc<dyn SandboxHarness>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            generator,
            harness,
            registry,
            store,
        }
    }

    /// Generate, evaluate, and on a passing verdict register and persist.
    ///
    /// A rejected candidate leaves the registry and the store untouched.
    pub async fn forge(&self, request: &str) -> Result<ForgeOutcome, ForgeError> {
        let candidate = self.generator.generate(request).await?;
        candidate.validate()?;
        if self.registry.contains(&candidate.name) {
            return Err(ForgeError::NameTaken(candidate.name));
        }

        let verdict = self.harness.evaluate(&candidate).await;
        if !verdict.passed {
            warn!(tool = %candidate.name, failures = ?verdict.failures, "Forged candidate rejected");
            return Ok(ForgeOutcome::Rejected {
                name: candidate.name,
                verdict,
            });
        }

        let tool = self.harness.instantiate(&candidate)?;
        let record = ToolRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: candidate.name.clone(),
            tags: candidate.tags.clone(),
            summary: candidate.description.clone(),
            input_schema: candidate.parameters_schema.clone(),
            implementation: ToolImpl::Wasm {
                module: candidate.module.clone(),
            },
            provenance: Provenance::VerifiedExecution,
            created_at: Utc::now(),
        };
        self.store.upsert_tool(record.clone()).await?;
        self.registry.register(tool);
        info!(tool = %record.name, probes = candidate.probes.len(), "Forged tool registered");
        Ok(ForgeOutcome::Registered { record, verdict })
    }

    /// Forge under a `CapabilityBranch` child of `parent`, recording the result on the node.
    pub async fn forge_branch(
        &self,
        tree: &mut MissionTree,
        parent: usize,
        request: &str,
    ) -> Result<(usize, Result<ForgeOutcome, ForgeError>), UnknownNode> {
        let node = tree.add_child(parent, EdgeKind::CapabilityBranch, request)?;
        tree.start(node, 1)?;
        let outcome = self.forge(request).await;
        match &outcome {
            Ok(ForgeOutcome::Registered { .. }) => tree.succeed(node)?,
            Ok(ForgeOutcome::Rejected { verdict, .. }) => tree.fail(node, verdict.failures.join("; "))?,
            Err(e) => tree.fail(node, e.to_string())?,
        }
        Ok((node, outcome))
    }
}

/// Register every persisted forged tool that is not already in the registry.
///
/// Tools that no longer instantiate are skipped with a warning.
pub async fn rehydrate(
    store: &dyn KnowledgeStore,
    harness: &dyn SandboxHarness,
    registry: &ToolRegistry,
) -> Result<usize, ForgeError> {
    let mut restored = 0;
    for record in store.tools().await? {
        let Some(candidate) = Candidate::from_record(&record) else {
            continue;
        };
        if registry.contains(&candidate.name) {
            continue;
        }
        match harness.instantiate(&candidate) {
            Ok(tool) => {
                registry.register(tool);
                restored += 1;
            }
            Err(e) => warn!(tool = %record.name, error = %e, "Skipped forged tool"),
        }
    }
    if restored > 0 {
        info!(count = restored, "Re-hydrated forged tools");
    }
    Ok(restored)
}
