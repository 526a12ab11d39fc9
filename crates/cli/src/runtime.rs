//! Wiring shared by every command: config, store, registry, sandbox, provider.

use anyhow::{Context, bail};
use std::path::Path;
use std::sync::Arc;
use taskforge_agent::{CapabilityForge, ModelCandidateGenerator, Orchestrator, rehydrate};
use taskforge_config::AppConfig;
use taskforge_core::forge::SandboxHarness;
use taskforge_core::knowledge::KnowledgeStore;
use taskforge_core::provider::Provider;
use taskforge_core::tool::ToolRegistry;
use taskforge_knowledge::{SqliteStore, bootstrap};
use taskforge_tools::{WasmLimits, WasmSandbox, default_registry};
use tracing::warn;

/// Providers served from localhost that need no API key.
const LOCAL_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<dyn KnowledgeStore>,
    pub registry: Arc<ToolRegistry>,
    pub sandbox: Option<Arc<dyn SandboxHarness>>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    AppConfig::load_with(path).context("Failed to load config")
}

/// Open only the knowledge store, for the inspection commands.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn KnowledgeStore>> {
    let path = config.knowledge.resolved_db_path();
    let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("Failed to open knowledge store at {}", path.display()))?;
    Ok(Arc::new(store))
}

impl Runtime {
    /// Open and seed the store, build the tool registry, and restore forged tools.
    pub async fn open(config: AppConfig) -> anyhow::Result<Self> {
        let store = open_store(&config).await?;
        let registry = Arc::new(default_registry(&config.autonomy));
        bootstrap(store.as_ref(), &registry, config.knowledge.scan_environment)
            .await
            .context("Failed to seed knowledge store")?;

        let sandbox = if config.forge.enabled {
            match WasmSandbox::new(WasmLimits::from(&config.forge)) {
                Ok(sandbox) => Some(Arc::new(sandbox) as Arc<dyn SandboxHarness>),
                Err(e) => {
                    warn!(error = %e, "WASM sandbox unavailable; forged tools disabled");
                    None
                }
            }
        } else {
            None
        };
        if let Some(sandbox) = &sandbox {
            rehydrate(store.as_ref(), sandbox.as_ref(), &registry)
                .await
                .context("Failed to restore forged tools")?;
        }

        Ok(Self {
            config,
            store,
            registry,
            sandbox,
        })
    }

    pub fn provider(&self) -> anyhow::Result<Arc<dyn Provider>> {
        let local = LOCAL_PROVIDERS.contains(&self.config.default_provider.as_str());
        if !local && !self.config.has_api_key() && self.config.providers.values().all(|p| p.api_key.is_none()) {
            bail!(
                "No API key configured. Set TASKFORGE_API_KEY or OPENAI_API_KEY, or add api_key to {}",
                AppConfig::config_dir().join("config.toml").display()
            );
        }
        Ok(taskforge_providers::build_from_config(&self.config))
    }

    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        Ok(Orchestrator::from_config(
            &self.config,
            self.provider()?,
            self.registry.clone(),
            self.store.clone(),
        ))
    }

    pub fn forge(&self) -> anyhow::Result<CapabilityForge> {
        if !self.config.forge.enabled {
            bail!("The capability forge is disabled ([forge] enabled = false)");
        }
        let Some(sandbox) = self.sandbox.clone() else {
            bail!("The WASM sandbox is unavailable; see the log for details");
        };
        let generator = Arc::new(ModelCandidateGenerator::new(self.provider()?, &self.config.default_model));
        Ok(CapabilityForge::new(generator, sandbox, self.registry.clone(), self.store.clone()))
    }
}
