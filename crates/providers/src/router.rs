//! Provider router: builds the provider stack described by the config.
//!
//! The default provider comes first; names listed under `fallback` follow it
//! in a [`FallbackProvider`] chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taskforge_config::{AppConfig, ProviderConfig};
use taskforge_core::provider::Provider;
use crate::fallback::FallbackProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Named providers built from configuration.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn build_one(name: &str, provider_config: Option<&ProviderConfig>, config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();

    let base_url = provider_config
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));

    Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key))
}

/// Build every configured provider, plus the default one if it is not listed.
pub fn build_router(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        router.register(name.clone(), build_one(name, Some(provider_config), config));
    }

    for name in std::iter::once(&config.default_provider).chain(config.fallback.iter()) {
        if router.get(name).is_none() {
            router.register(name.clone(), build_one(name, None, config));
        }
    }

    router
}

/// The provider the orchestrator should talk to: the default provider alone,
/// or a fallback chain when `fallback` names further providers.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let router = build_router(config);
    let timeout_for = |name: &str| {
        Duration::from_secs(
            config
                .providers
                .get(name)
                .map(|p| p.timeout_secs)
                .unwrap_or(120),
        )
    };

    let mut order = vec![config.default_provider.clone()];
    for name in &config.fallback {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }

    if order.len() == 1 {
        if let Some(provider) = router.default_provider() {
            return provider;
        }
    }

    let mut chain = FallbackProvider::new("fallback");
    for name in &order {
        if let Some(provider) = router.get(name) {
            chain = chain.with(provider, timeout_for(name));
        }
    }
    Arc::new(chain)
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn router_always_contains_default() {
        let config = AppConfig::default();
        let router = build_router(&config);
        assert!(router.default_provider().is_some());
        assert_eq!(router.list(), vec!["openai"]);
    }

    #[test]
    fn single_provider_is_returned_directly() {
        let config = AppConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn fallback_list_builds_chain() {
        let mut config = AppConfig::default();
        config.fallback = vec!["ollama".into(), "openai".into()];
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_url: Some("http://127.0.0.1:11434/v1".into()),
                timeout_secs: 30,
                ..ProviderConfig::default()
            },
        );
        let router = build_router(&config);
        assert_eq!(router.list(), vec!["ollama", "openai"]);

        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "fallback");
    }
}
