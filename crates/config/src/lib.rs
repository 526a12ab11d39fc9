//! Configuration loading, validation, and management for taskforge.
//!
//! Loads configuration from `~/.taskforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.taskforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Providers tried in order after the default one fails
    #[serde(default)]
    pub fallback: Vec<String>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Knowledge store location and seeding
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Execution unit and retry limits
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Tool-output classification used by the capability calibrator
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Autonomy and security settings for built-in tools
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Capability forge sandbox limits
    #[serde(default)]
    pub forge: ForgeConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("fallback", &self.fallback)
            .field("providers", &self.providers)
            .field("knowledge", &self.knowledge)
            .field("execution", &self.execution)
            .field("calibration", &self.calibration)
            .field("autonomy", &self.autonomy)
            .field("forge", &self.forge)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Per-request timeout when used inside a fallback chain
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// SQLite database path; `~` expands to the home directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Observations needed before a tool's reliability is reported
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,

    /// Record OS / shell / binary facts when the store is first opened
    #[serde(default = "default_true")]
    pub scan_environment: bool,

    /// Characters of each fact value shown in the planner's index
    #[serde(default = "default_fact_preview")]
    pub fact_preview_chars: usize,
}

fn default_db_path() -> String {
    "~/.taskforge/knowledge.db".into()
}
fn default_min_sample_size() -> u64 {
    2
}
fn default_fact_preview() -> usize {
    80
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            min_sample_size: default_min_sample_size(),
            scan_environment: true,
            fact_preview_chars: default_fact_preview(),
        }
    }
}

impl KnowledgeConfig {
    /// `db_path` with a leading `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Hard cap on reasoning steps per attempt
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// K: identical consecutive fingerprints that abort an attempt
    #[serde(default = "default_stagnation_window")]
    pub stagnation_window: usize,

    /// Timeout applied to every tool call
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Attempts per objective before the circuit breaks (at most 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Dispatch order-independent tool calls of one step concurrently
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_stagnation_window() -> usize {
    3
}
fn default_tool_timeout() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stagnation_window: default_stagnation_window(),
            tool_timeout_secs: default_tool_timeout(),
            max_attempts: default_max_attempts(),
            parallel_tool_calls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Case-insensitive substrings that mark a tool result as a failure
    #[serde(default = "default_error_markers")]
    pub error_markers: Vec<String>,
}

pub fn default_error_markers() -> Vec<String> {
    [
        "error:",
        "error executing",
        "exception:",
        "traceback",
        "timed out",
        "timeout",
        "permission denied",
        "not found",
        "failed:",
        "[stateless_executor_failure]",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            error_markers: default_error_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Programs the shell tool may launch; empty allows none
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Path prefixes file tools refuse to touch
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "grep", "find", "echo", "pwd", "wc", "head", "tail", "git", "uname", "df"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_forbidden_paths() -> Vec<String> {
    ["/proc", "/sys", "~/.ssh", "~/.gnupg", "~/.aws"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wasmtime fuel granted to each probe run
    #[serde(default = "default_fuel")]
    pub fuel_limit: u64,

    /// Linear memory ceiling for a forged module
    #[serde(default = "default_forge_memory")]
    pub max_memory_bytes: usize,

    /// Wall-clock limit per probe run
    #[serde(default = "default_forge_timeout")]
    pub timeout_secs: u64,
}

fn default_fuel() -> u64 {
    1_000_000
}
fn default_forge_memory() -> usize {
    16 * 1024 * 1024
}
fn default_forge_timeout() -> u64 {
    10
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fuel_limit: default_fuel(),
            max_memory_bytes: default_forge_memory(),
            timeout_secs: default_forge_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.taskforge/config.toml).
    ///
    /// Environment overrides, highest priority first:
    /// - `TASKFORGE_API_KEY`, then `OPENAI_API_KEY` (only when the file sets none)
    /// - `TASKFORGE_PROVIDER`, `TASKFORGE_MODEL`, `TASKFORGE_DB`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from an explicit path if given, otherwise the default path,
    /// then apply environment overrides.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("TASKFORGE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("TASKFORGE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("TASKFORGE_MODEL") {
            config.default_model = model;
        }

        if let Ok(db) = std::env::var("TASKFORGE_DB") {
            config.knowledge.db_path = db;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".taskforge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.execution.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "execution.max_iterations must be at least 1".into(),
            ));
        }

        if self.execution.stagnation_window < 2 {
            return Err(ConfigError::ValidationError(
                "execution.stagnation_window must be at least 2".into(),
            ));
        }

        if !(1..=3).contains(&self.execution.max_attempts) {
            return Err(ConfigError::ValidationError(
                "execution.max_attempts must be between 1 and 3".into(),
            ));
        }

        if self.calibration.error_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "calibration.error_markers must contain at least one marker".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a starter config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        let body = toml::to_string_pretty(&config).unwrap_or_default();
        format!(
            "# taskforge configuration\n\
             # API keys may also come from TASKFORGE_API_KEY or OPENAI_API_KEY.\n\n{body}"
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            fallback: Vec::new(),
            providers: HashMap::new(),
            knowledge: KnowledgeConfig::default(),
            execution: ExecutionConfig::default(),
            calibration: CalibrationConfig::default(),
            autonomy: AutonomyConfig::default(),
            forge: ForgeConfig::default(),
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs_home().join(rest)
    } else if path == "~" {
        dirs_home()
    } else {
        PathBuf::from(path)
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
