//! Built-in tools for taskforge.
//!
//! Tools are the agent's only way to touch the environment: run allowlisted
//! shell commands, list directories, read and write files. With the `wasm`
//! feature, forged tools run in a wasmtime sandbox.

pub mod file_read;
pub mod file_write;
pub mod list_directory;
pub mod path_policy;
pub mod shell;

#[cfg(feature = "wasm")]
pub mod wasm_sandbox;

use std::sync::Arc;
use taskforge_config::AutonomyConfig;
use taskforge_core::tool::ToolRegistry;

pub use path_policy::PathPolicy;
#[cfg(feature = "wasm")]
pub use wasm_sandbox::{WasmLimits, WasmSandbox, WasmTool};

/// Build a registry holding every built-in tool, restricted by `autonomy`.
pub fn default_registry(autonomy: &AutonomyConfig) -> ToolRegistry {
    let registry = ToolRegistry::new();
    register_builtins(&registry, autonomy);
    registry
}

/// Register the built-in tools into an existing registry.
pub fn register_builtins(registry: &ToolRegistry, autonomy: &AutonomyConfig) {
    let policy = PathPolicy::forbidding(autonomy.forbidden_paths.clone());
    registry.register(Arc::new(shell::ShellTool::new(autonomy.allowed_commands.clone())));
    registry.register(Arc::new(list_directory::ListDirectoryTool::new(policy.clone())));
    registry.register(Arc::new(file_read::FileReadTool::new(policy.clone())));
    registry.register(Arc::new(file_write::FileWriteTool::new(policy)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins() {
        let registry = default_registry(&AutonomyConfig::default());
        assert_eq!(
            registry.names(),
            vec!["file_read", "file_write", "list_directory", "shell"]
        );
    }

    #[tokio::test]
    async fn shell_uses_configured_allowlist() {
        let autonomy = AutonomyConfig {
            allowed_commands: vec!["echo".into()],
            forbidden_paths: vec![],
        };
        let registry = default_registry(&autonomy);
        let shell = registry.get("shell").unwrap();
        assert!(shell.execute(serde_json::json!({"command": "echo ok"})).await.is_ok());
        assert!(shell.execute(serde_json::json!({"command": "rm -rf /tmp/x"})).await.is_err());
    }
}
