//! Shell tool: run an allowlisted command and return its output.

use async_trait::async_trait;
use taskforge_core::error::ToolError;
use taskforge_core::tool::{Tool, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ShellTool {
    /// Only these base commands may run. Empty allows nothing.
    allowed_commands: Vec<String>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    fn base_command(command: &str) -> &str {
        command.split_whitespace().next().unwrap_or("").trim()
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        // Chaining would let a second command bypass the allowlist.
        if command.contains(['|', ';', '&', '`', '$', '>', '<']) {
            return false;
        }
        let base = Self::base_command(command);
        self.allowed_commands.iter().any(|a| a == base)
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute an allowlisted shell command and return stdout/stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    fn tags(&self) -> Vec<String> {
        vec!["shell".into(), "system".into()]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell".into(),
                reason: format!("Command '{}' not in allowlist", Self::base_command(command)),
            });
        }

        debug!(command = %command, "Executing shell command");

        let output = if cfg!(target_os = "windows") {
            Command::new("cmd").args(["/C", command]).output().await
        } else {
            Command::new("sh").args(["-c", command]).output().await
        };
        let output = output.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "shell".into(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let text = if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(ToolResult::ok(text.trim()))
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            Ok(ToolResult::failed(format!(
                "Error: exit code {code}: {}",
                detail.trim()
            )))
        }
    }
}
