//! File read tool: read a text file subject to the path policy.

use async_trait::async_trait;
use taskforge_core::error::ToolError;
use taskforge_core::tool::{Tool, ToolResult};

use crate::path_policy::PathPolicy;

/// Reads larger than this are truncated.
const MAX_READ_BYTES: usize = 256 * 1024;

pub struct FileReadTool {
    policy: PathPolicy,
}

impl FileReadTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new(PathPolicy::default())
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    fn tags(&self) -> Vec<String> {
        vec!["filesystem".into(), "files".into(), "read".into()]
    }

    fn ordering_independent(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = self
            .policy
            .check(path)
            .map_err(|e| e.into_tool_error("file_read"))?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(mut content) => {
                if content.len() > MAX_READ_BYTES {
                    let mut cut = MAX_READ_BYTES;
                    while !content.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    content.truncate(cut);
                    content.push_str("\n[truncated]");
                }
                Ok(ToolResult::ok(content))
            }
            Err(e) => Ok(ToolResult::failed(format!("Error: failed to read {path}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = FileReadTool::default();
        assert_eq!(tool.name(), "file_read");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("test.txt");
        std::fs::write(&file_path, "Hello, world!\n").unwrap();

        let result = FileReadTool::default()
            .execute(serde_json::json!({"path": file_path.to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "Hello, world!\n");
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let result = FileReadTool::default()
            .execute(serde_json::json!({"path": "/tmp/taskforge_missing_file_12345.txt"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.starts_with("Error: failed to read"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let result = FileReadTool::default().execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn forbidden_path_blocked() {
        let tool = FileReadTool::new(PathPolicy::forbidding(vec!["/etc".into()]));
        let result = tool.execute(serde_json::json!({"path": "/etc/shadow"})).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
