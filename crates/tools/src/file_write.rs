//! File write tool: create or overwrite a file subject to the path policy.

use async_trait::async_trait;
use taskforge_core::error::ToolError;
use taskforge_core::tool::{Tool, ToolResult};

use crate::path_policy::PathPolicy;

pub struct FileWriteTool {
    policy: PathPolicy,
}

impl FileWriteTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new(PathPolicy::default())
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and parent directories if needed, overwrites otherwise."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn tags(&self) -> Vec<String> {
        vec!["filesystem".into(), "files".into(), "write".into()]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = self
            .policy
            .check(path)
            .map_err(|e| e.into_tool_error("file_write"))?;

        if let Some(parent) = resolved.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed(format!("Error: failed to create directory: {e}")));
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => {
                let mut result = ToolResult::ok(format!("Wrote {} bytes to {path}", content.len()));
                result.data = Some(serde_json::json!({
                    "success": true,
                    "path": path,
                    "detail": format!("{} bytes", content.len()),
                }));
                Ok(result)
            }
            Err(e) => Ok(ToolResult::failed(format!("Error: failed to write {path}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("output.txt");

        let result = FileWriteTool::default()
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "Hello from test!"
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("16 bytes"));
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "Hello from test!");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("nested").join("dir").join("file.txt");

        let result = FileWriteTool::default()
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "nested content"
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "nested content");
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let result = FileWriteTool::default()
            .execute(serde_json::json!({"path": "/tmp/test.txt"}))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn traversal_blocked() {
        let result = FileWriteTool::default()
            .execute(serde_json::json!({"path": "../../../etc/crontab", "content": "x"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
