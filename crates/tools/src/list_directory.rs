//! Directory listing tool.

use async_trait::async_trait;
use taskforge_core::error::ToolError;
use taskforge_core::tool::{Tool, ToolResult};

use crate::path_policy::PathPolicy;

/// Lists entry names, sorted, one per line. Directories get a trailing `/`
/// unless `plain` is set.
pub struct ListDirectoryTool {
    policy: PathPolicy,
}

impl ListDirectoryTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

impl Default for ListDirectoryTool {
    fn default() -> Self {
        Self::new(PathPolicy::default())
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory, one name per line."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list"
                },
                "plain": {
                    "type": "boolean",
                    "description": "Omit the trailing '/' on directory names"
                }
            },
            "required": ["path"]
        })
    }

    fn tags(&self) -> Vec<String> {
        vec!["filesystem".into(), "files".into(), "list".into()]
    }

    fn ordering_independent(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let plain = arguments["plain"].as_bool().unwrap_or(false);

        let resolved = self
            .policy
            .check(path)
            .map_err(|e| e.into_tool_error("list_directory"))?;

        let mut entries = match tokio::fs::read_dir(&resolved).await {
            Ok(entries) => entries,
            Err(e) => return Ok(ToolResult::failed(format!("Error: cannot list {path}: {e}"))),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    if is_dir && !plain {
                        name.push('/');
                    }
                    names.push(name);
                }
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failed(format!("Error: reading {path}: {e}"))),
            }
        }
        names.sort();

        let mut result = ToolResult::ok(names.join("\n"));
        result.data = Some(serde_json::json!({ "count": names.len() }));
        Ok(result)
    }
}
