//! Path policy for the filesystem tools.
//!
//! Rejects traversal sequences, resolves symlinks where the path (or its
//! parent) exists, then checks forbidden prefixes before allowed roots.

use std::path::{Path, PathBuf};
use taskforge_core::error::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum PathViolation {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden prefix '{prefix}'")]
    Forbidden { path: String, prefix: String },

    #[error("Path traversal detected in '{path}'")]
    Traversal { path: String },

    #[error("Cannot resolve '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

impl PathViolation {
    pub fn into_tool_error(self, tool_name: &str) -> ToolError {
        ToolError::PermissionDenied {
            tool_name: tool_name.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Which paths the filesystem tools may touch. Empty `allowed_roots` allows everything not forbidden.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    pub allowed_roots: Vec<String>,
    pub forbidden_paths: Vec<String>,
}

impl PathPolicy {
    pub fn forbidding(forbidden_paths: Vec<String>) -> Self {
        Self {
            allowed_roots: Vec::new(),
            forbidden_paths,
        }
    }

    /// Returns the resolved path on success.
    pub fn check(&self, path: &str) -> Result<PathBuf, PathViolation> {
        let normalized = path.replace('\\', "/");
        if normalized.contains("../") || normalized.contains("/..") || normalized == ".." {
            return Err(PathViolation::Traversal { path: path.into() });
        }

        let input = Path::new(path);
        let resolved = if input.exists() {
            input.canonicalize().map_err(|e| PathViolation::Unresolvable {
                path: path.into(),
                reason: e.to_string(),
            })?
        } else {
            match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() && parent.exists() => parent
                    .canonicalize()
                    .map_err(|e| PathViolation::Unresolvable {
                        path: path.into(),
                        reason: format!("parent: {e}"),
                    })?
                    .join(input.file_name().unwrap_or_default()),
                _ => input.to_path_buf(),
            }
        };

        let resolved_str = resolved.to_string_lossy().replace('\\', "/").to_lowercase();

        for prefix in &self.forbidden_paths {
            let expanded = expand_tilde(prefix).replace('\\', "/").to_lowercase();
            if resolved_str.starts_with(&expanded) {
                return Err(PathViolation::Forbidden {
                    path: path.into(),
                    prefix: prefix.clone(),
                });
            }
        }

        if !self.allowed_roots.is_empty()
            && !self.allowed_roots.iter().any(|root| {
                let expanded = expand_tilde(root).replace('\\', "/").to_lowercase();
                resolved_str.starts_with(&expanded)
            })
        {
            return Err(PathViolation::OutsideAllowedRoots { path: path.into() });
        }

        Ok(resolved)
    }
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
        if let Ok(home) = home {
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
