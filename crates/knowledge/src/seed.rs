//! First-run seeding: default output formats, a cold-start environment scan,
//! and tool records imported from the registry.
//!
//! Every step is idempotent. Re-running it never overwrites a record that
//! was written later by verification or an approved lesson.

use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use taskforge_core::error::StoreError;
use taskforge_core::knowledge::{FactDraft, KnowledgeStore, Provenance, ToolImpl, ToolRecord};
use taskforge_core::tool::{SYSTEM_TOOL_PREFIX, ToolRegistry};
use tracing::{debug, info};

use crate::records;

/// Confidence of facts produced by the environment scan.
pub const ENVIRONMENT_CONFIDENCE: f64 = 0.9;

/// Binaries probed on `PATH` during the environment scan.
pub const PROBED_BINARIES: &[&str] = &["git", "python3", "docker", "node", "curl"];

const SCAN_SOURCE: &str = "environment_scan";

/// The output formats every store starts with.
pub fn default_formats() -> Vec<(&'static str, serde_json::Value)> {
    vec![
        ("plain_text", json!({"result": "str"})),
        (
            "file_operation",
            json!({"success": "bool", "path": "str", "detail": "str"}),
        ),
        (
            "code_execution",
            json!({"success": "bool", "stdout": "str", "stderr": "str", "exit_code": "int"}),
        ),
        (
            "search_result",
            json!({"found": "bool", "items": "list", "count": "int"}),
        ),
    ]
}

/// Insert the default formats that are not yet present. Returns how many were added.
pub async fn seed_default_formats(store: &dyn KnowledgeStore) -> Result<usize, StoreError> {
    let existing: Vec<String> = store.formats().await?.into_iter().map(|f| f.name).collect();
    let mut added = 0;
    for (name, schema) in default_formats() {
        if existing.iter().any(|n| n == name) {
            continue;
        }
        store.upsert_format(name, schema, Provenance::Seeded).await?;
        added += 1;
    }
    Ok(added)
}

/// Deterministic facts about the host. No model calls, no subprocesses.
pub fn scan_environment() -> Vec<FactDraft> {
    let fact = |key: &str, category: &str, value: String| FactDraft {
        key: key.to_string(),
        category: category.to_string(),
        value,
        source: SCAN_SOURCE.to_string(),
    };

    let mut facts = vec![
        fact("os_name", "environment", std::env::consts::OS.to_string()),
        fact("os_arch", "environment", std::env::consts::ARCH.to_string()),
    ];
    if let Some(host) = hostname() {
        facts.push(fact("hostname", "environment", host));
    }
    if let Some(home) = env_any(&["HOME", "USERPROFILE"]) {
        facts.push(fact("user_home", "environment", home));
    }
    if let Some(user) = env_any(&["USER", "USERNAME"]) {
        facts.push(fact("current_user", "environment", user));
    }
    if let Some(shell) = env_any(&["SHELL", "COMSPEC"]) {
        facts.push(fact("shell", "environment", shell));
    }
    if let Ok(cpus) = std::thread::available_parallelism() {
        facts.push(fact("cpu_count", "environment", cpus.get().to_string()));
    }

    let path = std::env::var_os("PATH").unwrap_or_default();
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    for bin in PROBED_BINARIES {
        if let Some(found) = which_in(bin, &dirs) {
            facts.push(fact(&format!("which_{bin}"), "tools", found.display().to_string()));
        }
    }
    facts
}

/// Seed environment facts for keys that are still absent. Returns how many were added.
pub async fn seed_environment(store: &dyn KnowledgeStore) -> Result<usize, StoreError> {
    let mut added = 0;
    for draft in scan_environment() {
        if store.seed_fact(draft, ENVIRONMENT_CONFIDENCE).await? {
            added += 1;
        }
    }
    Ok(added)
}

/// Import a tool record for every registered tool, skipping `system_*` signal tools.
pub async fn seed_from_registry(store: &dyn KnowledgeStore, registry: &ToolRegistry) -> Result<usize, StoreError> {
    let known: Vec<String> = store.tools().await?.into_iter().map(|t| t.name).collect();
    let mut added = 0;
    for tool in registry.all() {
        let name = tool.name().to_string();
        if name.starts_with(SYSTEM_TOOL_PREFIX) || known.contains(&name) {
            continue;
        }
        store
            .upsert_tool(ToolRecord {
                id: records::new_id(),
                name: name.clone(),
                tags: tool.tags(),
                summary: first_line(tool.description()),
                input_schema: tool.parameters_schema(),
                implementation: ToolImpl::Registered,
                provenance: Provenance::Seeded,
                created_at: Utc::now(),
            })
            .await?;
        debug!(tool = %name, "Imported tool record");
        added += 1;
    }
    Ok(added)
}

/// Counts from a [`bootstrap`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub formats: usize,
    pub facts: usize,
    pub tools: usize,
}

/// Run every seeding step. The environment scan is optional.
pub async fn bootstrap(
    store: &dyn KnowledgeStore,
    registry: &ToolRegistry,
    scan_env: bool,
) -> Result<SeedReport, StoreError> {
    let report = SeedReport {
        formats: seed_default_formats(store).await?,
        facts: if scan_env { seed_environment(store).await? } else { 0 },
        tools: seed_from_registry(store, registry).await?,
    };
    if report != SeedReport::default() {
        info!(
            formats = report.formats,
            facts = report.facts,
            tools = report.tools,
            store = store.name(),
            "Seeded knowledge store"
        );
    }
    Ok(report)
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

fn hostname() -> Option<String> {
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    env_any(&["HOSTNAME", "COMPUTERNAME"])
}

fn which_in(bin: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().map(|d| d.join(bin)).find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
