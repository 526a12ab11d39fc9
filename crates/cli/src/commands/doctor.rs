//! `taskforge doctor`: diagnose config, store, and provider.

use std::path::Path;
use std::process::ExitCode;
use taskforge_config::AppConfig;

use crate::runtime::Runtime;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    println!("  taskforge doctor");
    println!();

    let mut issues = 0;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if path.exists() {
        println!("  [ok]   Config file found: {}", path.display());
    } else {
        println!("  [warn] No config file at {}; using defaults (run `taskforge onboard`)", path.display());
    }

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => {
            println!("  [ok]   Config valid");
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let runtime = match Runtime::open(config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("  [fail] Knowledge store: {e:#}");
            return Ok(ExitCode::FAILURE);
        }
    };
    match runtime.store.stats().await {
        Ok(stats) => println!(
            "  [ok]   Knowledge store ({}): {} tools, {} facts, {} pending lessons",
            runtime.store.name(),
            stats.tools,
            stats.facts,
            stats.pending_lessons
        ),
        Err(e) => {
            println!("  [fail] Knowledge store unreadable: {e}");
            issues += 1;
        }
    }

    println!("  [ok]   {} tools registered", runtime.registry.len());
    if runtime.config.forge.enabled && runtime.sandbox.is_none() {
        println!("  [warn] Forge enabled but the WASM sandbox failed to start");
        issues += 1;
    }

    match runtime.provider() {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  [ok]   Provider '{}' reachable", runtime.config.default_provider),
            Ok(false) => {
                println!("  [warn] Provider '{}' did not respond", runtime.config.default_provider);
                issues += 1;
            }
            Err(e) => {
                println!("  [fail] Provider check failed: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("  {issues} issue(s) found. See above for details.");
        Ok(ExitCode::FAILURE)
    }
}
