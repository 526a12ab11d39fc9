//! `taskforge onboard`: first-time setup.

use std::path::Path;
use taskforge_config::AppConfig;

pub fn run(config: Option<&Path>) -> anyhow::Result<()> {
    let config_path = match config {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    println!("  taskforge first-time setup");
    println!();

    if let Some(dir) = config_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
            println!("  Created config directory: {}", dir.display());
        }
    }

    if config_path.exists() {
        println!("  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run onboard.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created {}", config_path.display());
    println!();
    println!("  Next steps:");
    println!("    1. Add your API key to the config, or export TASKFORGE_API_KEY");
    println!("    2. Run: taskforge doctor");
    println!("    3. Run: taskforge run \"list the files in /tmp\"");
    Ok(())
}
