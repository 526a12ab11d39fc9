//! `taskforge forge`: synthesize a sandboxed tool from a description.

use std::path::Path;
use std::process::ExitCode;
use taskforge_agent::ForgeOutcome;

use crate::runtime::{Runtime, load_config};

pub async fn run(config: Option<&Path>, description: &str) -> anyhow::Result<ExitCode> {
    let runtime = Runtime::open(load_config(config)?).await?;
    let forge = runtime.forge()?;

    match forge.forge(description).await? {
        ForgeOutcome::Registered { record, .. } => {
            println!("  Registered tool '{}' after passing every probe", record.name);
            println!("  {}", record.summary);
            Ok(ExitCode::SUCCESS)
        }
        ForgeOutcome::Rejected { name, verdict } => {
            eprintln!("  Candidate '{name}' failed the sandbox:");
            for failure in &verdict.failures {
                eprintln!("    - {failure}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
