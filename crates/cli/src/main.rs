//! taskforge CLI: the main entry point.
//!
//! Commands:
//! - `run`          Process one objective
//! - `chat`         Interactive loop over `run`
//! - `lessons`      Review the pending lesson queue
//! - `facts`, `capabilities`, `stats`   Inspect the knowledge store
//! - `forge`        Synthesize a sandboxed tool
//! - `onboard`      Write the starter config
//! - `doctor`       Diagnose config, store, and provider

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "taskforge",
    about = "taskforge: a self-calibrating task agent",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.taskforge/config.toml)
    #[arg(short, long, global = true, env = "TASKFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one objective
    Run {
        /// What to do, in plain language
        objective: String,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Enter objectives interactively
    Chat,

    /// Review lessons waiting for approval
    Lessons {
        #[command(subcommand)]
        action: LessonAction,
    },

    /// List stored facts
    Facts,

    /// Show per-tool reliability
    Capabilities,

    /// Show record counts
    Stats,

    /// Synthesize a new tool and register it if it passes the sandbox
    Forge {
        /// What the tool should do
        description: String,
    },

    /// Write the starter configuration
    Onboard,

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum LessonAction {
    /// List pending lessons
    List,
    /// Approve one lesson
    Approve { id: String },
    /// Approve every pending lesson
    ApproveAll,
    /// Dismiss one lesson
    Dismiss { id: String },
    /// Dismiss every pending lesson
    DismissAll,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  [Error] {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "warn,taskforge=debug" } else { "warn,taskforge=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run { objective, json } => return commands::run::run(config, &objective, json).await,
        Commands::Chat => commands::run::chat(config).await?,
        Commands::Lessons { action } => match action {
            LessonAction::List => commands::lessons::list(config).await?,
            LessonAction::Approve { id } => commands::lessons::approve(config, &id).await?,
            LessonAction::ApproveAll => commands::lessons::approve_all(config).await?,
            LessonAction::Dismiss { id } => commands::lessons::dismiss(config, &id).await?,
            LessonAction::DismissAll => commands::lessons::dismiss_all(config).await?,
        },
        Commands::Facts => commands::knowledge::facts(config).await?,
        Commands::Capabilities => commands::knowledge::capabilities(config).await?,
        Commands::Stats => commands::knowledge::stats(config).await?,
        Commands::Forge { description } => return commands::forge::run(config, &description).await,
        Commands::Onboard => commands::onboard::run(config)?,
        Commands::Doctor => return commands::doctor::run(config).await,
    }
    Ok(ExitCode::SUCCESS)
}
