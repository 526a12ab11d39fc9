//! `taskforge run` and `taskforge chat`.

use std::io::{BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use taskforge_agent::{Orchestrator, Outcome, TaskReport};

use crate::runtime::{Runtime, load_config};

/// Exit code when the circuit breaks.
const CIRCUIT_BROKEN_EXIT: u8 = 2;

pub async fn run(config: Option<&Path>, objective: &str, json: bool) -> anyhow::Result<ExitCode> {
    let runtime = Runtime::open(load_config(config)?).await?;
    let orchestrator = runtime.orchestrator()?;

    let outcome = orchestrator.process(objective).await?;
    if json {
        println!("{}", outcome_json(&outcome));
    } else {
        print_outcome(&outcome);
    }
    Ok(exit_code(&outcome))
}

pub async fn chat(config: Option<&Path>) -> anyhow::Result<()> {
    let runtime = Runtime::open(load_config(config)?).await?;
    let orchestrator = runtime.orchestrator()?;

    println!();
    println!("  taskforge, interactive mode");
    println!("  Provider:  {}", runtime.config.default_provider);
    println!("  Model:     {}", runtime.config.default_model);
    println!("  Tools:     {}", runtime.registry.names().join(", "));
    println!();
    println!("  Type an objective and press Enter. Type 'exit' to quit.");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let objective = line.trim();
        if objective.is_empty() {
            continue;
        }
        if matches!(objective, "exit" | "quit") {
            break;
        }
        process_line(&orchestrator, objective).await;
    }

    println!();
    Ok(())
}

async fn process_line(orchestrator: &Orchestrator, objective: &str) {
    match orchestrator.process(objective).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => eprintln!("  [Error] {e}"),
    }
    println!();
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Reply(reply) => {
            for line in reply.lines() {
                println!("  {line}");
            }
        }
        Outcome::Completed(report) => print_report(report),
        Outcome::CircuitBroken(broken) => {
            eprintln!("  Circuit broken after {} attempts.", broken.attempts);
            println!("{}", serde_json::to_string_pretty(broken).unwrap_or_default());
        }
    }
}

fn print_report(report: &TaskReport) {
    let output = match &report.output {
        serde_json::Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    for line in output.lines() {
        println!("  {line}");
    }
    println!();
    println!(
        "  attempts: {}  tool calls: {}  tokens: {}{}",
        report.attempts,
        report.usage.tool_calls,
        report.usage.tokens.total_tokens,
        if report.matched_expected { "" } else { "  (output did not match the expected format)" }
    );
    if !report.verified_facts.is_empty() {
        println!("  learned facts: {}", report.verified_facts.join(", "));
    }
    if report.lessons_queued > 0 {
        println!(
            "  {} lesson(s) queued for review; see `taskforge lessons list`",
            report.lessons_queued
        );
    }
}

fn outcome_json(outcome: &Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Reply(reply) => serde_json::json!({"outcome": "reply", "reply": reply}),
        Outcome::Completed(report) => serde_json::json!({"outcome": "completed", "report": report}),
        Outcome::CircuitBroken(broken) => serde_json::json!({"outcome": "circuit_broken", "circuit_broken": broken}),
    }
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if outcome.is_circuit_broken() {
        ExitCode::from(CIRCUIT_BROKEN_EXIT)
    } else {
        ExitCode::SUCCESS
    }
}
