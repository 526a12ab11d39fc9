//! `taskforge facts`, `capabilities`, and `stats`.

use std::path::Path;

use crate::runtime::{load_config, open_store};

const VALUE_PREVIEW_CHARS: usize = 60;

pub async fn facts(config: Option<&Path>) -> anyhow::Result<()> {
    let store = open_store(&load_config(config)?).await?;
    let facts = store.facts().await?;
    if facts.is_empty() {
        println!("  No facts stored yet.");
        return Ok(());
    }

    println!("  {:<28} {:<12} {:>5}  {:<20} VALUE", "KEY", "CATEGORY", "CONF", "PROVENANCE");
    for fact in &facts {
        let value: String = fact
            .value
            .replace('\n', " ")
            .chars()
            .take(VALUE_PREVIEW_CHARS)
            .collect();
        println!(
            "  {:<28} {:<12} {:>5.2}  {:<20} {value}",
            fact.key,
            fact.category,
            fact.confidence,
            format!("{:?}", fact.provenance),
        );
    }
    Ok(())
}

pub async fn capabilities(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let store = open_store(&config).await?;
    let mut records = store.capabilities().await?;
    if records.is_empty() {
        println!("  No tool calls observed yet.");
        return Ok(());
    }

    records.sort_by(|a, b| a.tool.cmp(&b.tool));
    println!("  {:<20} {:>7} {:>9} {:>12}  LAST FAILURE", "TOOL", "CALLS", "SUCCESSES", "RELIABILITY");
    for record in &records {
        let reliability = match record.reliability(config.knowledge.min_sample_size) {
            Some(r) => format!("{:.0}%", r * 100.0),
            None => "n/a".into(),
        };
        println!(
            "  {:<20} {:>7} {:>9} {:>12}  {}",
            record.tool,
            record.total_calls,
            record.successes,
            reliability,
            record.last_failure.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn stats(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let store = open_store(&config).await?;
    let stats = store.stats().await?;

    println!("  Knowledge store: {}", config.knowledge.resolved_db_path().display());
    println!("  Tools:            {}", stats.tools);
    println!("  Facts:            {}", stats.facts);
    println!("  Patterns:         {}", stats.patterns);
    println!("  Formats:          {}", stats.formats);
    println!("  Capabilities:     {}", stats.capabilities);
    println!("  Pending lessons:  {}", stats.pending_lessons);
    Ok(())
}
