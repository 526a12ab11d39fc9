//! `taskforge lessons`: review queued lessons before they reach the store.

use std::path::Path;
use taskforge_core::knowledge::ApprovedRecord;

use crate::runtime::{load_config, open_store};

pub async fn list(config: Option<&Path>) -> anyhow::Result<()> {
    let store = open_store(&load_config(config)?).await?;
    let pending = store.pending_lessons().await?;

    if pending.is_empty() {
        println!("  No lessons waiting for review.");
        return Ok(());
    }

    println!("  Pending lessons ({})", pending.len());
    println!();
    for item in &pending {
        println!(
            "  {}  [{:?}, confidence {:.2}]",
            item.id,
            item.lesson.kind(),
            item.lesson.confidence()
        );
        println!("      {}", item.lesson.summary());
    }
    println!();
    println!("  Approve with `taskforge lessons approve <id>`, or dismiss with `taskforge lessons dismiss <id>`.");
    Ok(())
}

pub async fn approve(config: Option<&Path>, id: &str) -> anyhow::Result<()> {
    let store = open_store(&load_config(config)?).await?;
    let record = store.approve_lesson(id).await?;
    println!("  Approved {id}: {}", describe(&record));
    Ok(())
}

pub async fn approve_all(config: Option<&Path>) -> anyhow::Result<()> {
    let store = open_store(&load_config(config)?).await?;
    let approved = store.approve_all().await?;
    for record in &approved {
        println!("  Approved: {}", describe(record));
    }
    println!("  {} lesson(s) approved.", approved.len());
    Ok(())
}

pub async fn dismiss(config: Option<&Path>, id: &str) -> anyhow::Result<()> {
    let store = open_store(&load_config(config)?).await?;
    store.dismiss_lesson(id).await?;
    println!("  Dismissed {id}.");
    Ok(())
}

pub async fn dismiss_all(config: Option<&Path>) -> anyhow::Result<()> {
    let store = open_store(&load_config(config)?).await?;
    let count = store.dismiss_all().await?;
    println!("  {count} lesson(s) dismissed.");
    Ok(())
}

fn describe(record: &ApprovedRecord) -> String {
    match record {
        ApprovedRecord::Fact(fact) => format!("fact {} = {}", fact.key, fact.value),
        ApprovedRecord::Pattern(pattern) => format!("pattern {}", pattern.name),
    }
}
