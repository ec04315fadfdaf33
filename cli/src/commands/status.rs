//! Status command - content list with sync labels

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use sync::SyncEngine;

use crate::output;

#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRow {
    id: String,
    title: String,
    visibility: String,
    remote_id: Option<String>,
    label: charter_core::SyncLabel
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    pending_work: usize,
    content: Vec<ContentRow>
}

pub async fn run(args: StatusArgs, engine: &SyncEngine) -> Result<()> {
    let mut rows = Vec::new();
    for content in engine.list_content().await? {
        let Some(label) = engine.label(content.id).await? else {
            continue;
        };
        rows.push(ContentRow {
            id: content.id.to_string(),
            title: content.title.clone(),
            visibility: content.visibility.to_string(),
            remote_id: content.remote.remote_id().map(ToString::to_string),
            label
        });
    }
    let report = StatusReport {
        pending_work: engine.pending_work().await?,
        content: rows
    };

    if args.json {
        return output::json(&report);
    }

    output::header("Content");
    println!();
    if report.content.is_empty() {
        println!("  {}", "No local content".dimmed());
    }
    for row in &report.content {
        println!(
            "  {}  {}  {}",
            row.id.dimmed(),
            row.title.bold(),
            output::label(&row.label)
        );
    }
    println!();
    println!(
        "  {} {}",
        "Queued operations:".dimmed(),
        report.pending_work.to_string().cyan()
    );
    Ok(())
}
