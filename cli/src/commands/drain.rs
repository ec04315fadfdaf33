//! Drain command - one pass over due queue items

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use sync::{DrainReport, SyncEngine};

use crate::bootstrap::{Runtime, TOKEN_ENV};
use crate::output;

#[derive(Args)]
pub struct DrainArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

fn report_json(report: &DrainReport, remaining: usize) -> serde_json::Value {
    serde_json::json!({
        "promoted": report.promoted,
        "dispatched": report.dispatched,
        "succeeded": report.succeeded,
        "retried": report.retried,
        "failed": report.failed,
        "pendingAuth": report.pending_auth,
        "dropped": report.dropped,
        "remaining": remaining
    })
}

pub async fn run(args: DrainArgs, runtime: &Runtime) -> Result<()> {
    let engine: &SyncEngine = &runtime.engine;
    let report = engine.drain().await?;
    let remaining = engine.pending_work().await?;

    if args.json {
        return output::json(&report_json(&report, remaining));
    }

    output::header("Drain");
    println!();
    println!("  {} {} dispatched", "→".cyan(), report.dispatched);
    println!("  {} {} succeeded", "✓".green(), report.succeeded);
    if report.retried > 0 {
        println!("  {} {} scheduled for retry", "↻".yellow(), report.retried);
    }
    if report.failed > 0 {
        println!("  {} {} failed", "✗".red(), report.failed.to_string().red());
    }
    if report.dropped > 0 {
        println!("  {} {} fork notifications dropped", "-".dimmed(), report.dropped);
    }
    println!();

    if report.pending_auth > 0 || !runtime.credentials.is_signed_in().await {
        if remaining > 0 {
            output::warn(&format!(
                "{remaining} operations wait for a credential; export {TOKEN_ENV} and drain again"
            ));
        }
    } else if remaining == 0 {
        output::success("Queue is empty");
    } else {
        output::hint(&format!("{remaining} operations still queued"));
    }
    Ok(())
}
