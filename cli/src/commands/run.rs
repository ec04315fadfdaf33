//! Run command - keep the coordinator draining until Ctrl-C

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use sync::SyncEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::bootstrap::Runtime;
use crate::output;

#[derive(Args)]
pub struct RunArgs {
    /// Address for the Prometheus scrape endpoint
    #[arg(long, default_value = "127.0.0.1:9464")]
    pub metrics_addr: SocketAddr,

    /// Print sync events as JSON lines
    #[arg(long)]
    pub json: bool
}

fn event_line(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Enqueued {
            content_id,
            operation,
            status,
            ..
        } => format!("{} {operation} for {content_id} ({status})", "queued".yellow()),
        SyncEvent::Superseded {
            content_id,
            operation,
            ..
        } => format!("{} {operation} for {content_id}", "superseded".dimmed()),
        SyncEvent::Discarded {
            content_id,
            operation,
            ..
        } => format!("{} {operation} for {content_id}", "discarded".dimmed()),
        SyncEvent::StatusChanged { content_id, status } => {
            format!("{} {content_id} is now {status}", "status".cyan())
        }
        SyncEvent::RetryScheduled {
            content_id,
            attempt,
            next_attempt_at,
            ..
        } => format!(
            "{} {content_id} attempt {attempt} at {}",
            "retry".yellow(),
            next_attempt_at.format("%H:%M:%S")
        ),
        SyncEvent::Succeeded {
            content_id,
            operation,
            ..
        } => format!("{} {operation} for {content_id}", "synced".green()),
        SyncEvent::Failed {
            content_id,
            operation,
            reason,
            ..
        } => format!("{} {operation} for {content_id}: {reason}", "failed".red()),
        SyncEvent::NeedsAuth { content_id, .. } => {
            format!("{} {content_id} waits for a credential", "held".magenta())
        }
        SyncEvent::OrphanedRemote {
            content_id, reason, ..
        } => format!("{} {content_id}: {reason}", "orphaned".red()),
        SyncEvent::ForkNotifyDropped {
            content_id,
            source_remote_id,
            ..
        } => format!(
            "{} fork notice from {content_id} to {source_remote_id}",
            "dropped".dimmed()
        )
    }
}

pub async fn run(args: RunArgs, runtime: &Runtime, metrics_enabled: bool) -> Result<()> {
    if metrics_enabled {
        PrometheusBuilder::new()
            .with_http_listener(args.metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(addr = %args.metrics_addr, "Metrics endpoint listening");
    }

    let engine = &runtime.engine;
    let requeued = engine.recover().await?;
    if requeued > 0 {
        info!(requeued, "Requeued interrupted operations");
    }

    let mut events = engine.subscribe();
    let handle = engine.start_coordinator();
    output::success(&format!(
        "Coordinator running ({} queued); press Ctrl-C to stop",
        engine.pending_work().await?
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) if args.json => println!("{}", serde_json::to_string(&event)?),
                Ok(event) => println!("  {}", event_line(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
                Err(RecvError::Closed) => break
            }
        }
    }

    handle.shutdown().await;
    output::success("Coordinator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::{ContentId, QueueItemId, RemoteId};

    #[test]
    fn test_event_line_names_content() {
        colored::control::set_override(false);
        let content_id = ContentId::new();

        let line = event_line(&SyncEvent::NeedsAuth {
            content_id,
            item_id: QueueItemId::new()
        });
        assert_eq!(line, format!("held {content_id} waits for a credential"));

        let line = event_line(&SyncEvent::ForkNotifyDropped {
            content_id,
            source_remote_id: RemoteId::new("r-9"),
            reason: "gone".to_string()
        });
        assert!(line.ends_with("to r-9"));
    }
}
