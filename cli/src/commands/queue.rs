//! Queue command - inspect queued sync operations

use anyhow::{Result, bail};
use charter_core::{QueueStatus, SyncQueueItem};
use clap::Args;
use colored::Colorize;
use sync::SyncEngine;

use crate::output;

#[derive(Args)]
pub struct QueueArgs {
    /// Only items in this status (pending, inFlight, failed, pendingAuth)
    #[arg(long)]
    pub status: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

fn parse_status(raw: &str) -> Result<QueueStatus> {
    match raw.parse() {
        Ok(status) => Ok(status),
        Err(_) => bail!(
            "unknown queue status '{raw}' (expected pending, inFlight, succeeded, failed or \
             pendingAuth)"
        )
    }
}

fn filter(items: Vec<SyncQueueItem>, status: Option<QueueStatus>) -> Vec<SyncQueueItem> {
    match status {
        Some(status) => items.into_iter().filter(|i| i.status == status).collect(),
        None => items
    }
}

pub async fn run(args: QueueArgs, engine: &SyncEngine) -> Result<()> {
    let status = args.status.as_deref().map(parse_status).transpose()?;
    let items = filter(engine.list_items().await?, status);

    if args.json {
        return output::json(&items);
    }

    output::header("Sync queue");
    println!();
    if items.is_empty() {
        println!("  {}", "Nothing queued".dimmed());
        return Ok(());
    }
    for item in &items {
        println!(
            "  {:>4}  {}  {:<14} {:<12} attempts={}",
            item.sequence,
            item.id.to_string().dimmed(),
            item.operation.to_string().bold(),
            output::queue_status(item.status),
            item.attempt_count
        );
        if let Some(error) = &item.last_error {
            println!("        {} {}", "last error:".dimmed(), error.red());
        }
    }
    if items.iter().any(|item| item.status == QueueStatus::Failed) {
        println!();
        output::hint("Retry a failed item with `charter-sync retry <ITEM_ID>`");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::{ContentId, OperationPayload, RemoteId, SyncOperation};

    fn item(status: QueueStatus) -> SyncQueueItem {
        SyncQueueItem::new(
            ContentId::new(),
            SyncOperation::ForkNotify,
            OperationPayload::ForkNotify {
                source_remote_id: RemoteId::new("r-1")
            },
            status,
            1,
            chrono::Utc::now()
        )
    }

    #[test]
    fn test_parse_status_accepts_wire_names() {
        assert_eq!(parse_status("pendingAuth").unwrap(), QueueStatus::PendingAuth);
        assert_eq!(parse_status("failed").unwrap(), QueueStatus::Failed);
        assert!(parse_status("stuck").is_err());
    }

    #[test]
    fn test_filter_by_status() {
        let items = vec![item(QueueStatus::Pending), item(QueueStatus::Failed)];

        let failed = filter(items.clone(), Some(QueueStatus::Failed));

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, QueueStatus::Failed);
        assert_eq!(filter(items, None).len(), 2);
    }
}
