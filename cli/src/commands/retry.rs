//! Retry command - manual re-arm of a failed item

use anyhow::Result;
use charter_core::{QueueItemId, QueueStatus};
use clap::Args;
use sync::{SyncEngine, SyncError};

use crate::bootstrap::TOKEN_ENV;
use crate::output;
use crate::ux_error;

#[derive(Args)]
pub struct RetryArgs {
    /// Id of the failed queue item
    pub item_id: String,

    /// Drain straight away instead of waiting for the coordinator
    #[arg(long)]
    pub now: bool
}

pub async fn run(args: RetryArgs, engine: &SyncEngine) -> Result<()> {
    let item_id: QueueItemId = args
        .item_id
        .parse()
        .map_err(|_| ux_error::invalid_item_id(&args.item_id))?;

    let status = match engine.retry_failed(item_id).await {
        Ok(status) => status,
        Err(SyncError::NotRetriable { id, status }) => {
            return Err(ux_error::item_not_retriable(&id.to_string(), &status.to_string()).into());
        }
        Err(e) => return Err(e.into())
    };

    if status == QueueStatus::PendingAuth {
        output::warn(&format!(
            "Item {item_id} re-armed but waits for a credential ({TOKEN_ENV} is not set)"
        ));
        return Ok(());
    }
    output::success(&format!("Item {item_id} re-armed"));

    if args.now {
        let report = engine.drain().await?;
        println!(
            "  {} dispatched, {} succeeded, {} failed",
            report.dispatched, report.succeeded, report.failed
        );
    }
    Ok(())
}
