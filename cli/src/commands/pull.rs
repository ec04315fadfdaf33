//! Pull command - fetch one remote record and reconcile it

use anyhow::Result;
use charter_core::RemoteId;
use clap::Args;
use errors::RemoteError;
use sync::{ReconcileOutcome, SyncEngine, SyncError};

use crate::bootstrap::TOKEN_ENV;
use crate::output;
use crate::ux_error;

#[derive(Args)]
pub struct PullArgs {
    /// Remote id of the record
    pub remote_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

fn describe(outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::NotTracked => "No local copy tracks this record".to_string(),
        ReconcileOutcome::RemoteApplied { content_id } => {
            format!("Local copy {content_id} updated from remote")
        }
        ReconcileOutcome::KeptLocal { content_id } => {
            format!("Local copy {content_id} kept")
        }
        ReconcileOutcome::LocalPending { content_id } => {
            format!("Local copy {content_id} has queued changes; remote ignored")
        }
    }
}

pub async fn run(args: PullArgs, engine: &SyncEngine, base_url: &str) -> Result<()> {
    let remote_id = RemoteId::new(args.remote_id.trim());

    let outcome = match engine.pull(&remote_id).await {
        Ok(outcome) => outcome,
        Err(SyncError::Remote(RemoteError::Unauthorized { .. })) => {
            return Err(ux_error::not_signed_in(TOKEN_ENV).into());
        }
        Err(SyncError::Remote(
            e @ (RemoteError::Network { .. } | RemoteError::Timeout { .. })
        )) => {
            return Err(ux_error::remote_unreachable(base_url, &e.to_string()).into());
        }
        Err(e) => return Err(e.into())
    };

    if args.json {
        return output::json(&outcome);
    }
    output::success(&describe(&outcome));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::ContentId;

    #[test]
    fn test_describe_outcomes() {
        let id = ContentId::new();
        assert!(describe(&ReconcileOutcome::NotTracked).contains("No local copy"));
        assert!(describe(&ReconcileOutcome::LocalPending { content_id: id }).contains("queued"));
        assert!(describe(&ReconcileOutcome::RemoteApplied { content_id: id }).contains(&id.to_string()));
    }
}
