use anyhow::Result;
use clap::Args;
use sync::SyncEngine;

use crate::output;

#[derive(Args)]
pub struct RecoverArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool
}

pub async fn run(args: RecoverArgs, engine: &SyncEngine) -> Result<()> {
    let requeued = engine.recover().await?;

    if args.json {
        return output::json(&serde_json::json!({ "requeued": requeued }));
    }
    if requeued == 0 {
        output::success("Nothing was interrupted");
    } else {
        output::success(&format!("Requeued {requeued} interrupted operations"));
    }
    Ok(())
}
