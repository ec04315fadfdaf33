pub mod drain;
pub mod pull;
pub mod queue;
pub mod recover;
pub mod retry;
pub mod run;
pub mod status;

use clap::{Parser, Subcommand};

use crate::bootstrap::GlobalArgs;

#[derive(Parser)]
#[command(
    name = "charter-sync",
    author,
    version,
    about = "Offline-first content sync engine",
    long_about = "Inspect and drive the local sync queue.\n\nSettings come from defaults, an \
                  optional config file, CS_* environment variables and command-line flags, in \
                  that order. The remote bearer token is read from CS_REMOTE_TOKEN."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show content and its sync state")]
    Status(status::StatusArgs),

    #[command(about = "List queued sync operations")]
    Queue(queue::QueueArgs),

    #[command(about = "Process due queue items once")]
    Drain(drain::DrainArgs),

    #[command(about = "Re-arm a failed queue item")]
    Retry(retry::RetryArgs),

    #[command(about = "Requeue operations interrupted by a crash")]
    Recover(recover::RecoverArgs),

    #[command(about = "Fetch a remote record and reconcile it with the local copy")]
    Pull(pull::PullArgs),

    #[command(about = "Run the background coordinator until interrupted")]
    Run(run::RunArgs)
}
