use anyhow::Result;
use clap::Parser;
use config::EngineConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod bootstrap;
mod commands;
mod output;
pub mod ux_error;

use bootstrap::{Runtime, load_config};
use commands::{Cli, Commands};

async fn dispatch(command: Commands, runtime: &Runtime, config: &EngineConfig) -> Result<()> {
    let engine = &runtime.engine;
    match command {
        Commands::Status(args) => commands::status::run(args, engine).await,
        Commands::Queue(args) => commands::queue::run(args, engine).await,
        Commands::Drain(args) => commands::drain::run(args, runtime).await,
        Commands::Retry(args) => commands::retry::run(args, engine).await,
        Commands::Recover(args) => commands::recover::run(args, engine).await,
        Commands::Pull(args) => commands::pull::run(args, engine, &config.remote.base_url).await,
        Commands::Run(args) => {
            commands::run::run(args, runtime, config.observability.metrics_enabled).await
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let runtime = Runtime::open(&config).await?;
    let result = dispatch(cli.command, &runtime, &config).await;
    runtime.close().await;
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(error) = execute(cli).await {
        match error.downcast_ref::<ux_error::UxError>() {
            Some(ux) => ux.display(),
            None => eprintln!("error: {error:#}")
        }
        std::process::exit(1);
    }
}
