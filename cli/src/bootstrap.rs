//! Configuration layering and engine wiring shared by every command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adapters::{HttpRemoteContentService, SharedCredentials};
use anyhow::Result;
use clap::Args;
use config::{EngineConfig, load_from_env, load_from_file, merge_configs, validate};
use storage::SqliteStore;
use sync::SyncEngine;
use tracing::debug;

use crate::ux_error;

/// Bearer token for the remote content service.
pub const TOKEN_ENV: &str = "CS_REMOTE_TOKEN";

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (TOML or YAML)
    #[arg(long, short, global = true, env = "CS_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database holding content and the sync queue
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Base URL of the remote content service
    #[arg(long, global = true)]
    pub remote_url: Option<String>
}

impl GlobalArgs {
    /// Command-line overrides as a config layer; `None` when no flag is set.
    fn overrides(&self) -> Option<EngineConfig> {
        if self.database.is_none() && self.remote_url.is_none() {
            return None;
        }
        let mut config = EngineConfig::default();
        if let Some(database) = &self.database {
            config.storage.database_path.clone_from(database);
        }
        if let Some(remote_url) = &self.remote_url {
            config.remote.base_url.clone_from(remote_url);
        }
        Some(config)
    }
}

/// defaults < file < env < command line, validated once merged.
pub fn load_config(args: &GlobalArgs) -> Result<EngineConfig> {
    let file_config = match &args.config {
        Some(path) => load_from_file(path)
            .map_err(|e| ux_error::config_error(&path.display().to_string(), &e.to_string()))?,
        None => EngineConfig::default()
    };
    let env_config = load_from_env()
        .map_err(|e| ux_error::config_error("environment", &e.to_string()))?;

    let config = merge_configs(
        EngineConfig::default(),
        file_config,
        "file",
        env_config,
        "env",
        args.overrides(),
        "cli"
    );
    validate(&config).map_err(|e| ux_error::config_error("merged settings", &e.to_string()))?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

/// An engine over the configured SQLite store and HTTP remote.
pub struct Runtime {
    pub engine: SyncEngine,
    pub store: Arc<SqliteStore>,
    pub credentials: Arc<SharedCredentials>
}

impl Runtime {
    pub async fn open(config: &EngineConfig) -> Result<Self> {
        let path = Path::new(&config.storage.database_path);
        let store = SqliteStore::connect(path, config.storage.max_connections)
            .await
            .map_err(|e| ux_error::store_unavailable(&config.storage.database_path, &e.to_string()))?;
        let store = Arc::new(store);

        let timeout = Duration::from_secs(config.processor.remote_timeout_secs);
        let remote = HttpRemoteContentService::new(&config.remote, timeout)
            .map_err(|e| ux_error::remote_unreachable(&config.remote.base_url, &e.to_string()))?;
        let credentials = Arc::new(SharedCredentials::from_env(TOKEN_ENV));

        let engine =
            SyncEngine::new(store.clone(), Arc::new(remote), credentials.clone(), config).await?;
        Ok(Self {
            engine,
            store,
            credentials
        })
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}
