//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)
//!
//! A source only overrides a field it sets to a non-default value, so a
//! sparse file or environment never resets what a lower source chose.

use crate::config::EngineConfig;

/// Merge multiple configuration sources with precedence.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::{EngineConfig, load_from_env, load_from_file, merge_configs};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let defaults = EngineConfig::default();
///     let from_file = load_from_file(Path::new("charter-sync.toml"))?;
///     let from_env = load_from_env()?;
///
///     let _config = merge_configs(defaults, from_file, "file", from_env, "env", None, "cli");
///     Ok(())
/// }
/// ```
pub fn merge_configs(
    defaults: EngineConfig,
    file_config: EngineConfig,
    file_source_name: &str,
    env_config: EngineConfig,
    env_source_name: &str,
    cli_config: Option<EngineConfig>,
    cli_source_name: &str
) -> EngineConfig {
    let mut config = defaults;

    config = merge_with_logging(config, &file_config, file_source_name);
    config = merge_with_logging(config, &env_config, env_source_name);

    if let Some(cli) = cli_config {
        config = merge_with_logging(config, &cli, cli_source_name);
    }

    config
}

macro_rules! merge_field {
    ($changes:ident, $base:ident, $over:ident, $defaults:ident, $section:ident . $field:ident) => {
        if $over.$section.$field != $defaults.$section.$field
            && $over.$section.$field != $base.$section.$field
        {
            $changes.push(format!(
                concat!(stringify!($section), ".", stringify!($field), " = {:?}"),
                $over.$section.$field
            ));
            $base.$section.$field = $over.$section.$field.clone();
        }
    };
}

fn merge_with_logging(
    mut base: EngineConfig,
    over: &EngineConfig,
    source_name: &str
) -> EngineConfig {
    let defaults = EngineConfig::default();
    let mut changes: Vec<String> = Vec::new();

    merge_field!(changes, base, over, defaults, retry.max_attempts);
    merge_field!(changes, base, over, defaults, retry.base_delay_ms);
    merge_field!(changes, base, over, defaults, retry.multiplier);
    merge_field!(changes, base, over, defaults, retry.max_delay_ms);
    merge_field!(changes, base, over, defaults, retry.fork_notify_max_attempts);

    merge_field!(changes, base, over, defaults, processor.max_concurrency);
    merge_field!(changes, base, over, defaults, processor.remote_timeout_secs);
    merge_field!(changes, base, over, defaults, processor.max_items_per_drain);

    merge_field!(changes, base, over, defaults, coordinator.active_interval_secs);
    merge_field!(changes, base, over, defaults, coordinator.idle_interval_secs);

    merge_field!(changes, base, over, defaults, resolver.strategy);

    merge_field!(changes, base, over, defaults, storage.database_path);
    merge_field!(changes, base, over, defaults, storage.max_connections);

    merge_field!(changes, base, over, defaults, remote.base_url);
    merge_field!(changes, base, over, defaults, remote.user_agent);

    merge_field!(changes, base, over, defaults, observability.log_level);
    merge_field!(changes, base, over, defaults, observability.metrics_enabled);

    if !changes.is_empty() {
        tracing::debug!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}
