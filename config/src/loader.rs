//! # Environment Variable Loader
//!
//! Loads configuration from `CS_*` environment variables. Unset or
//! unparsable variables fall back to the section defaults.

use crate::config::{
    CoordinatorConfig, EngineConfig, ObservabilityConfig, ProcessorConfig, RemoteConfig,
    ResolverConfig, RetryConfig, StorageConfig
};
use std::env;

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Remote: {}", config.remote.base_url);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Retry (`CS_RETRY_*`)
/// - `CS_RETRY_MAX_ATTEMPTS` (default: 3)
/// - `CS_RETRY_BASE_DELAY_MS` (default: 2000)
/// - `CS_RETRY_MULTIPLIER` (default: 2.0)
/// - `CS_RETRY_MAX_DELAY_MS` (default: 300000)
/// - `CS_RETRY_FORK_NOTIFY_MAX_ATTEMPTS` (default: 2)
///
/// ### Processor
/// - `CS_PROCESSOR_MAX_CONCURRENCY` (default: 4)
/// - `CS_REMOTE_TIMEOUT_SECS` (default: 30)
/// - `CS_PROCESSOR_MAX_ITEMS_PER_DRAIN` (default: 100)
///
/// ### Coordinator
/// - `CS_COORDINATOR_ACTIVE_INTERVAL_SECS` (default: 5)
/// - `CS_COORDINATOR_IDLE_INTERVAL_SECS` (default: 60)
///
/// ### Other
/// - `CS_RESOLVER_STRATEGY`: last_write_wins/prefer_local/prefer_remote
/// - `CS_DATABASE_PATH`, `CS_DATABASE_MAX_CONNECTIONS`
/// - `CS_REMOTE_BASE_URL`, `CS_REMOTE_USER_AGENT`
/// - `CS_LOG_LEVEL`, `CS_METRICS_ENABLED`
pub fn load_from_env() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    Ok(EngineConfig {
        retry: load_retry_from_env()?,
        processor: load_processor_from_env()?,
        coordinator: load_coordinator_from_env()?,
        resolver: load_resolver_from_env()?,
        storage: load_storage_from_env()?,
        remote: load_remote_from_env()?,
        observability: load_observability_from_env()?
    })
}

fn load_retry_from_env() -> Result<RetryConfig, Box<dyn std::error::Error>> {
    let defaults = RetryConfig::default();
    Ok(RetryConfig {
        max_attempts: parse_env("CS_RETRY_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
        base_delay_ms: parse_env("CS_RETRY_BASE_DELAY_MS").unwrap_or(defaults.base_delay_ms),
        multiplier: parse_env("CS_RETRY_MULTIPLIER").unwrap_or(defaults.multiplier),
        max_delay_ms: parse_env("CS_RETRY_MAX_DELAY_MS").unwrap_or(defaults.max_delay_ms),
        fork_notify_max_attempts: parse_env("CS_RETRY_FORK_NOTIFY_MAX_ATTEMPTS")
            .unwrap_or(defaults.fork_notify_max_attempts)
    })
}

fn load_processor_from_env() -> Result<ProcessorConfig, Box<dyn std::error::Error>> {
    let defaults = ProcessorConfig::default();
    Ok(ProcessorConfig {
        max_concurrency: parse_env("CS_PROCESSOR_MAX_CONCURRENCY")
            .unwrap_or(defaults.max_concurrency),
        remote_timeout_secs: parse_env("CS_REMOTE_TIMEOUT_SECS")
            .unwrap_or(defaults.remote_timeout_secs),
        max_items_per_drain: parse_env("CS_PROCESSOR_MAX_ITEMS_PER_DRAIN")
            .unwrap_or(defaults.max_items_per_drain)
    })
}

fn load_coordinator_from_env() -> Result<CoordinatorConfig, Box<dyn std::error::Error>> {
    let defaults = CoordinatorConfig::default();
    Ok(CoordinatorConfig {
        active_interval_secs: parse_env("CS_COORDINATOR_ACTIVE_INTERVAL_SECS")
            .unwrap_or(defaults.active_interval_secs),
        idle_interval_secs: parse_env("CS_COORDINATOR_IDLE_INTERVAL_SECS")
            .unwrap_or(defaults.idle_interval_secs)
    })
}

fn load_resolver_from_env() -> Result<ResolverConfig, Box<dyn std::error::Error>> {
    Ok(ResolverConfig {
        strategy: env::var("CS_RESOLVER_STRATEGY")
            .unwrap_or_else(|_| ResolverConfig::default().strategy)
    })
}

fn load_storage_from_env() -> Result<StorageConfig, Box<dyn std::error::Error>> {
    let defaults = StorageConfig::default();
    Ok(StorageConfig {
        database_path: env::var("CS_DATABASE_PATH").unwrap_or(defaults.database_path),
        max_connections: parse_env("CS_DATABASE_MAX_CONNECTIONS")
            .unwrap_or(defaults.max_connections)
    })
}

fn load_remote_from_env() -> Result<RemoteConfig, Box<dyn std::error::Error>> {
    let defaults = RemoteConfig::default();
    Ok(RemoteConfig {
        base_url: env::var("CS_REMOTE_BASE_URL").unwrap_or(defaults.base_url),
        user_agent: env::var("CS_REMOTE_USER_AGENT").unwrap_or(defaults.user_agent)
    })
}

fn load_observability_from_env() -> Result<ObservabilityConfig, Box<dyn std::error::Error>> {
    let defaults = ObservabilityConfig::default();
    Ok(ObservabilityConfig {
        log_level: env::var("CS_LOG_LEVEL").unwrap_or(defaults.log_level),
        metrics_enabled: parse_env("CS_METRICS_ENABLED").unwrap_or(defaults.metrics_enabled)
    })
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>)
    }
}
