//! # Configuration Structures
//!
//! All configuration structures for the content sync engine.
//!
//! Every structure:
//! - Uses `serde` for serialization/deserialization, with per-field defaults
//! - Uses `validator` for range and format checks

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level configuration for the content sync engine.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Aggregates the retry policy, processor limits, coordinator scheduling,
/// conflict resolution, storage, remote service and observability settings
/// into one tree that is loaded once at process start and handed to the
/// engine.
///
/// ## Usage
/// ```rust,no_run
/// use config::EngineConfig;
///
/// let config = EngineConfig::default();
/// println!("Max attempts: {}", config.retry.max_attempts);
/// ```
///
/// ## Validation
/// All nested configurations must pass their own validation rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct EngineConfig {
    /// Automatic retry and backoff policy
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Queue drain limits
    #[serde(default)]
    #[validate(nested)]
    pub processor: ProcessorConfig,

    /// Timer and lifecycle scheduling
    #[serde(default)]
    #[validate(nested)]
    pub coordinator: CoordinatorConfig,

    /// Pull reconciliation
    #[serde(default)]
    #[validate(nested)]
    pub resolver: ResolverConfig,

    /// Durable store location
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Remote content service endpoint
    #[serde(default)]
    #[validate(nested)]
    pub remote: RemoteConfig,

    /// Logging and metrics
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig
}

/// Retry policy for transient remote failures.
///
/// The delay before attempt `n + 1` is
/// `base_delay_ms * multiplier^(n - 1)`, capped at `max_delay_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RetryConfig {
    /// Automatic attempts before an item is marked failed
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    #[validate(range(min = 1, max = 3_600_000))]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    #[validate(range(min = 1, max = 86_400_000))]
    pub max_delay_ms: u64,

    /// Fork-count notifications are fire-and-forget: one retry at most
    #[serde(default = "default_fork_notify_max_attempts")]
    #[validate(range(min = 1, max = 2))]
    pub fork_notify_max_attempts: u32
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_fork_notify_max_attempts() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            fork_notify_max_attempts: default_fork_notify_max_attempts()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ProcessorConfig {
    /// Distinct content ids synced concurrently
    #[serde(default = "default_max_concurrency")]
    #[validate(range(min = 1, max = 16))]
    pub max_concurrency: usize,

    /// Per remote call; expiry counts as a transient failure
    #[serde(default = "default_remote_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub remote_timeout_secs: u64,

    /// Upper bound on items handled by one drain
    #[serde(default = "default_max_items_per_drain")]
    #[validate(range(min = 1, max = 10_000))]
    pub max_items_per_drain: usize
}

fn default_max_concurrency() -> usize {
    4
}

fn default_remote_timeout_secs() -> u64 {
    30
}

fn default_max_items_per_drain() -> usize {
    100
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            remote_timeout_secs: default_remote_timeout_secs(),
            max_items_per_drain: default_max_items_per_drain()
        }
    }
}

/// Coordinator timer intervals.
///
/// # M-CANONICAL-DOCS
///
/// ## Fields
/// - `active_interval_secs`: tick interval while work is queued (default: 5)
/// - `idle_interval_secs`: tick interval once a drain leaves nothing pending
///   (default: 60)
///
/// ## Validation
/// `idle_interval_secs` must be at least `active_interval_secs`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_coordinator_intervals"))]
pub struct CoordinatorConfig {
    #[serde(default = "default_active_interval_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub active_interval_secs: u64,

    #[serde(default = "default_idle_interval_secs")]
    #[validate(range(min = 1, max = 86_400))]
    pub idle_interval_secs: u64
}

fn default_active_interval_secs() -> u64 {
    5
}

fn default_idle_interval_secs() -> u64 {
    60
}

fn validate_coordinator_intervals(
    config: &CoordinatorConfig
) -> Result<(), validator::ValidationError> {
    if config.idle_interval_secs < config.active_interval_secs {
        return Err(validator::ValidationError::new(
            "idle interval shorter than active interval"
        ));
    }
    Ok(())
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: default_active_interval_secs(),
            idle_interval_secs: default_idle_interval_secs()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ResolverConfig {
    /// `last_write_wins`, `prefer_local` or `prefer_remote`
    #[serde(default = "default_resolver_strategy")]
    #[validate(custom(function = "validate_resolver_strategy"))]
    pub strategy: String
}

fn default_resolver_strategy() -> String {
    "last_write_wins".to_string()
}

fn validate_resolver_strategy(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "last_write_wins" | "prefer_local" | "prefer_remote" => Ok(()),
        _ => Err(validator::ValidationError::new(
            "Invalid conflict resolution strategy"
        ))
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy: default_resolver_strategy()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    #[validate(length(min = 1, max = 4096))]
    pub database_path: String,

    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 64))]
    pub max_connections: u32
}

fn default_database_path() -> String {
    ".charter/sync.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: default_max_connections()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    #[validate(length(min = 1, max = 2048))]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    #[validate(length(min = 1, max = 255))]
    pub user_agent: String
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_user_agent() -> String {
    concat!("charter-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    /// trace/debug/info/warn/error
    #[serde(default = "default_log_level")]
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn validate_log_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid log level"))
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: default_metrics_enabled()
        }
    }
}
