//! # Configuration Validation
//!
//! Checks a merged [`EngineConfig`] before it reaches the engine.

use crate::config::EngineConfig;
use validator::Validate;

/// Validate a configuration tree.
///
/// ## Validation Rules
/// ### Retry
/// - `max_attempts`: 1-20
/// - `multiplier`: 1.0-10.0
/// - `fork_notify_max_attempts`: 1-2
///
/// ### Processor
/// - `max_concurrency`: 1-16
/// - `remote_timeout_secs`: 1-300
///
/// ### Coordinator
/// - `idle_interval_secs` must not be shorter than `active_interval_secs`
///
/// ### Resolver
/// - `strategy`: "last_write_wins", "prefer_local" or "prefer_remote"
///
/// ### Observability
/// - `log_level`: "trace", "debug", "info", "warn" or "error"
pub fn validate(config: &EngineConfig) -> Result<(), validator::ValidationErrors> {
    let result = config.validate();
    if let Err(errors) = &result {
        tracing::warn!(%errors, "Configuration rejected");
    }
    result
}
