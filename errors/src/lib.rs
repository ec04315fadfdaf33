//! # Content Sync Errors
//!
//! Error types shared by the storage layer, the remote capability and the
//! sync engine.
//!
//! - `StoreError` covers the durable store (content records and queue items)
//! - `RemoteError` covers the remote content service and carries the
//!   classification the processor uses to decide between retry, terminal
//!   failure and holding for authentication

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Durable store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection to {backend} failed: {reason}")]
    Connection { backend: String, reason: String },

    #[error("Query on {backend} failed: {reason}")]
    Query { backend: String, reason: String },

    #[error("Serialization error: {error_type} - {reason}")]
    Serialization { error_type: String, reason: String },

    #[error("Not found on {backend}:{id}")]
    NotFound { backend: String, id: String },

    #[error("Transaction on {backend} failed: {reason}")]
    Transaction { backend: String, reason: String }
}

impl StoreError {
    pub fn query(backend: &str, reason: impl std::fmt::Display) -> Self {
        Self::Query {
            backend: backend.to_string(),
            reason: reason.to_string()
        }
    }

    pub fn transaction(backend: &str, reason: impl std::fmt::Display) -> Self {
        Self::Transaction {
            backend: backend.to_string(),
            reason: reason.to_string()
        }
    }

    pub fn serialization(error_type: &str, reason: impl std::fmt::Display) -> Self {
        Self::Serialization {
            error_type: error_type.to_string(),
            reason: reason.to_string()
        }
    }
}

/// How the processor must treat a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureClass {
    /// Retried automatically with exponential backoff, bounded attempts.
    Transient,
    /// Never retried automatically; surfaced with a manual retry affordance.
    Permanent,
    /// Held until a credential is available again; never marked failed.
    Auth
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
            Self::Auth => write!(f, "auth")
        }
    }
}

/// Remote content service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Timeout: remote call took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Server error {status}: {reason}")]
    Server { status: u16, reason: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Validation rejected: {reason}")]
    Validation { reason: String },

    #[error("Remote content not found: {remote_id}")]
    NotFound { remote_id: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String }
}

impl RemoteError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Timeout { .. }
            | Self::Network { .. }
            | Self::Server { .. }
            | Self::RateLimited { .. } => FailureClass::Transient,
            Self::Validation { .. } | Self::NotFound { .. } | Self::Forbidden { .. } => {
                FailureClass::Permanent
            }
            Self::Unauthorized { .. } => FailureClass::Auth
        }
    }

    /// Minimum wait the remote asked for before the next attempt.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(std::time::Duration::from_secs(*retry_after_secs))
            }
            _ => None
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
