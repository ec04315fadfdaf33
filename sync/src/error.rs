use charter_core::{ContentId, QueueItemId, QueueStatus, Visibility};
use errors::{RemoteError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Content not found: {id}")]
    ContentNotFound { id: ContentId },

    #[error("Queue item not found: {id}")]
    QueueItemNotFound { id: QueueItemId },

    #[error("Deleting {visibility} content {id} requires an explicit delete intent")]
    DeleteIntentRequired { id: ContentId, visibility: Visibility },

    #[error("Queue item {id} is {status}; only failed items can be retried")]
    NotRetriable { id: QueueItemId, status: QueueStatus },

    /// Programmer error; never shown to end users.
    #[error("Invariant violation: {detail}")]
    InvariantViolation { detail: String }
}

impl SyncError {
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display() {
        let id = ContentId::new();
        let error = SyncError::DeleteIntentRequired {
            id,
            visibility: Visibility::Public
        };
        assert_eq!(
            error.to_string(),
            format!("Deleting public content {id} requires an explicit delete intent")
        );

        let error = SyncError::NotRetriable {
            id: QueueItemId::new(),
            status: QueueStatus::InFlight
        };
        assert!(error.to_string().contains("inFlight"));
    }

    #[test]
    fn test_store_error_conversion() {
        let error: SyncError = StoreError::query("sqlite", "locked").into();
        assert!(matches!(error, SyncError::Store(_)));
        assert!(!error.is_defect());
        assert!(
            SyncError::InvariantViolation {
                detail: "x".to_string()
            }
            .is_defect()
        );
    }
}
