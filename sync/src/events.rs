use charter_core::{ContentId, QueueItemId, QueueStatus, RemoteId, SyncOperation, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// Notification published on every queue and status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    #[serde(rename_all = "camelCase")]
    Enqueued {
        content_id: ContentId,
        item_id: QueueItemId,
        operation: SyncOperation,
        status: QueueStatus
    },
    /// A newer payload replaced an unsent item, or was parked on an
    /// in-flight one.
    #[serde(rename_all = "camelCase")]
    Superseded {
        content_id: ContentId,
        item_id: QueueItemId,
        operation: SyncOperation
    },
    #[serde(rename_all = "camelCase")]
    Discarded {
        content_id: ContentId,
        item_id: QueueItemId,
        operation: SyncOperation
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        content_id: ContentId,
        status: SyncStatus
    },
    #[serde(rename_all = "camelCase")]
    RetryScheduled {
        content_id: ContentId,
        item_id: QueueItemId,
        attempt: u32,
        next_attempt_at: DateTime<Utc>
    },
    #[serde(rename_all = "camelCase")]
    Succeeded {
        content_id: ContentId,
        item_id: QueueItemId,
        operation: SyncOperation
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        content_id: ContentId,
        item_id: QueueItemId,
        operation: SyncOperation,
        reason: String
    },
    #[serde(rename_all = "camelCase")]
    NeedsAuth {
        content_id: ContentId,
        item_id: QueueItemId
    },
    /// Local copy is gone while its remote record could not be removed.
    #[serde(rename_all = "camelCase")]
    OrphanedRemote {
        content_id: ContentId,
        remote_id: Option<RemoteId>,
        reason: String
    },
    #[serde(rename_all = "camelCase")]
    ForkNotifyDropped {
        content_id: ContentId,
        source_remote_id: RemoteId,
        reason: String
    }
}

impl SyncEvent {
    pub fn content_id(&self) -> ContentId {
        match self {
            Self::Enqueued { content_id, .. }
            | Self::Superseded { content_id, .. }
            | Self::Discarded { content_id, .. }
            | Self::StatusChanged { content_id, .. }
            | Self::RetryScheduled { content_id, .. }
            | Self::Succeeded { content_id, .. }
            | Self::Failed { content_id, .. }
            | Self::NeedsAuth { content_id, .. }
            | Self::OrphanedRemote { content_id, .. }
            | Self::ForkNotifyDropped { content_id, .. } => *content_id
        }
    }

    /// New work the coordinator should pick up promptly. A content turning
    /// `Pending` covers manual retries and pending-auth promotion.
    pub fn is_new_work(&self) -> bool {
        matches!(
            self,
            Self::Enqueued { .. }
                | Self::Superseded { .. }
                | Self::StatusChanged {
                    status: SyncStatus::Pending,
                    ..
                }
        )
    }
}

/// Fan-out channel for [`SyncEvent`]s. Publishing never blocks; slow
/// subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = SyncEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
