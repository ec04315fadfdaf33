//! # Visibility State Machine
//!
//! `private → community → public` lifecycle. Transitions come only from
//! user action and are accepted locally straight away; this module decides
//! which queue operation, if any, expresses the new intent.

use charter_core::{
    OperationClass, OperationPayload, QueueItemId, SyncOperation, SyncableContent, Visibility
};
use serde::{Deserialize, Serialize};

use crate::queue::{ContentTxn, snapshot_payload};

/// Queue work implied by a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncIntent {
    /// Nothing to send.
    None,
    Publish {
        operation: SyncOperation,
        payload: OperationPayload
    },
    Unpublish {
        payload: OperationPayload
    },
    /// Going private before anything reached the remote: drop unsent
    /// publish work and stop.
    DiscardPublish
}

/// Result of a visibility change as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub from: Visibility,
    pub to: Visibility,
    pub item_id: Option<QueueItemId>,
    /// Accepted locally but held until a credential is available.
    pub needs_auth: bool
}

/// Publish-class operation for the content's current remote state.
///
/// An update needs a remote id that will still exist when the item runs; if
/// an unpublish is in flight, the remote record is about to go away.
pub fn publish_operation(content: &SyncableContent, txn: &ContentTxn) -> SyncOperation {
    if content.remote.is_published() && !txn.has_in_flight(OperationClass::Unpublish) {
        SyncOperation::PublishUpdate
    } else {
        SyncOperation::Publish
    }
}

/// Intent for moving `content` (already updated to `to`) out of `from`.
pub fn plan_transition(
    content: &SyncableContent,
    txn: &ContentTxn,
    from: Visibility,
    to: Visibility
) -> SyncIntent {
    if from == to {
        return SyncIntent::None;
    }

    if to.is_sync_eligible() {
        return SyncIntent::Publish {
            operation: publish_operation(content, txn),
            payload: snapshot_payload(content)
        };
    }

    if content.remote.is_published() || txn.has_in_flight(OperationClass::Publish) {
        SyncIntent::Unpublish {
            payload: OperationPayload::Unpublish {
                remote_id: content.remote.remote_id().cloned()
            }
        }
    } else {
        SyncIntent::DiscardPublish
    }
}

/// Intent for an edit that leaves visibility unchanged.
pub fn plan_edit(content: &SyncableContent, txn: &ContentTxn) -> SyncIntent {
    if content.visibility.is_sync_eligible() {
        SyncIntent::Publish {
            operation: publish_operation(content, txn),
            payload: snapshot_payload(content)
        }
    } else {
        SyncIntent::None
    }
}
