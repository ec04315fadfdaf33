//! # Sync Queue
//!
//! Durable, ordered queue of remote operations keyed by content id.
//!
//! All queue mutations for one content go through a [`ContentTxn`]: the
//! content record and its queue items are loaded, changed in memory and
//! committed as a single [`WriteBatch`], with the content's `sync_status`
//! re-derived from the surviving items on the way out.
//!
//! At most one active item exists per `(content, operation class)`. A new
//! request for a class that already has an unsent item replaces that item's
//! payload; one that arrives while the class is in flight is parked on the
//! in-flight item as its follow-up.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use charter_core::{
    ContentId, ContentSnapshot, OperationClass, OperationPayload, QueueItemId, QueueStatus,
    SyncOperation, SyncQueueItem, SyncStatus, SyncStore, SyncableContent, Visibility, WriteBatch
};
use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};

/// How an enqueue request was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Created,
    /// Replaced the payload of an unsent item of the same class.
    Superseded,
    /// Parked on the in-flight item of the same class.
    FollowUp,
    /// An identical-class item is already in flight; nothing to add.
    AlreadyInFlight
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub item_id: QueueItemId,
    pub status: QueueStatus,
    pub disposition: Disposition
}

impl EnqueueOutcome {
    pub fn needs_auth(&self) -> bool {
        self.status == QueueStatus::PendingAuth
    }
}

/// Sync status implied by a content record and its queue items.
///
/// Fork notifications concern the source content, not this one, so they
/// never colour the indicator.
pub fn derive_status(content: &SyncableContent, items: &[SyncQueueItem]) -> SyncStatus {
    let own = || {
        items
            .iter()
            .filter(|item| item.class() != OperationClass::ForkNotify)
    };

    if own().any(|item| item.status == QueueStatus::Failed) {
        SyncStatus::Failed
    } else if own().any(|item| item.status == QueueStatus::PendingAuth) {
        SyncStatus::PendingAuth
    } else if own().any(|item| item.status == QueueStatus::InFlight) {
        SyncStatus::Syncing
    } else if own().any(|item| item.status == QueueStatus::Pending) {
        SyncStatus::Pending
    } else if content.remote.is_published() && content.visibility != Visibility::Private {
        SyncStatus::Synced
    } else {
        SyncStatus::LocalOnly
    }
}

/// Working set for one content id, committed atomically.
#[derive(Debug)]
pub struct ContentTxn {
    content_id: ContentId,
    content: Option<SyncableContent>,
    loaded_status: Option<SyncStatus>,
    content_dirty: bool,
    content_deleted: bool,
    items: Vec<SyncQueueItem>,
    dirty_items: HashSet<QueueItemId>,
    removed_items: Vec<QueueItemId>,
    events: Vec<SyncEvent>
}

impl ContentTxn {
    pub async fn load(store: &dyn SyncStore, content_id: ContentId) -> Result<Self> {
        let content = store.get_content(&content_id).await?;
        let items = store.items_for_content(&content_id).await?;
        Ok(Self {
            content_id,
            loaded_status: content.as_ref().map(|c| c.sync_status),
            content,
            content_dirty: false,
            content_deleted: false,
            items,
            dirty_items: HashSet::new(),
            removed_items: Vec::new(),
            events: Vec::new()
        })
    }

    /// Working set for a record that does not exist in the store yet.
    pub fn create(content: SyncableContent) -> Self {
        Self {
            content_id: content.id,
            content: Some(content),
            loaded_status: None,
            content_dirty: true,
            content_deleted: false,
            items: Vec::new(),
            dirty_items: HashSet::new(),
            removed_items: Vec::new(),
            events: Vec::new()
        }
    }

    pub fn content_id(&self) -> ContentId {
        self.content_id
    }

    pub fn content(&self) -> Option<&SyncableContent> {
        self.content.as_ref()
    }

    /// Content as it will be committed, with its status re-derived.
    pub fn derived_content(&self) -> Result<SyncableContent> {
        let mut content = self.require_content()?.clone();
        content.sync_status = derive_status(&content, &self.items);
        Ok(content)
    }

    pub fn require_content(&self) -> Result<&SyncableContent> {
        self.content.as_ref().ok_or(SyncError::ContentNotFound {
            id: self.content_id
        })
    }

    pub fn content_mut(&mut self) -> Option<&mut SyncableContent> {
        self.content_dirty = true;
        self.content.as_mut()
    }

    pub fn require_content_mut(&mut self) -> Result<&mut SyncableContent> {
        let id = self.content_id;
        self.content_mut().ok_or(SyncError::ContentNotFound { id })
    }

    /// Removes the content record and every queue item for it.
    pub fn delete_content(&mut self) {
        self.content = None;
        self.content_deleted = true;
        let ids: Vec<_> = self.items.iter().map(|item| item.id).collect();
        for id in ids {
            self.remove_item(id);
        }
    }

    /// Removes only the content record; surviving items stay queryable.
    pub fn delete_content_keep_items(&mut self) {
        self.content = None;
        self.content_deleted = true;
    }

    pub fn items(&self) -> &[SyncQueueItem] {
        &self.items
    }

    pub fn item(&self, id: QueueItemId) -> Option<&SyncQueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_mut(&mut self, id: QueueItemId) -> Option<&mut SyncQueueItem> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        self.dirty_items.insert(id);
        Some(item)
    }

    pub fn push_item(&mut self, item: SyncQueueItem) {
        self.dirty_items.insert(item.id);
        self.items.push(item);
    }

    pub fn remove_item(&mut self, id: QueueItemId) -> Option<SyncQueueItem> {
        let position = self.items.iter().position(|item| item.id == id)?;
        self.dirty_items.remove(&id);
        self.removed_items.push(id);
        Some(self.items.remove(position))
    }

    pub fn emit(&mut self, event: SyncEvent) {
        self.events.push(event);
    }

    /// Oldest item of `class` whose status satisfies `pred`.
    pub fn find_class(
        &self,
        class: OperationClass,
        pred: impl Fn(QueueStatus) -> bool
    ) -> Option<&SyncQueueItem> {
        self.items
            .iter()
            .find(|item| item.class() == class && pred(item.status))
    }

    pub fn has_in_flight(&self, class: OperationClass) -> bool {
        self.find_class(class, |status| status == QueueStatus::InFlight)
            .is_some()
    }

    fn finish(mut self) -> (WriteBatch, Vec<SyncEvent>) {
        let mut batch = WriteBatch::new();

        if let Some(mut content) = self.content.take() {
            let status = derive_status(&content, &self.items);
            if Some(status) != self.loaded_status {
                content.sync_status = status;
                self.content_dirty = true;
                self.events.push(SyncEvent::StatusChanged {
                    content_id: content.id,
                    status
                });
            }
            if self.content_dirty {
                batch.put_content(content);
            }
        } else if self.content_deleted {
            batch.delete_content(self.content_id);
        }

        for item in self.items {
            if self.dirty_items.contains(&item.id) {
                batch.put_item(item);
            }
        }
        for id in self.removed_items {
            batch.delete_item(id);
        }

        (batch, self.events)
    }

    /// Commits the working set as one batch, then publishes its events.
    pub async fn commit(self, store: &dyn SyncStore, events: &EventBus) -> Result<()> {
        let (batch, pending_events) = self.finish();
        if !batch.is_empty() {
            store.commit(batch).await?;
        }
        events.publish_all(pending_events);
        Ok(())
    }
}

/// A request to add an operation to the queue.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub operation: SyncOperation,
    pub payload: OperationPayload,
    pub authenticated: bool
}

impl EnqueueRequest {
    pub fn new(operation: SyncOperation, payload: OperationPayload, authenticated: bool) -> Self {
        Self {
            operation,
            payload,
            authenticated
        }
    }

    fn initial_status(&self) -> QueueStatus {
        if self.operation.requires_remote() && !self.authenticated {
            QueueStatus::PendingAuth
        } else {
            QueueStatus::Pending
        }
    }
}

/// Sequence allocator and enqueue rules.
#[derive(Debug)]
pub struct SyncQueue {
    last_sequence: AtomicU64
}

impl SyncQueue {
    /// Resumes sequence allocation after the highest sequence in `store`.
    pub async fn open(store: &dyn SyncStore) -> Result<Self> {
        Ok(Self {
            last_sequence: AtomicU64::new(store.max_sequence().await?)
        })
    }

    fn next_sequence(&self) -> u64 {
        self.last_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Add `request` to the content's queue, honouring supersession and the
    /// one-active-item-per-class rule.
    pub fn enqueue(
        &self,
        txn: &mut ContentTxn,
        request: EnqueueRequest,
        now: DateTime<Utc>
    ) -> Result<EnqueueOutcome> {
        let class = request.operation.class();
        self.check_invariants(txn, &request)?;

        match class {
            OperationClass::Publish => {
                self.discard_unsent(txn, OperationClass::Unpublish);
            }
            OperationClass::Unpublish => {
                self.discard_unsent(txn, OperationClass::Publish);
                clear_follow_up(txn);
            }
            OperationClass::ForkNotify => {}
        }

        let status = request.initial_status();

        if let Some(existing) = txn.find_class(class, QueueStatus::is_unsent).map(|i| i.id) {
            let Some(item) = txn.item_mut(existing) else {
                return Err(missing_item(existing));
            };
            item.operation = request.operation;
            item.payload = request.payload;
            item.status = status;
            item.attempt_count = 0;
            item.last_error = None;
            item.next_attempt_at = Some(now);
            item.follow_up = None;
            let operation = item.operation;

            debug!(item_id = %existing, %operation, "Superseded unsent queue item");
            metrics::counter!("sync.queue.superseded").increment(1);
            txn.emit(SyncEvent::Superseded {
                content_id: txn.content_id(),
                item_id: existing,
                operation
            });
            return Ok(EnqueueOutcome {
                item_id: existing,
                status,
                disposition: Disposition::Superseded
            });
        }

        if let Some(in_flight) = txn
            .find_class(class, |s| s == QueueStatus::InFlight)
            .map(|i| i.id)
        {
            let follow_up = match (&request.payload, class) {
                (OperationPayload::Snapshot(snapshot), OperationClass::Publish) => {
                    Some(snapshot.clone())
                }
                _ => None
            };
            let Some(follow_up) = follow_up else {
                return Ok(EnqueueOutcome {
                    item_id: in_flight,
                    status: QueueStatus::InFlight,
                    disposition: Disposition::AlreadyInFlight
                });
            };
            let Some(item) = txn.item_mut(in_flight) else {
                return Err(missing_item(in_flight));
            };
            item.follow_up = Some(follow_up);
            let operation = item.operation;

            debug!(item_id = %in_flight, "Parked follow-up on in-flight item");
            metrics::counter!("sync.queue.superseded").increment(1);
            txn.emit(SyncEvent::Superseded {
                content_id: txn.content_id(),
                item_id: in_flight,
                operation
            });
            return Ok(EnqueueOutcome {
                item_id: in_flight,
                status: QueueStatus::InFlight,
                disposition: Disposition::FollowUp
            });
        }

        let item = SyncQueueItem::new(
            txn.content_id(),
            request.operation,
            request.payload,
            status,
            self.next_sequence(),
            now
        );
        let outcome = EnqueueOutcome {
            item_id: item.id,
            status,
            disposition: Disposition::Created
        };

        debug!(
            item_id = %item.id,
            operation = %item.operation,
            sequence = item.sequence,
            %status,
            "Enqueued sync operation"
        );
        metrics::counter!("sync.queue.enqueued", "operation" => item.operation.to_string())
            .increment(1);
        txn.emit(SyncEvent::Enqueued {
            content_id: item.content_id,
            item_id: item.id,
            operation: item.operation,
            status
        });
        txn.push_item(item);
        Ok(outcome)
    }

    /// Drops every unsent item of `class`; in-flight items are left alone.
    pub fn discard_unsent(&self, txn: &mut ContentTxn, class: OperationClass) -> usize {
        let doomed: Vec<_> = txn
            .items()
            .iter()
            .filter(|item| item.class() == class && item.status.is_unsent())
            .map(|item| (item.id, item.operation))
            .collect();

        for (item_id, operation) in &doomed {
            txn.remove_item(*item_id);
            debug!(%item_id, %operation, "Discarded unsent queue item");
            txn.emit(SyncEvent::Discarded {
                content_id: txn.content_id(),
                item_id: *item_id,
                operation: *operation
            });
        }
        doomed.len()
    }

    fn check_invariants(&self, txn: &ContentTxn, request: &EnqueueRequest) -> Result<()> {
        if request.operation != SyncOperation::PublishUpdate {
            return Ok(());
        }
        let has_remote = txn
            .content()
            .is_some_and(|content| content.remote.is_published());
        if has_remote || txn.has_in_flight(OperationClass::Publish) {
            return Ok(());
        }

        let detail = format!(
            "publishUpdate enqueued for content {} without a remote id",
            txn.content_id()
        );
        error!(defect = true, content_id = %txn.content_id(), "{detail}");
        Err(SyncError::InvariantViolation { detail })
    }
}

fn clear_follow_up(txn: &mut ContentTxn) {
    let parked: Vec<_> = txn
        .items()
        .iter()
        .filter(|item| item.follow_up.is_some())
        .map(|item| item.id)
        .collect();
    for id in parked {
        if let Some(item) = txn.item_mut(id) {
            item.follow_up = None;
        }
    }
}

fn missing_item(id: QueueItemId) -> SyncError {
    SyncError::InvariantViolation {
        detail: format!("queue item {id} vanished from its working set")
    }
}

/// Payload for the publish class.
pub fn snapshot_payload(content: &SyncableContent) -> OperationPayload {
    OperationPayload::Snapshot(content.snapshot())
}

/// Newest snapshot an item carries: its follow-up if one is parked.
pub fn latest_snapshot(item: &SyncQueueItem) -> Option<&ContentSnapshot> {
    item.follow_up.as_ref().or_else(|| item.payload.snapshot())
}
