//! # Sync Processor
//!
//! Drains due queue items against the remote content service.
//!
//! One call per content id at a time, FIFO by sequence within a content id,
//! up to `max_concurrency` content ids in parallel. Each item goes through
//! three steps: mark in flight (committed), call the remote outside the
//! write lock, then apply the classified outcome (committed). A crash between
//! the first and last step leaves the item `InFlight`; `recover` demotes it
//! and the call is repeated.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use charter_core::{
    BearerToken, OperationPayload, QueueItemId, QueueStatus, RemoteId, RemoteState,
    SyncOperation, SyncQueueItem, SyncableContent
};
use config::ProcessorConfig;
use errors::{FailureClass, RemoteError};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::backoff::{RetryDecision, RetryPolicy};
use crate::context::SyncContext;
use crate::error::Result;
use crate::events::SyncEvent;
use crate::queue::ContentTxn;

/// Totals for one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub promoted: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
    pub pending_auth: usize,
    pub dropped: usize
}

impl DrainReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped => return,
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Retried => self.retried += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::PendingAuth => self.pending_auth += 1,
            ItemOutcome::Dropped => self.dropped += 1
        }
        self.dispatched += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    /// Item changed between selection and dispatch.
    Skipped,
    Succeeded,
    Retried,
    Failed,
    PendingAuth,
    Dropped
}

/// Successful remote effect of one item.
#[derive(Debug, Clone, PartialEq)]
enum Applied {
    Published(RemoteId),
    Unpublished,
    Released,
    ForkNotified
}

pub struct SyncProcessor {
    ctx: Arc<SyncContext>,
    policy: RetryPolicy,
    max_concurrency: usize,
    remote_timeout: Duration,
    max_items_per_drain: usize
}

impl SyncProcessor {
    pub fn new(ctx: Arc<SyncContext>, policy: RetryPolicy, config: &ProcessorConfig) -> Self {
        Self {
            ctx,
            policy,
            max_concurrency: config.max_concurrency.max(1),
            remote_timeout: Duration::from_secs(config.remote_timeout_secs),
            max_items_per_drain: config.max_items_per_drain.max(1)
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process due items until nothing is due or the per-drain budget is
    /// spent.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport> {
        let mut report = DrainReport {
            promoted: self.promote_pending_auth().await?,
            ..DrainReport::default()
        };

        while report.dispatched < self.max_items_per_drain {
            let budget = self.max_items_per_drain - report.dispatched;
            let heads = self.due_heads(budget).await?;
            if heads.is_empty() {
                break;
            }

            let outcomes: Vec<Result<ItemOutcome>> = stream::iter(heads)
                .map(|item_id| self.process(item_id))
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

            let before = report.dispatched;
            for outcome in outcomes {
                report.record(outcome?);
            }
            if report.dispatched == before {
                break;
            }
        }

        if report.dispatched > 0 || report.promoted > 0 {
            info!(
                dispatched = report.dispatched,
                succeeded = report.succeeded,
                retried = report.retried,
                failed = report.failed,
                pending_auth = report.pending_auth,
                "Drained sync queue"
            );
        }
        Ok(report)
    }

    /// Move held items back to `Pending` once a usable credential is
    /// available. A token the remote already rejected does not count.
    #[tracing::instrument(skip(self))]
    pub async fn promote_pending_auth(&self) -> Result<usize> {
        if !self.ctx.authenticated().await {
            return Ok(0);
        }

        let _guard = self.ctx.write_lock.lock().await;
        let held: Vec<_> = self
            .ctx
            .store
            .list_items()
            .await?
            .into_iter()
            .filter(|item| item.status == QueueStatus::PendingAuth)
            .collect();
        let content_ids: HashSet<_> = held.iter().map(|item| item.content_id).collect();
        let now = self.ctx.clock.now();

        for content_id in content_ids {
            let mut txn = ContentTxn::load(self.ctx.store.as_ref(), content_id).await?;
            let ids: Vec<_> = txn
                .items()
                .iter()
                .filter(|item| item.status == QueueStatus::PendingAuth)
                .map(|item| item.id)
                .collect();
            for id in ids {
                if let Some(item) = txn.item_mut(id) {
                    item.status = QueueStatus::Pending;
                    item.next_attempt_at = Some(now);
                }
            }
            txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;
        }

        if !held.is_empty() {
            info!(count = held.len(), "Promoted items held for authentication");
        }
        Ok(held.len())
    }

    /// Due FIFO heads, one per content id, oldest first.
    async fn due_heads(&self, budget: usize) -> Result<Vec<QueueItemId>> {
        let items = self.ctx.store.list_items().await?;
        let now = self.ctx.clock.now();

        let mut seen = HashSet::new();
        let mut busy = HashSet::new();
        let mut heads = Vec::new();
        for item in &items {
            if item.status == QueueStatus::InFlight {
                busy.insert(item.content_id);
            }
        }
        for item in items {
            if !item.status.is_active() || !seen.insert(item.content_id) {
                continue;
            }
            if !busy.contains(&item.content_id) && item.is_due(now) {
                heads.push(item.id);
            }
        }
        heads.truncate(budget);
        Ok(heads)
    }

    async fn process(&self, item_id: QueueItemId) -> Result<ItemOutcome> {
        let Some((item, content)) = self.begin(item_id).await? else {
            return Ok(ItemOutcome::Skipped);
        };

        let started = Instant::now();
        let result = match item.operation {
            SyncOperation::Release => Ok(Applied::Released),
            _ => match self.ctx.usable_token().await {
                Some(token) => {
                    let result = self.call_with_timeout(&item, content.as_ref(), &token).await;
                    if let Err(e) = &result
                        && e.class() == FailureClass::Auth
                    {
                        self.ctx.reject_token(&token);
                    }
                    result
                }
                None => Err(RemoteError::Unauthorized {
                    reason: "no usable credential".to_string()
                })
            }
        };
        metrics::histogram!(
            "sync.operation.duration_ms",
            "operation" => item.operation.to_string()
        )
        .record(started.elapsed().as_secs_f64() * 1000.0);

        self.finish(item, result).await
    }

    /// Re-check the item under the lock and mark it in flight.
    async fn begin(
        &self,
        item_id: QueueItemId
    ) -> Result<Option<(SyncQueueItem, Option<SyncableContent>)>> {
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();

        let Some(item) = self.ctx.store.get_item(&item_id).await? else {
            return Ok(None);
        };
        if !item.is_due(now) {
            return Ok(None);
        }

        let mut txn = ContentTxn::load(self.ctx.store.as_ref(), item.content_id).await?;
        let Some(marked) = txn.item_mut(item_id) else {
            return Ok(None);
        };
        marked.status = QueueStatus::InFlight;
        let marked = marked.clone();
        let content = txn.content().cloned();
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;

        debug!(%item_id, operation = %marked.operation, "Dispatching sync operation");
        Ok(Some((marked, content)))
    }

    async fn call_with_timeout(
        &self,
        item: &SyncQueueItem,
        content: Option<&SyncableContent>,
        token: &BearerToken
    ) -> std::result::Result<Applied, RemoteError> {
        let timeout_ms = self.remote_timeout.as_millis() as u64;
        tokio::time::timeout(self.remote_timeout, self.call(item, content, token))
            .await
            .unwrap_or(Err(RemoteError::Timeout { timeout_ms }))
    }

    async fn call(
        &self,
        item: &SyncQueueItem,
        content: Option<&SyncableContent>,
        token: &BearerToken
    ) -> std::result::Result<Applied, RemoteError> {
        let remote = self.ctx.remote.as_ref();
        let known_id = content.and_then(|c| c.remote.remote_id());

        match (&item.operation, &item.payload) {
            (SyncOperation::Publish | SyncOperation::PublishUpdate, OperationPayload::Snapshot(s)) => {
                match known_id {
                    Some(remote_id) => {
                        remote.update(token, remote_id, s).await?;
                        Ok(Applied::Published(remote_id.clone()))
                    }
                    None => {
                        if item.operation == SyncOperation::PublishUpdate {
                            error!(
                                defect = true,
                                item_id = %item.id,
                                content_id = %item.content_id,
                                "publishUpdate dispatched without a remote id, creating instead"
                            );
                        }
                        let remote_id = remote.create(token, s).await?;
                        Ok(Applied::Published(remote_id))
                    }
                }
            }
            (SyncOperation::Unpublish, OperationPayload::Unpublish { remote_id }) => {
                let Some(remote_id) = known_id.or(remote_id.as_ref()) else {
                    return Ok(Applied::Unpublished);
                };
                match remote.delete(token, remote_id).await {
                    Err(e) if e.is_not_found() => Ok(Applied::Unpublished),
                    other => other.map(|()| Applied::Unpublished)
                }
            }
            (SyncOperation::ForkNotify, OperationPayload::ForkNotify { source_remote_id }) => {
                remote.increment_fork_count(token, source_remote_id).await?;
                Ok(Applied::ForkNotified)
            }
            (SyncOperation::Release, _) => Ok(Applied::Released),
            (operation, _) => {
                error!(
                    defect = true,
                    item_id = %item.id,
                    %operation,
                    "Queue item payload does not match its operation"
                );
                Err(RemoteError::Validation {
                    reason: format!("malformed {operation} payload")
                })
            }
        }
    }

    async fn finish(
        &self,
        dispatched: SyncQueueItem,
        result: std::result::Result<Applied, RemoteError>
    ) -> Result<ItemOutcome> {
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();
        let mut txn = ContentTxn::load(self.ctx.store.as_ref(), dispatched.content_id).await?;
        if txn.item(dispatched.id).is_none() {
            debug!(item_id = %dispatched.id, "Queue item vanished while in flight");
            return Ok(ItemOutcome::Skipped);
        }

        let outcome = match result {
            Ok(applied) => self.on_success(&mut txn, &dispatched, applied, now),
            Err(e) => self.on_failure(&mut txn, &dispatched, e, now)
        };
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;
        Ok(outcome)
    }

    fn on_success(
        &self,
        txn: &mut ContentTxn,
        dispatched: &SyncQueueItem,
        applied: Applied,
        now: chrono::DateTime<chrono::Utc>
    ) -> ItemOutcome {
        let item_id = dispatched.id;
        let operation = dispatched.operation;

        match applied {
            Applied::Published(remote_id) => {
                match txn.content_mut() {
                    Some(content) => content.remote = RemoteState::published(remote_id.clone()),
                    None => warn!(%item_id, %remote_id, "Published content no longer exists locally")
                }
                let follow_up = txn.item(item_id).and_then(|item| item.follow_up.clone());
                match (follow_up, txn.item_mut(item_id)) {
                    (Some(snapshot), Some(item)) => {
                        item.operation = SyncOperation::PublishUpdate;
                        item.payload = OperationPayload::Snapshot(snapshot);
                        item.status = QueueStatus::Pending;
                        item.attempt_count = 0;
                        item.last_error = None;
                        item.next_attempt_at = Some(now);
                        item.follow_up = None;
                        debug!(%item_id, "Re-armed item with its follow-up payload");
                    }
                    _ => {
                        txn.remove_item(item_id);
                    }
                }
                info!(%item_id, %remote_id, %operation, "Published content");
            }
            Applied::Unpublished => {
                let deleting = txn.content().is_some_and(|c| c.pending_deletion);
                if let Some(content) = txn.content_mut() {
                    content.remote = RemoteState::Unpublished;
                }
                if deleting {
                    txn.delete_content();
                } else {
                    txn.remove_item(item_id);
                }
                info!(%item_id, deleted = deleting, "Unpublished content");
            }
            Applied::Released => {
                txn.delete_content();
                info!(%item_id, "Released local copy, remote record kept");
            }
            Applied::ForkNotified => {
                txn.remove_item(item_id);
                debug!(%item_id, "Fork count notified");
            }
        }

        metrics::counter!("sync.operation.succeeded", "operation" => operation.to_string())
            .increment(1);
        txn.emit(SyncEvent::Succeeded {
            content_id: dispatched.content_id,
            item_id,
            operation
        });
        ItemOutcome::Succeeded
    }

    fn on_failure(
        &self,
        txn: &mut ContentTxn,
        dispatched: &SyncQueueItem,
        error: RemoteError,
        now: chrono::DateTime<chrono::Utc>
    ) -> ItemOutcome {
        let item_id = dispatched.id;
        let content_id = dispatched.content_id;
        let reason = error.to_string();
        fold_follow_up(txn, item_id);

        match error.class() {
            FailureClass::Auth => {
                if let Some(item) = txn.item_mut(item_id) {
                    item.status = QueueStatus::PendingAuth;
                    item.next_attempt_at = None;
                }
                info!(%item_id, %reason, "Holding sync operation until authenticated");
                metrics::counter!("sync.operation.pending_auth").increment(1);
                txn.emit(SyncEvent::NeedsAuth {
                    content_id,
                    item_id
                });
                ItemOutcome::PendingAuth
            }
            FailureClass::Transient => {
                let attempt = dispatched.attempt_count + 1;
                let floor = error
                    .retry_after()
                    .and_then(|wait| chrono::Duration::from_std(wait).ok())
                    .map(|wait| now + wait);
                match self
                    .policy
                    .on_transient_failure(dispatched.operation, attempt, now)
                    .not_before(floor)
                {
                    RetryDecision::RetryAt(next_attempt_at) => {
                        if let Some(item) = txn.item_mut(item_id) {
                            item.status = QueueStatus::Pending;
                            item.attempt_count = attempt;
                            item.next_attempt_at = Some(next_attempt_at);
                            item.last_error = Some(reason.clone());
                        }
                        warn!(%item_id, attempt, %next_attempt_at, %reason, "Scheduling retry");
                        metrics::counter!("sync.operation.retried").increment(1);
                        txn.emit(SyncEvent::RetryScheduled {
                            content_id,
                            item_id,
                            attempt,
                            next_attempt_at
                        });
                        ItemOutcome::Retried
                    }
                    RetryDecision::GiveUp => self.terminal(txn, dispatched, attempt, reason)
                }
            }
            FailureClass::Permanent => {
                self.terminal(txn, dispatched, dispatched.attempt_count + 1, reason)
            }
        }
    }

    fn terminal(
        &self,
        txn: &mut ContentTxn,
        dispatched: &SyncQueueItem,
        attempt: u32,
        reason: String
    ) -> ItemOutcome {
        let item_id = dispatched.id;
        let content_id = dispatched.content_id;
        let operation = dispatched.operation;
        metrics::counter!("sync.operation.failed", "operation" => operation.to_string())
            .increment(1);

        if let OperationPayload::ForkNotify { source_remote_id } = &dispatched.payload {
            txn.remove_item(item_id);
            warn!(%item_id, %source_remote_id, %reason, "Dropping fork-count notification");
            txn.emit(SyncEvent::ForkNotifyDropped {
                content_id,
                source_remote_id: source_remote_id.clone(),
                reason
            });
            return ItemOutcome::Dropped;
        }

        let orphaning = operation == SyncOperation::Unpublish
            && txn.content().is_some_and(|c| c.pending_deletion);
        let known_id = txn.content().and_then(|c| c.remote.remote_id().cloned());

        if let Some(item) = txn.item_mut(item_id) {
            item.status = QueueStatus::Failed;
            item.attempt_count = attempt;
            item.last_error = Some(reason.clone());
            item.next_attempt_at = None;
            if let OperationPayload::Unpublish { remote_id } = &mut item.payload
                && remote_id.is_none()
            {
                *remote_id = known_id.clone();
            }
        }

        if orphaning {
            txn.delete_content_keep_items();
            warn!(
                %content_id,
                remote_id = ?known_id,
                %reason,
                "Local copy deleted, remote record orphaned"
            );
            metrics::counter!("sync.remote.orphaned").increment(1);
            txn.emit(SyncEvent::OrphanedRemote {
                content_id,
                remote_id: known_id,
                reason: reason.clone()
            });
        } else {
            warn!(%item_id, %operation, attempt, %reason, "Sync operation failed");
        }

        txn.emit(SyncEvent::Failed {
            content_id,
            item_id,
            operation,
            reason
        });
        ItemOutcome::Failed
    }
}

/// A parked follow-up becomes the item's payload when the call did not land.
fn fold_follow_up(txn: &mut ContentTxn, item_id: QueueItemId) {
    let Some(item) = txn.item_mut(item_id) else {
        return;
    };
    if let Some(snapshot) = item.follow_up.take() {
        item.payload = OperationPayload::Snapshot(snapshot);
    }
}
