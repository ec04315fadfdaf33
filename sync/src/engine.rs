//! # Sync Engine
//!
//! The one handle application code talks to. Constructed once at process
//! start with its capabilities injected; every user action is accepted
//! locally and committed together with the queue work it implies.

use std::sync::Arc;

use charter_core::{
    Clock, ContentId, ContentType, Creator, CredentialProvider, OperationClass, OperationPayload,
    QueueItemId, QueueStatus, RemoteContentService, RemoteId, RemoteSnapshot, SyncLabel,
    SyncOperation, SyncQueueItem, SyncStore, SyncableContent, SystemClock, Visibility
};
use config::EngineConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::attribution::{self, AttributionChain};
use crate::backoff::RetryPolicy;
use crate::context::SyncContext;
use crate::coordinator::{CoordinatorHandle, SyncCoordinator};
use crate::error::{Result, SyncError};
use crate::events::SyncEvent;
use crate::processor::{DrainReport, SyncProcessor};
use crate::queue::{ContentTxn, EnqueueOutcome, EnqueueRequest};
use crate::resolver::{ConflictResolver, ReconcileOutcome, Resolution, apply_remote};
use crate::visibility::{SyncIntent, TransitionOutcome, plan_edit, plan_transition};

/// A content item to be created.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub title: String,
    pub content_type: ContentType,
    pub body: serde_json::Value,
    pub creator: Creator,
    pub visibility: Visibility
}

impl NewContent {
    /// Private content, the usual starting point.
    pub fn private(
        title: impl Into<String>,
        content_type: ContentType,
        body: serde_json::Value,
        creator: Creator
    ) -> Self {
        Self {
            title: title.into(),
            content_type,
            body,
            creator,
            visibility: Visibility::Private
        }
    }
}

/// Field changes for an edit; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ContentEdit {
    pub title: Option<String>,
    pub content_type: Option<ContentType>,
    pub body: Option<serde_json::Value>
}

#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub content: SyncableContent,
    pub enqueued: Option<EnqueueOutcome>
}

/// How community or public content leaves this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeleteIntent {
    /// Remove the remote record too; the local copy goes once that lands.
    UnpublishAndDelete,
    /// Drop the local copy only; the remote record stays discoverable and
    /// forkable.
    DeleteLocalKeepPublished
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DeleteOutcome {
    /// Gone locally, no remote interaction.
    Deleted,
    /// Hidden locally; removed once the queued unpublish succeeds.
    #[serde(rename_all = "camelCase")]
    PendingUnpublish { item_id: QueueItemId },
    /// Hidden locally; removed once the queued release is processed.
    #[serde(rename_all = "camelCase")]
    PendingRelease { item_id: QueueItemId }
}

pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    processor: Arc<SyncProcessor>,
    resolver: ConflictResolver,
    config: EngineConfig
}

impl SyncEngine {
    pub async fn new(
        store: Arc<dyn SyncStore>,
        remote: Arc<dyn RemoteContentService>,
        credentials: Arc<dyn CredentialProvider>,
        config: &EngineConfig
    ) -> Result<Self> {
        Self::with_clock(store, remote, credentials, Arc::new(SystemClock), config).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn with_clock(
        store: Arc<dyn SyncStore>,
        remote: Arc<dyn RemoteContentService>,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig
    ) -> Result<Self> {
        let ctx = Arc::new(SyncContext::new(store, remote, credentials, clock).await?);
        let processor = Arc::new(SyncProcessor::new(
            ctx.clone(),
            RetryPolicy::from_config(&config.retry),
            &config.processor
        ));
        info!("Sync engine ready");

        Ok(Self {
            ctx,
            processor,
            resolver: ConflictResolver::from_config(&config.resolver),
            config: config.clone()
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.ctx.events.subscribe()
    }

    /// Spawns the background coordinator for this engine.
    pub fn start_coordinator(&self) -> CoordinatorHandle {
        SyncCoordinator::new(
            self.ctx.clone(),
            self.processor.clone(),
            &self.config.coordinator
        )
        .spawn()
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    pub async fn create_content(&self, new: NewContent) -> Result<SyncableContent> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();

        let mut content =
            SyncableContent::new(new.title, new.content_type, new.body, new.creator, now);
        content.visibility = new.visibility;
        let mut txn = ContentTxn::create(content.clone());
        let intent = plan_transition(&content, &txn, Visibility::Private, content.visibility);
        self.apply_intent(&mut txn, intent, authenticated)?;

        let created = txn.derived_content()?;
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;
        debug!(content_id = %created.id, "Created content");
        Ok(created)
    }

    #[tracing::instrument(skip(self, edit))]
    pub async fn edit_content(&self, id: ContentId, edit: ContentEdit) -> Result<EditOutcome> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();

        let mut txn = self.load_visible(id).await?;
        let content = txn.require_content_mut()?;
        if let Some(title) = edit.title {
            content.title = title;
        }
        if let Some(content_type) = edit.content_type {
            content.content_type = content_type;
        }
        if let Some(body) = edit.body {
            content.body = body;
        }
        content.updated_at = now;

        let snapshot = content.clone();
        let intent = plan_edit(&snapshot, &txn);
        let enqueued = self.apply_intent(&mut txn, intent, authenticated)?;
        let content = txn.derived_content()?;
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;

        Ok(EditOutcome { content, enqueued })
    }

    /// Accepted locally straight away; remote work is queued.
    #[tracing::instrument(skip(self))]
    pub async fn set_visibility(&self, id: ContentId, to: Visibility) -> Result<TransitionOutcome> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();

        let mut txn = self.load_visible(id).await?;
        let content = txn.require_content_mut()?;
        let from = content.visibility;
        if from == to {
            return Ok(TransitionOutcome {
                from,
                to,
                item_id: None,
                needs_auth: false
            });
        }
        content.visibility = to;
        content.updated_at = now;

        let snapshot = content.clone();
        let intent = plan_transition(&snapshot, &txn, from, to);
        let enqueued = self.apply_intent(&mut txn, intent, authenticated)?;
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;

        info!(content_id = %id, %from, %to, "Visibility changed");
        Ok(TransitionOutcome {
            from,
            to,
            item_id: enqueued.map(|e| e.item_id),
            needs_auth: enqueued.is_some_and(|e| e.needs_auth())
        })
    }

    /// Community and public content needs an explicit intent so a delete
    /// can never complete without queued remote action.
    #[tracing::instrument(skip(self))]
    pub async fn delete_content(
        &self,
        id: ContentId,
        intent: Option<DeleteIntent>
    ) -> Result<DeleteOutcome> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;

        let mut txn = self.load_visible(id).await?;
        let content = txn.require_content()?.clone();

        let intent = if content.visibility.is_sync_eligible() {
            intent.ok_or(SyncError::DeleteIntentRequired {
                id,
                visibility: content.visibility
            })?
        } else if content.remote.is_published()
            || txn
                .find_class(OperationClass::Unpublish, QueueStatus::is_active)
                .is_some()
            || txn.has_in_flight(OperationClass::Publish)
        {
            // Private but still (or about to be) on the remote.
            DeleteIntent::UnpublishAndDelete
        } else {
            txn.delete_content();
            txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;
            info!(content_id = %id, "Deleted local content");
            return Ok(DeleteOutcome::Deleted);
        };

        let remote_id = content.remote.remote_id().cloned();
        let request = match intent {
            DeleteIntent::UnpublishAndDelete => EnqueueRequest::new(
                SyncOperation::Unpublish,
                OperationPayload::Unpublish { remote_id },
                authenticated
            ),
            DeleteIntent::DeleteLocalKeepPublished => EnqueueRequest::new(
                SyncOperation::Release,
                OperationPayload::Release { remote_id },
                authenticated
            )
        };
        let enqueued = self
            .ctx
            .queue
            .enqueue(&mut txn, request, self.ctx.clock.now())?;
        txn.require_content_mut()?.pending_deletion = true;
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;

        info!(content_id = %id, ?intent, "Content hidden pending remote action");
        Ok(match intent {
            DeleteIntent::UnpublishAndDelete => DeleteOutcome::PendingUnpublish {
                item_id: enqueued.item_id
            },
            DeleteIntent::DeleteLocalKeepPublished => DeleteOutcome::PendingRelease {
                item_id: enqueued.item_id
            }
        })
    }

    /// Fork a local item. Completes offline; the fork-count notification is
    /// queued like any other operation.
    #[tracing::instrument(skip(self, forker))]
    pub async fn fork_local(&self, source_id: ContentId, forker: Creator) -> Result<SyncableContent> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;

        let source = self
            .ctx
            .store
            .get_content(&source_id)
            .await?
            .filter(|c| !c.pending_deletion)
            .ok_or(SyncError::ContentNotFound { id: source_id })?;
        let fork = attribution::fork_local(&source, forker, self.ctx.clock.now());
        self.commit_fork(fork, source.remote.remote_id().cloned(), authenticated)
            .await
    }

    /// Fork an item known only from the remote service, e.g. to recover
    /// published content after every local copy was deleted.
    #[tracing::instrument(skip(self, source, forker), fields(remote_id = %source.remote_id))]
    pub async fn fork_remote(
        &self,
        source: &RemoteSnapshot,
        forker: Creator
    ) -> Result<SyncableContent> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;

        let fork = attribution::fork_remote(source, forker, self.ctx.clock.now());
        self.commit_fork(fork, Some(source.remote_id.clone()), authenticated)
            .await
    }

    async fn commit_fork(
        &self,
        fork: SyncableContent,
        source_remote_id: Option<RemoteId>,
        authenticated: bool
    ) -> Result<SyncableContent> {
        let mut txn = ContentTxn::create(fork);
        if let Some(source_remote_id) = source_remote_id {
            self.ctx.queue.enqueue(
                &mut txn,
                EnqueueRequest::new(
                    SyncOperation::ForkNotify,
                    OperationPayload::ForkNotify { source_remote_id },
                    authenticated
                ),
                self.ctx.clock.now()
            )?;
        }
        let fork = txn.derived_content()?;
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;
        info!(
            content_id = %fork.id,
            root = %fork.attribution_root().id,
            "Forked content"
        );
        Ok(fork)
    }

    pub async fn lineage(&self, id: ContentId) -> Result<AttributionChain> {
        AttributionChain::build(self.ctx.store.as_ref(), id).await
    }

    /// Re-arm a failed item. Returns the status it was re-armed with.
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed(&self, item_id: QueueItemId) -> Result<QueueStatus> {
        let authenticated = self.ctx.authenticated().await;
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();

        let item = self
            .ctx
            .store
            .get_item(&item_id)
            .await?
            .ok_or(SyncError::QueueItemNotFound { id: item_id })?;
        if item.status != QueueStatus::Failed {
            return Err(SyncError::NotRetriable {
                id: item_id,
                status: item.status
            });
        }

        let status = if item.operation.requires_remote() && !authenticated {
            QueueStatus::PendingAuth
        } else {
            QueueStatus::Pending
        };
        let mut txn = ContentTxn::load(self.ctx.store.as_ref(), item.content_id).await?;
        let Some(item) = txn.item_mut(item_id) else {
            return Err(SyncError::QueueItemNotFound { id: item_id });
        };
        item.status = status;
        item.attempt_count = 0;
        item.last_error = None;
        item.next_attempt_at = Some(now);
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;

        info!(%item_id, %status, "Failed item re-armed");
        Ok(status)
    }

    /// Startup recovery: calls interrupted mid-flight are repeated, and
    /// every sync status is re-derived from the queue.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize> {
        let _guard = self.ctx.write_lock.lock().await;
        let now = self.ctx.clock.now();
        let store = self.ctx.store.as_ref();

        let mut requeued = 0;
        let mut content_ids: Vec<_> = store.list_content().await?.iter().map(|c| c.id).collect();
        for item in store.list_items().await? {
            if !content_ids.contains(&item.content_id) {
                content_ids.push(item.content_id);
            }
        }

        for content_id in content_ids {
            let mut txn = ContentTxn::load(store, content_id).await?;
            let in_flight: Vec<_> = txn
                .items()
                .iter()
                .filter(|item| item.status == QueueStatus::InFlight)
                .map(|item| item.id)
                .collect();
            for id in in_flight {
                if let Some(item) = txn.item_mut(id) {
                    item.status = QueueStatus::Pending;
                    item.next_attempt_at = Some(now);
                    requeued += 1;
                }
            }
            txn.commit(store, &self.ctx.events).await?;
        }

        if requeued > 0 {
            warn!(requeued, "Requeued operations interrupted in flight");
        }
        Ok(requeued)
    }

    /// Called by the auth layer after sign-in or token refresh. Forgets a
    /// previously rejected token so held items are tried again.
    pub async fn credentials_changed(&self) -> Result<usize> {
        self.ctx.clear_rejected_token();
        self.processor.promote_pending_auth().await
    }

    pub async fn drain(&self) -> Result<DrainReport> {
        self.processor.drain().await
    }

    /// Reconcile a fetched remote snapshot with its local copy.
    #[tracing::instrument(skip(self, remote), fields(remote_id = %remote.remote_id))]
    pub async fn reconcile(&self, remote: &RemoteSnapshot) -> Result<ReconcileOutcome> {
        let _guard = self.ctx.write_lock.lock().await;

        let Some(local) = self.ctx.store.find_by_remote_id(&remote.remote_id).await? else {
            return Ok(ReconcileOutcome::NotTracked);
        };
        let content_id = local.id;
        let mut txn = ContentTxn::load(self.ctx.store.as_ref(), content_id).await?;
        let resolution = self.resolver.resolve(&local, txn.items(), remote);

        let content = txn.require_content_mut()?;
        let outcome = match resolution {
            Resolution::ApplyRemote => {
                apply_remote(content, remote);
                ReconcileOutcome::RemoteApplied { content_id }
            }
            Resolution::KeepLocal => {
                content.fork_count = remote.fork_count;
                ReconcileOutcome::KeptLocal { content_id }
            }
            Resolution::LocalPending => {
                content.fork_count = remote.fork_count;
                ReconcileOutcome::LocalPending { content_id }
            }
        };
        txn.commit(self.ctx.store.as_ref(), &self.ctx.events).await?;

        debug!(%content_id, ?outcome, "Reconciled remote snapshot");
        Ok(outcome)
    }

    /// Fetch one remote record and reconcile it.
    pub async fn pull(&self, remote_id: &RemoteId) -> Result<ReconcileOutcome> {
        let credential = self.ctx.credentials.current_credential().await;
        let remote = self.ctx.remote.fetch(credential.token(), remote_id).await?;
        self.reconcile(&remote).await
    }

    /// Visible content by id; content awaiting deletion is hidden.
    pub async fn content(&self, id: ContentId) -> Result<Option<SyncableContent>> {
        Ok(self
            .ctx
            .store
            .get_content(&id)
            .await?
            .filter(|c| !c.pending_deletion))
    }

    pub async fn list_content(&self) -> Result<Vec<SyncableContent>> {
        let mut content = self.ctx.store.list_content().await?;
        content.retain(|c| !c.pending_deletion);
        Ok(content)
    }

    pub async fn queue_items(&self, content_id: ContentId) -> Result<Vec<SyncQueueItem>> {
        Ok(self.ctx.store.items_for_content(&content_id).await?)
    }

    pub async fn list_items(&self) -> Result<Vec<SyncQueueItem>> {
        Ok(self.ctx.store.list_items().await?)
    }

    /// UI label for a content item, with the failure reason when it failed.
    pub async fn label(&self, id: ContentId) -> Result<Option<SyncLabel>> {
        let Some(content) = self.content(id).await? else {
            return Ok(None);
        };
        let items = self.ctx.store.items_for_content(&id).await?;
        let reason = items
            .iter()
            .filter(|item| item.class() != OperationClass::ForkNotify)
            .find(|item| item.status == QueueStatus::Failed)
            .and_then(|item| item.last_error.as_deref());
        Ok(Some(content.label(reason)))
    }

    pub async fn pending_work(&self) -> Result<usize> {
        self.ctx.pending_work().await
    }

    async fn load_visible(&self, id: ContentId) -> Result<ContentTxn> {
        let txn = ContentTxn::load(self.ctx.store.as_ref(), id).await?;
        match txn.content() {
            Some(content) if !content.pending_deletion => Ok(txn),
            _ => Err(SyncError::ContentNotFound { id })
        }
    }

    fn apply_intent(
        &self,
        txn: &mut ContentTxn,
        intent: SyncIntent,
        authenticated: bool
    ) -> Result<Option<EnqueueOutcome>> {
        let now = self.ctx.clock.now();
        let request = match intent {
            SyncIntent::None => return Ok(None),
            SyncIntent::DiscardPublish => {
                self.ctx.queue.discard_unsent(txn, OperationClass::Publish);
                return Ok(None);
            }
            SyncIntent::Publish { operation, payload } => {
                EnqueueRequest::new(operation, payload, authenticated)
            }
            SyncIntent::Unpublish { payload } => {
                EnqueueRequest::new(SyncOperation::Unpublish, payload, authenticated)
            }
        };
        self.ctx.queue.enqueue(txn, request, now).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStore;
    use testing::{ManualClock, ScriptedRemote, TestCredentials, fixtures};

    async fn engine() -> SyncEngine {
        SyncEngine::with_clock(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedRemote::new()),
            Arc::new(TestCredentials::signed_in("token")),
            Arc::new(ManualClock::starting_now()),
            &EngineConfig::default()
        )
        .await
        .unwrap()
    }

    fn draft(visibility: Visibility) -> NewContent {
        NewContent {
            visibility,
            ..NewContent::private(
                "Anchor watch",
                ContentType::Checklist,
                serde_json::json!({"items": ["set alarm"]}),
                fixtures::user("u1")
            )
        }
    }

    #[tokio::test]
    async fn test_create_public_content_queues_publish_atomically() {
        let engine = engine().await;

        let content = engine.create_content(draft(Visibility::Public)).await.unwrap();

        let items = engine.queue_items(content.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].operation, SyncOperation::Publish);
        assert_eq!(
            engine.label(content.id).await.unwrap(),
            Some(SyncLabel::Queued)
        );
    }

    #[tokio::test]
    async fn test_same_visibility_is_a_no_op() {
        let engine = engine().await;
        let content = engine.create_content(draft(Visibility::Private)).await.unwrap();

        let outcome = engine
            .set_visibility(content.id, Visibility::Private)
            .await
            .unwrap();

        assert_eq!(outcome.item_id, None);
        assert!(engine.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_delete_requires_intent() {
        let engine = engine().await;
        let content = engine.create_content(draft(Visibility::Community)).await.unwrap();

        let result = engine.delete_content(content.id, None).await;

        assert!(matches!(result, Err(SyncError::DeleteIntentRequired { .. })));
        assert!(engine.content(content.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_deletion_hides_content() {
        let engine = engine().await;
        let content = engine.create_content(draft(Visibility::Public)).await.unwrap();

        engine
            .delete_content(content.id, Some(DeleteIntent::UnpublishAndDelete))
            .await
            .unwrap();

        assert!(engine.content(content.id).await.unwrap().is_none());
        assert!(engine.list_content().await.unwrap().is_empty());
        assert!(matches!(
            engine.edit_content(content.id, ContentEdit::default()).await,
            Err(SyncError::ContentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_rejects_non_failed_items() {
        let engine = engine().await;
        let content = engine.create_content(draft(Visibility::Public)).await.unwrap();
        let item = engine.queue_items(content.id).await.unwrap().remove(0);

        let result = engine.retry_failed(item.id).await;

        assert!(matches!(
            result,
            Err(SyncError::NotRetriable {
                status: QueueStatus::Pending,
                ..
            })
        ));
        assert!(matches!(
            engine.retry_failed(QueueItemId::new()).await,
            Err(SyncError::QueueItemNotFound { .. })
        ));
    }
}
