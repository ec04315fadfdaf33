//! Capability traits consumed by the sync engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::{RemoteError, StoreError};

use crate::types::{
    BearerToken, ContentId, ContentSnapshot, Credential, QueueItemId, RemoteId, RemoteSnapshot,
    SyncQueueItem, SyncableContent
};

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    PutContent(Box<SyncableContent>),
    DeleteContent(ContentId),
    PutQueueItem(Box<SyncQueueItem>),
    DeleteQueueItem(QueueItemId)
}

/// Ordered set of mutations committed as one unit: either every operation is
/// applied or none is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_content(&mut self, content: SyncableContent) -> &mut Self {
        self.ops.push(WriteOp::PutContent(Box::new(content)));
        self
    }

    pub fn delete_content(&mut self, id: ContentId) -> &mut Self {
        self.ops.push(WriteOp::DeleteContent(id));
        self
    }

    pub fn put_item(&mut self, item: SyncQueueItem) -> &mut Self {
        self.ops.push(WriteOp::PutQueueItem(Box::new(item)));
        self
    }

    pub fn delete_item(&mut self, id: QueueItemId) -> &mut Self {
        self.ops.push(WriteOp::DeleteQueueItem(id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Durable, key-indexed store for content records and queue items sharing one
/// transaction scope.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn get_content(&self, id: &ContentId) -> Result<Option<SyncableContent>, StoreError>;

    async fn find_by_remote_id(
        &self,
        remote_id: &RemoteId
    ) -> Result<Option<SyncableContent>, StoreError>;

    async fn list_content(&self) -> Result<Vec<SyncableContent>, StoreError>;

    async fn get_item(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, StoreError>;

    /// Queue items for one content id, in enqueue order.
    async fn items_for_content(
        &self,
        content_id: &ContentId
    ) -> Result<Vec<SyncQueueItem>, StoreError>;

    /// Every queue item, in enqueue order.
    async fn list_items(&self) -> Result<Vec<SyncQueueItem>, StoreError>;

    /// Highest sequence ever assigned, `0` for an empty queue.
    async fn max_sequence(&self) -> Result<u64, StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Remote content service. Every call must tolerate being repeated with the
/// same arguments after a crash.
#[async_trait]
pub trait RemoteContentService: Send + Sync {
    async fn create(
        &self,
        token: &BearerToken,
        snapshot: &ContentSnapshot
    ) -> Result<RemoteId, RemoteError>;

    async fn update(
        &self,
        token: &BearerToken,
        remote_id: &RemoteId,
        snapshot: &ContentSnapshot
    ) -> Result<(), RemoteError>;

    async fn delete(&self, token: &BearerToken, remote_id: &RemoteId) -> Result<(), RemoteError>;

    async fn increment_fork_count(
        &self,
        token: &BearerToken,
        remote_id: &RemoteId
    ) -> Result<(), RemoteError>;

    async fn fetch(
        &self,
        token: Option<&BearerToken>,
        remote_id: &RemoteId
    ) -> Result<RemoteSnapshot, RemoteError>;
}

/// Observes authentication state; never authenticates by itself.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn current_credential(&self) -> Credential;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
