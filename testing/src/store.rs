use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use charter_core::{
    ContentId, QueueItemId, RemoteId, SyncQueueItem, SyncStore, SyncableContent, WriteBatch
};
use errors::StoreError;
use storage::MemoryStore;

/// `MemoryStore` whose next commits can be made to fail without applying
/// anything, as a crashed transaction would.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_commits: AtomicUsize
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl SyncStore for FlakyStore {
    async fn get_content(&self, id: &ContentId) -> Result<Option<SyncableContent>, StoreError> {
        self.inner.get_content(id).await
    }

    async fn find_by_remote_id(
        &self,
        remote_id: &RemoteId
    ) -> Result<Option<SyncableContent>, StoreError> {
        self.inner.find_by_remote_id(remote_id).await
    }

    async fn list_content(&self) -> Result<Vec<SyncableContent>, StoreError> {
        self.inner.list_content().await
    }

    async fn get_item(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, StoreError> {
        self.inner.get_item(id).await
    }

    async fn items_for_content(
        &self,
        content_id: &ContentId
    ) -> Result<Vec<SyncQueueItem>, StoreError> {
        self.inner.items_for_content(content_id).await
    }

    async fn list_items(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        self.inner.list_items().await
    }

    async fn max_sequence(&self) -> Result<u64, StoreError> {
        self.inner.max_sequence().await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let failed = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::transaction("flaky", "injected commit failure"));
        }
        self.inner.commit(batch).await
    }
}
