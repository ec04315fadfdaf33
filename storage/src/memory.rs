use std::collections::HashMap;

use async_trait::async_trait;
use charter_core::{
    ContentId, QueueItemId, RemoteId, SyncQueueItem, SyncStore, SyncableContent, WriteBatch,
    WriteOp
};
use errors::StoreError;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Tables {
    content: HashMap<ContentId, SyncableContent>,
    items: HashMap<QueueItemId, SyncQueueItem>,
    high_water: u64
}

/// In-process store. A batch is applied under one write lock, so readers
/// observe either none or all of it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_count(&self) -> usize {
        self.tables.read().content.len()
    }

    pub fn item_count(&self) -> usize {
        self.tables.read().items.len()
    }
}

fn in_sequence_order(mut items: Vec<SyncQueueItem>) -> Vec<SyncQueueItem> {
    items.sort_by_key(|item| item.sequence);
    items
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get_content(&self, id: &ContentId) -> Result<Option<SyncableContent>, StoreError> {
        Ok(self.tables.read().content.get(id).cloned())
    }

    async fn find_by_remote_id(
        &self,
        remote_id: &RemoteId
    ) -> Result<Option<SyncableContent>, StoreError> {
        Ok(self
            .tables
            .read()
            .content
            .values()
            .find(|content| content.remote.remote_id() == Some(remote_id))
            .cloned())
    }

    async fn list_content(&self) -> Result<Vec<SyncableContent>, StoreError> {
        let mut content: Vec<_> = self.tables.read().content.values().cloned().collect();
        content.sort_by_key(|c| c.created_at);
        Ok(content)
    }

    async fn get_item(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, StoreError> {
        Ok(self.tables.read().items.get(id).cloned())
    }

    async fn items_for_content(
        &self,
        content_id: &ContentId
    ) -> Result<Vec<SyncQueueItem>, StoreError> {
        let items = self
            .tables
            .read()
            .items
            .values()
            .filter(|item| item.content_id == *content_id)
            .cloned()
            .collect();
        Ok(in_sequence_order(items))
    }

    async fn list_items(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        let items = self.tables.read().items.values().cloned().collect();
        Ok(in_sequence_order(items))
    }

    async fn max_sequence(&self) -> Result<u64, StoreError> {
        Ok(self.tables.read().high_water)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for op in batch.into_ops() {
            match op {
                WriteOp::PutContent(content) => {
                    tables.content.insert(content.id, *content);
                }
                WriteOp::DeleteContent(id) => {
                    tables.content.remove(&id);
                }
                WriteOp::PutQueueItem(item) => {
                    tables.high_water = tables.high_water.max(item.sequence);
                    tables.items.insert(item.id, *item);
                }
                WriteOp::DeleteQueueItem(id) => {
                    tables.items.remove(&id);
                }
            }
        }
        Ok(())
    }
}
