//! SQLite-backed store.
//!
//! Records are kept as JSON documents alongside the columns the engine
//! filters and orders by. Every [`WriteBatch`] runs inside one SQL
//! transaction.

use std::path::Path;

use async_trait::async_trait;
use charter_core::{
    ContentId, QueueItemId, RemoteId, SyncQueueItem, SyncStore, SyncableContent, WriteBatch,
    WriteOp
};
use errors::StoreError;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

const BACKEND: &str = "sqlite";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS content (
        id TEXT PRIMARY KEY,
        remote_id TEXT,
        created_at TEXT NOT NULL,
        data TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_content_remote_id ON content(remote_id)",
    "CREATE TABLE IF NOT EXISTS sync_queue (
        id TEXT PRIMARY KEY,
        content_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        status TEXT NOT NULL,
        data TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_queue_content ON sync_queue(content_id, sequence)",
    "CREATE INDEX IF NOT EXISTS idx_queue_status ON sync_queue(status)",
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )"
];

pub struct SqliteStore {
    pool: SqlitePool
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn connect(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| connection_error(&e))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await
            .map_err(|e| connection_error(&e))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        info!(path = %path.display(), "Opened sync store");
        Ok(store)
    }

    /// Private in-memory database; lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| connection_error(&e))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::query(BACKEND, e))?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connection_error(e: &dyn std::fmt::Display) -> StoreError {
    StoreError::Connection {
        backend: BACKEND.to_string(),
        reason: e.to_string()
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T, StoreError> {
    let data: String = row
        .try_get("data")
        .map_err(|e| StoreError::query(BACKEND, e))?;
    serde_json::from_str(&data).map_err(|e| StoreError::serialization("json", e))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::serialization("json", e))
}

fn sequence_column(sequence: u64) -> Result<i64, StoreError> {
    i64::try_from(sequence).map_err(|e| StoreError::serialization("sequence", e))
}

async fn apply(conn: &mut SqliteConnection, op: WriteOp) -> Result<(), StoreError> {
    let result = match op {
        WriteOp::PutContent(content) => {
            sqlx::query(
                "INSERT INTO content (id, remote_id, created_at, data) VALUES (?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET remote_id = excluded.remote_id, data = excluded.data"
            )
            .bind(content.id.to_string())
            .bind(content.remote.remote_id().map(RemoteId::as_str))
            .bind(content.created_at.to_rfc3339())
            .bind(encode(&content)?)
            .execute(&mut *conn)
            .await
        }
        WriteOp::DeleteContent(id) => {
            sqlx::query("DELETE FROM content WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *conn)
                .await
        }
        WriteOp::PutQueueItem(item) => {
            let sequence = sequence_column(item.sequence)?;
            sqlx::query(
                "INSERT INTO sync_queue (id, content_id, sequence, status, data) VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data"
            )
            .bind(item.id.to_string())
            .bind(item.content_id.to_string())
            .bind(sequence)
            .bind(item.status.to_string())
            .bind(encode(&item)?)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;

            sqlx::query(
                "INSERT INTO sync_metadata (key, value) VALUES ('sequence', ?)
                 ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)"
            )
            .bind(sequence)
            .execute(&mut *conn)
            .await
        }
        WriteOp::DeleteQueueItem(id) => {
            sqlx::query("DELETE FROM sync_queue WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *conn)
                .await
        }
    };
    result.map_err(|e| StoreError::query(BACKEND, e))?;
    Ok(())
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn get_content(&self, id: &ContentId) -> Result<Option<SyncableContent>, StoreError> {
        let row = sqlx::query("SELECT data FROM content WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_remote_id(
        &self,
        remote_id: &RemoteId
    ) -> Result<Option<SyncableContent>, StoreError> {
        let row = sqlx::query("SELECT data FROM content WHERE remote_id = ? LIMIT 1")
            .bind(remote_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn list_content(&self) -> Result<Vec<SyncableContent>, StoreError> {
        let rows = sqlx::query("SELECT data FROM content ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;
        rows.iter().map(decode).collect()
    }

    async fn get_item(&self, id: &QueueItemId) -> Result<Option<SyncQueueItem>, StoreError> {
        let row = sqlx::query("SELECT data FROM sync_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;
        row.as_ref().map(decode).transpose()
    }

    async fn items_for_content(
        &self,
        content_id: &ContentId
    ) -> Result<Vec<SyncQueueItem>, StoreError> {
        let rows = sqlx::query("SELECT data FROM sync_queue WHERE content_id = ? ORDER BY sequence")
            .bind(content_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;
        rows.iter().map(decode).collect()
    }

    async fn list_items(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        let rows = sqlx::query("SELECT data FROM sync_queue ORDER BY sequence")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::query(BACKEND, e))?;
        rows.iter().map(decode).collect()
    }

    async fn max_sequence(&self) -> Result<u64, StoreError> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM sync_metadata WHERE key = 'sequence'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::query(BACKEND, e))?;
        Ok(value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let size = batch.len();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::transaction(BACKEND, e))?;
        for op in batch.into_ops() {
            // Dropping `tx` on error rolls the batch back.
            apply(&mut tx, op).await?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::transaction(BACKEND, e))?;

        debug!(ops = size, "Committed write batch");
        Ok(())
    }
}
