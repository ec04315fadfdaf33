//! # Charter Content Core
//!
//! Shared types and capability traits for the offline-first content sync
//! engine.
//!
//! This crate provides:
//! - The synchronized unit (`SyncableContent`) and its lifecycle enums
//! - Queue item shapes (`SyncQueueItem`, `SyncOperation`, `QueueStatus`)
//! - The capabilities the engine consumes: durable store, remote content
//!   service, credential observer and clock

pub mod traits;
pub mod types;

pub use traits::{
    Clock, CredentialProvider, RemoteContentService, SyncStore, SystemClock, WriteBatch, WriteOp
};
pub use types::{
    BearerToken, ContentId, ContentSnapshot, ContentType, Creator, Credential, ForkSource,
    OperationClass, OperationPayload, QueueItemId, QueueStatus, RemoteId, RemoteSnapshot,
    RemoteState, SyncLabel, SyncOperation, SyncQueueItem, SyncStatus, SyncableContent, UserId,
    Visibility
};
