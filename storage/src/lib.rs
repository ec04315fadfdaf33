//! # Storage Layer
//!
//! `SyncStore` implementations for content records and the sync queue.
//!
//! - `MemoryStore`: in-process tables behind a single lock
//! - `SqliteStore`: SQLite database, one transaction per write batch

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
