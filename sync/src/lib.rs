//! # Content Sync Engine
//!
//! Offline-first synchronization of user content with a remote content
//! service.
//!
//! Every user action (create, edit, visibility change, delete, fork) is
//! accepted locally and committed together with the remote work it implies.
//! The processor drains that work in the background, one call per content id
//! at a time, classifying failures as transient, permanent or
//! authentication-related.

pub mod attribution;
pub mod backoff;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod processor;
pub mod queue;
pub mod resolver;
pub mod visibility;

pub use attribution::{AttributionChain, AttributionNode};
pub use backoff::{RetryDecision, RetryPolicy};
pub use coordinator::{AppLifecycle, Connectivity, CoordinatorHandle, CoordinatorState};
pub use engine::{ContentEdit, DeleteIntent, DeleteOutcome, EditOutcome, NewContent, SyncEngine};
pub use error::{Result, SyncError};
pub use events::{EventBus, SyncEvent};
pub use processor::{DrainReport, SyncProcessor};
pub use queue::{Disposition, EnqueueOutcome};
pub use resolver::{ConflictResolver, ReconcileOutcome, ReconcileStrategy};
pub use visibility::TransitionOutcome;

#[cfg(test)]
mod proptests;
