//! # Adapters
//!
//! Concrete capabilities for the sync engine: the HTTP remote content
//! service and a refreshable bearer credential.

pub mod credentials;
pub mod http_remote;

pub use credentials::SharedCredentials;
pub use http_remote::{HttpRemoteContentService, classify_status};
