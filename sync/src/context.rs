use std::sync::Arc;

use charter_core::{
    BearerToken, Clock, CredentialProvider, QueueStatus, RemoteContentService, SyncStore
};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::events::EventBus;
use crate::queue::SyncQueue;

/// Capabilities and shared state behind one engine instance.
///
/// Every queue mutation happens under `write_lock`; remote calls never do.
pub struct SyncContext {
    pub store: Arc<dyn SyncStore>,
    pub remote: Arc<dyn RemoteContentService>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub queue: SyncQueue,
    pub write_lock: Mutex<()>,
    /// Token the remote last answered with 401; never reused until it
    /// changes or the auth layer reports new credentials.
    rejected_token: parking_lot::Mutex<Option<BearerToken>>
}

impl SyncContext {
    pub async fn new(
        store: Arc<dyn SyncStore>,
        remote: Arc<dyn RemoteContentService>,
        credentials: Arc<dyn CredentialProvider>,
        clock: Arc<dyn Clock>
    ) -> Result<Self> {
        let queue = SyncQueue::open(store.as_ref()).await?;
        Ok(Self {
            store,
            remote,
            credentials,
            clock,
            events: EventBus::new(),
            queue,
            write_lock: Mutex::new(()),
            rejected_token: parking_lot::Mutex::new(None)
        })
    }

    /// Current token unless the remote already rejected it.
    pub async fn usable_token(&self) -> Option<BearerToken> {
        let token = self.credentials.current_credential().await.token().cloned()?;
        let rejected = self.rejected_token.lock();
        (rejected.as_ref() != Some(&token)).then_some(token)
    }

    pub async fn authenticated(&self) -> bool {
        self.usable_token().await.is_some()
    }

    pub fn reject_token(&self, token: &BearerToken) {
        let mut rejected = self.rejected_token.lock();
        if rejected.as_ref() != Some(token) {
            info!("Remote rejected the current credential, holding until it changes");
            *rejected = Some(token.clone());
        }
    }

    pub fn clear_rejected_token(&self) {
        self.rejected_token.lock().take();
    }

    /// Items still to care about: pending, held for auth, or in flight.
    pub async fn pending_work(&self) -> Result<usize> {
        let items = self.store.list_items().await?;
        Ok(items.iter().filter(|item| item.status.is_active()).count())
    }

    /// Work a drain could make progress on now. Held items count only
    /// once a usable credential exists.
    pub async fn dispatchable_work(&self) -> Result<usize> {
        let authenticated = self.authenticated().await;
        let items = self.store.list_items().await?;
        Ok(items
            .iter()
            .filter(|item| match item.status {
                QueueStatus::Pending | QueueStatus::InFlight => true,
                QueueStatus::PendingAuth => authenticated,
                QueueStatus::Succeeded | QueueStatus::Failed => false
            })
            .count())
    }
}
