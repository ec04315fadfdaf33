use std::sync::Arc;

use async_trait::async_trait;
use charter_core::{BearerToken, Credential, CredentialProvider};
use tokio::sync::RwLock;
use tracing::info;

/// Bearer token holder shared between the auth layer, which refreshes it,
/// and the sync engine, which only reads it.
#[derive(Debug, Clone, Default)]
pub struct SharedCredentials {
    token: Arc<RwLock<Option<BearerToken>>>
}

impl SharedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: BearerToken) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token)))
        }
    }

    /// Reads a token from `var`; unset or empty means signed out.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Self::with_token(BearerToken::new(token.trim())),
            _ => Self::new()
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn set_token(&self, token: BearerToken) {
        *self.token.write().await = Some(token);
        info!("Credential updated");
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
        info!("Credential cleared");
    }
}

#[async_trait]
impl CredentialProvider for SharedCredentials {
    async fn current_credential(&self) -> Credential {
        match self.token.read().await.clone() {
            Some(token) => Credential::Authenticated(token),
            None => Credential::Unauthenticated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_the_token() {
        let credentials = SharedCredentials::new();
        let engine_view = credentials.clone();
        assert_eq!(
            engine_view.current_credential().await,
            Credential::Unauthenticated
        );

        credentials.set_token(BearerToken::new("t-1")).await;
        assert!(engine_view.is_signed_in().await);
        assert_eq!(
            engine_view
                .current_credential()
                .await
                .token()
                .map(BearerToken::expose),
            Some("t-1")
        );

        credentials.clear().await;
        assert_eq!(
            engine_view.current_credential().await,
            Credential::Unauthenticated
        );
    }
}
