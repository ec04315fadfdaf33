use async_trait::async_trait;
use charter_core::{BearerToken, Credential, CredentialProvider};
use parking_lot::RwLock;

/// Credential source a test can sign in and out of.
#[derive(Debug, Default)]
pub struct TestCredentials {
    token: RwLock<Option<BearerToken>>
}

impl TestCredentials {
    pub fn signed_in(token: &str) -> Self {
        Self {
            token: RwLock::new(Some(BearerToken::new(token)))
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, token: &str) {
        *self.token.write() = Some(BearerToken::new(token));
    }

    pub fn sign_out(&self) {
        *self.token.write() = None;
    }
}

#[async_trait]
impl CredentialProvider for TestCredentials {
    async fn current_credential(&self) -> Credential {
        match self.token.read().clone() {
            Some(token) => Credential::Authenticated(token),
            None => Credential::Unauthenticated
        }
    }
}
