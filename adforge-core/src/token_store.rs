//! Durable storage of the current access credential.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::credential::AccessCredential;
use crate::store::{Secret, SecretStore, StoreError};

/// Storage key holding the serialized credential.
pub const CREDENTIAL_KEY: &str = "adforge/credential";

/// Reads and writes the current [`AccessCredential`].
///
/// The credential is kept as one JSON document under [`CREDENTIAL_KEY`], so
/// every write is a single store operation and readers never see a token
/// paired with another token's expiry. Staleness is left to callers:
/// [`get_token`](Self::get_token) returns expired credentials as-is.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SecretStore>,
}

impl TokenStore {
    /// Wrap a durable backend.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Persist `credential`, replacing whatever was stored.
    pub async fn set_token(&self, credential: &AccessCredential) -> Result<(), StoreError> {
        let document = serde_json::to_string(credential)?;
        self.store.set(CREDENTIAL_KEY, &Secret::new(document)).await
    }

    /// The stored credential, or `None` if nothing is stored.
    pub async fn get_token(&self) -> Result<Option<AccessCredential>, StoreError> {
        match self.store.get(CREDENTIAL_KEY).await? {
            Some(document) => Ok(Some(serde_json::from_str(document.expose())?)),
            None => Ok(None),
        }
    }

    /// Expiry of the stored credential, if any.
    pub async fn get_expiry(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.get_token().await?.and_then(|c| c.expires_at))
    }

    /// Remove the stored credential.
    pub async fn clear_token(&self) -> Result<(), StoreError> {
        self.store.delete(CREDENTIAL_KEY).await
    }

    /// A long-lived credential is stored and has not passed its expiry.
    pub async fn is_token_valid(&self) -> Result<bool, StoreError> {
        Ok(self
            .get_token()
            .await?
            .is_some_and(|c| c.is_long_lived() && !c.is_expired()))
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
