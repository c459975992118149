//! Credential storage in the OS keyring (Keychain, Secret Service,
//! Credential Manager).

use async_trait::async_trait;
use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// Account name every adforge keyring entry is filed under.
const KEYRING_USER: &str = "adforge";

/// One keyring entry per storage key, with service `{service}/{key}`.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Open the keyring, failing with [`StoreError::KeyringUnavailable`] when
    /// the host has no usable backend.
    pub fn try_new(service: &str) -> Result<Self, StoreError> {
        Entry::new(&format!("{}/availability", service), KEYRING_USER).map_err(|e| {
            StoreError::KeyringUnavailable {
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            service: service.to_owned(),
        })
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&format!("{}/{}", self.service, key), KEYRING_USER).map_err(|e| backend(key, e))
    }
}

fn backend(key: &str, error: keyring::Error) -> StoreError {
    StoreError::BackendError {
        message: format!("keyring entry {}: {}", key, error),
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service", &self.service)
            .finish()
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(Secret::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(backend(key, e)),
        }
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|e| backend(key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(backend(key, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CI containers usually have no keyring daemon; both outcomes are valid.

    #[test]
    fn test_open_reports_unavailable_backend() {
        match KeyringStore::try_new("adforge-test") {
            Ok(store) => assert_eq!(store.service, "adforge-test"),
            Err(StoreError::KeyringUnavailable { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_credential_round_trip_when_available() {
        let Ok(store) = KeyringStore::try_new("adforge-test") else {
            return;
        };

        let key = format!(
            "credential-{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        if store.set(&key, &Secret::new("{\"token\":\"t\"}")).await.is_err() {
            return;
        }

        // Headless hosts may accept the write without persisting it.
        if let Ok(Some(stored)) = store.get(&key).await {
            assert_eq!(stored.expose(), "{\"token\":\"t\"}");
        }
        let _ = store.delete(&key).await;
        if let Ok(found) = store.get(&key).await {
            assert!(found.is_none());
        }
    }
}
