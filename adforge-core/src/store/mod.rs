//! Secret storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Trait for secret storage backends
//! - [`MemoryStore`] - In-memory implementation (tests, session-scoped state)
//! - [`FileStore`] - JSON file in the platform data directory
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select a durable backend
//!
//! # Storage Key Convention
//!
//! Keys follow the pattern: `adforge/{item}`, e.g. `adforge/credential`
//! for the current access credential and `adforge/authorization_state`
//! for the pending login nonce.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for secret store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error reading or writing a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Abstraction over key-value storage backends.
///
/// Every operation on a single key is atomic from the caller's perspective.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a secret at the given key.
    ///
    /// Overwrites any existing value.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a secret by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Check if a key exists without retrieving the value.
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Durable storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file in the data directory.
    #[default]
    File,
    /// OS keyring.
    Keyring,
    /// Process memory only; nothing survives a restart.
    Memory,
}

/// Create a durable store for the requested backend.
///
/// A keyring that cannot be opened (or a build without the `keyring-store`
/// feature) falls back to a [`FileStore`] under `data_dir`, so credentials
/// still survive a restart.
pub fn create_store(
    backend: StorageBackend,
    data_dir: &Path,
) -> Result<Arc<dyn SecretStore>, StoreError> {
    match backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory credential storage; a restart will require login");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Keyring => {
            #[cfg(feature = "keyring-store")]
            match KeyringStore::try_new("adforge") {
                Ok(store) => {
                    tracing::info!("Using OS keyring for credential storage");
                    return Ok(Arc::new(store));
                }
                Err(e) => {
                    tracing::warn!("Keyring unavailable ({}), falling back to file storage", e);
                }
            }

            #[cfg(not(feature = "keyring-store"))]
            tracing::warn!(
                "Keyring storage requested but keyring-store feature not enabled, \
                 falling back to file storage"
            );

            file_store(data_dir)
        }
        StorageBackend::File => file_store(data_dir),
    }
}

fn file_store(data_dir: &Path) -> Result<Arc<dyn SecretStore>, StoreError> {
    let path = data_dir.join(FileStore::DEFAULT_FILE_NAME);
    tracing::debug!("Using file credential storage at {:?}", path);
    Ok(Arc::new(FileStore::open(path)?))
}
