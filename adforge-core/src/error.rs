//! Top-level error types for adforge.

use thiserror::Error;

use crate::authorize::AuthError;
use crate::classify::ErrorClassification;
use crate::refresher::RefreshError;
use crate::store::StoreError;

/// Top-level error type encompassing all adforge errors.
#[derive(Debug, Error)]
pub enum AdforgeError {
    /// Error from credential storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from the login flow.
    #[error("login error: {0}")]
    Auth(#[from] AuthError),

    /// Error from a token refresh.
    #[error("refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// A classified platform failure.
    #[error("{0}")]
    Platform(#[from] ErrorClassification),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AdforgeError {
    /// Whether the user has to log in again to recover.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Platform(classification) => classification.requires_reauth(),
            Self::Refresh(RefreshError::NoCredential) => true,
            Self::Auth(AuthError::InvalidState | AuthError::NoPendingUpgrade) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_login() {
        assert!(AdforgeError::from(ErrorClassification::expired_auth()).requires_login());
        assert!(!AdforgeError::from(ErrorClassification::rate_limited()).requires_login());
        assert!(AdforgeError::from(RefreshError::NoCredential).requires_login());
        assert!(!AdforgeError::Config {
            message: "missing app_id".to_string()
        }
        .requires_login());
    }
}
