//! Access credentials issued by the ad platform.
//!
//! This module provides:
//! - [`TokenGrant`] - The provider's raw token response
//! - [`AccessCredential`] - A stored bearer credential with derived expiry
//! - [`TokenLifetime`] - Whether the credential has been upgraded

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Secret;

/// Token response returned by the provider's token endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    /// The bearer value.
    pub access_token: Secret,

    /// Token type, usually "bearer".
    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds, counted from receipt.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    /// Create a grant with the given lifetime.
    pub fn new(access_token: impl Into<String>, expires_in: Option<i64>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: Some("bearer".to_string()),
            expires_in,
        }
    }
}

/// Whether a credential came from the code exchange or the long-lived upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenLifetime {
    /// Issued by the code exchange; only good for retrying the upgrade.
    ShortLived,
    /// Issued by the upgrade or a refresh; usable for API calls.
    LongLived,
}

/// The current bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCredential {
    /// Opaque bearer value.
    pub token: Secret,

    /// Token type (usually "bearer").
    pub token_type: String,

    /// When the provider issued this credential, as observed on receipt.
    pub issued_at: DateTime<Utc>,

    /// When this credential expires (None if the provider sent no lifetime).
    pub expires_at: Option<DateTime<Utc>>,

    /// Short-lived or long-lived.
    pub lifetime: TokenLifetime,
}

impl AccessCredential {
    /// Build a credential from a grant received at `received_at`.
    ///
    /// `expires_at` is fixed here and never recomputed later.
    pub fn from_grant(grant: TokenGrant, lifetime: TokenLifetime, received_at: DateTime<Utc>) -> Self {
        let expires_at = grant
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| received_at + Duration::seconds(secs));

        Self {
            token: grant.access_token,
            token_type: grant.token_type.unwrap_or_else(|| "bearer".to_string()),
            issued_at: received_at,
            expires_at,
            lifetime,
        }
    }

    /// Override the expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if this credential has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Utc::now())
    }

    /// Check if this credential will expire within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.expires_at.is_some_and(|exp| exp < Utc::now() + duration)
    }

    /// Whether this credential may be used for API calls.
    pub fn is_long_lived(&self) -> bool {
        self.lifetime == TokenLifetime::LongLived
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_grant_derives_expiry_at_receipt() {
        let received = Utc::now();
        let grant = TokenGrant::new("t1", Some(5_184_000));
        let credential = AccessCredential::from_grant(grant, TokenLifetime::LongLived, received);

        assert_eq!(credential.issued_at, received);
        assert_eq!(credential.expires_at, Some(received + Duration::seconds(5_184_000)));
        assert_eq!(credential.token.expose(), "t1");
        assert_eq!(credential.token_type, "bearer");
    }

    #[test]
    fn test_from_grant_without_lifetime_never_expires() {
        let grant = TokenGrant::new("t1", None);
        let credential = AccessCredential::from_grant(grant, TokenLifetime::LongLived, Utc::now());

        assert!(credential.expires_at.is_none());
        assert!(!credential.is_expired());
        assert!(!credential.expires_within(Duration::days(365)));
    }

    #[test]
    fn test_is_expired() {
        let grant = TokenGrant::new("t", Some(60));
        let credential = AccessCredential::from_grant(grant, TokenLifetime::LongLived, Utc::now());
        assert!(!credential.is_expired());

        let expired = credential.with_expiry(Utc::now() - Duration::seconds(1));
        assert!(expired.is_expired());
    }

    #[test]
    fn test_expires_within() {
        let grant = TokenGrant::new("t", Some(5 * 60));
        let credential = AccessCredential::from_grant(grant, TokenLifetime::ShortLived, Utc::now());

        assert!(credential.expires_within(Duration::minutes(10)));
        assert!(!credential.expires_within(Duration::minutes(2)));
        assert!(!credential.is_long_lived());
    }

    #[test]
    fn test_grant_deserializes_provider_payload() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"bearer","expires_in":5183944}"#,
        )
        .unwrap();
        assert_eq!(grant.access_token.expose(), "abc");
        assert_eq!(grant.expires_in, Some(5_183_944));

        let bare: TokenGrant = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert!(bare.expires_in.is_none());
        assert!(bare.token_type.is_none());
    }
}
