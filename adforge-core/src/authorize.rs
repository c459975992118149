//! Authorization code login with CSRF-protected state.
//!
//! The flow has three steps:
//!
//! 1. [`AuthorizationFlow::build_login_url`] generates a fresh
//!    [`AuthorizationState`], keeps it in session-scoped storage and returns
//!    the platform's login dialog URL carrying the nonce as `state`.
//! 2. The user approves the app in the browser and the platform redirects
//!    back with `code` and `state`.
//! 3. [`AuthorizationFlow::handle_callback`] consumes the stored state,
//!    verifies it, exchanges the code for a short-lived token, upgrades that
//!    to a long-lived token and arms the refresh scheduler.
//!
//! If the upgrade fails the short-lived credential stays stored and
//! [`AuthorizationFlow::retry_upgrade`] can finish the login later.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::AdPlatformApi;
use crate::classify::RawProviderError;
use crate::credential::{AccessCredential, TokenLifetime};
use crate::provider::PlatformConfig;
use crate::refresher::TokenRefresher;
use crate::store::{Secret, SecretStore, StoreError};
use crate::token_store::TokenStore;

/// Session storage key holding the pending [`AuthorizationState`].
pub const AUTHORIZATION_STATE_KEY: &str = "adforge/authorization_state";

/// How long a login attempt stays valid.
pub const AUTHORIZATION_STATE_TTL_SECS: i64 = 10 * 60;

/// Length of the generated nonce.
pub const NONCE_LENGTH: usize = 32;

/// Error type for the login flow.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The returned state did not match a pending login attempt.
    #[error("authorization state mismatch; start the login again")]
    InvalidState,

    /// The platform redirected back with an error instead of a code.
    #[error("login was not approved: {error}")]
    Denied {
        error: String,
        description: Option<String>,
    },

    /// The authorization code could not be exchanged.
    #[error("authorization code exchange failed: {0}")]
    Exchange(#[source] RawProviderError),

    /// The short-lived token could not be upgraded.
    #[error("long-lived token upgrade failed: {0}")]
    Upgrade(#[source] RawProviderError),

    /// No short-lived credential is waiting for an upgrade.
    #[error("no short-lived credential is waiting for an upgrade")]
    NoPendingUpgrade,

    /// The platform configuration cannot produce a login URL.
    #[error("invalid platform configuration: {message}")]
    Config { message: String },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// A pending login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    /// Random value sent as the `state` parameter.
    pub nonce: String,
    /// When the attempt started.
    pub created_at: DateTime<Utc>,
}

impl AuthorizationState {
    /// Start a new attempt with a fresh nonce.
    pub fn generate() -> Self {
        Self {
            nonce: generate_nonce(NONCE_LENGTH),
            created_at: Utc::now(),
        }
    }

    /// Whether the attempt is too old to complete.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(AUTHORIZATION_STATE_TTL_SECS)
    }
}

/// Alphanumeric nonce drawn from the operating system's CSPRNG.
fn generate_nonce(length: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rngs::OsRng;
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Drives the login for one session.
pub struct AuthorizationFlow {
    client: BasicClient,
    scopes: Vec<String>,
    api: Arc<dyn AdPlatformApi>,
    session: Arc<dyn SecretStore>,
    tokens: TokenStore,
    refresher: Arc<TokenRefresher>,
}

impl AuthorizationFlow {
    /// Create a flow for `config`.
    ///
    /// `session` holds the pending state for the lifetime of the process;
    /// credentials are written through `refresher` into `tokens`.
    pub fn new(
        config: &PlatformConfig,
        api: Arc<dyn AdPlatformApi>,
        session: Arc<dyn SecretStore>,
        tokens: TokenStore,
        refresher: Arc<TokenRefresher>,
    ) -> Result<Self, AuthError> {
        let auth_url = AuthUrl::new(config.dialog_endpoint()).map_err(|e| AuthError::Config {
            message: format!("invalid dialog URL: {}", e),
        })?;
        let redirect_url =
            RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| AuthError::Config {
                message: format!("invalid redirect URI: {}", e),
            })?;

        let client = BasicClient::new(ClientId::new(config.app_id.clone()), None, auth_url, None)
            .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            scopes: config.scopes.clone(),
            api,
            session,
            tokens,
            refresher,
        })
    }

    /// Start a login attempt and return the URL the user must visit.
    ///
    /// Any previous pending attempt is replaced.
    pub async fn build_login_url(&self) -> Result<String, AuthError> {
        let state = AuthorizationState::generate();
        let document = serde_json::to_string(&state).map_err(StoreError::from)?;
        self.session
            .set(AUTHORIZATION_STATE_KEY, &Secret::new(document))
            .await?;

        let nonce = state.nonce.clone();
        let mut request = self.client.authorize_url(move || CsrfToken::new(nonce));
        // The platform expects one comma-separated scope parameter.
        if !self.scopes.is_empty() {
            request = request.add_scope(Scope::new(self.scopes.join(",")));
        }
        let (url, _) = request.url();

        tracing::info!("Started login attempt");
        Ok(url.to_string())
    }

    /// Complete the login from the redirect's `code` and `state`.
    ///
    /// On a state mismatch nothing is exchanged and the stored credential is
    /// left as it was. The pending state is consumed either way.
    pub async fn handle_callback(
        &self,
        code: &str,
        returned_state: &str,
    ) -> Result<AccessCredential, AuthError> {
        let pending = self.take_state().await?;

        let verified = match pending {
            Some(state) if state.is_stale(Utc::now()) => {
                tracing::warn!("Login attempt started at {} has expired", state.created_at);
                false
            }
            Some(state) => state.nonce == returned_state,
            None => false,
        };

        if !verified {
            tracing::warn!("Rejected login callback with unrecognized state");
            return Err(AuthError::InvalidState);
        }

        let grant = self.api.exchange_code_for_token(code).await.map_err(|e| {
            tracing::warn!("Authorization code exchange failed: {}", e);
            AuthError::Exchange(e)
        })?;

        let short_lived = AccessCredential::from_grant(grant, TokenLifetime::ShortLived, Utc::now());
        self.refresher.install(&short_lived).await?;
        tracing::debug!("Stored short-lived credential, upgrading");

        self.upgrade(&short_lived).await
    }

    /// Finish the login from the callback's `error` parameters.
    ///
    /// The pending attempt is discarded.
    pub async fn handle_provider_error(
        &self,
        error: &str,
        description: Option<&str>,
    ) -> Result<(), AuthError> {
        self.take_state().await?;
        tracing::warn!("Login was not approved: {}", error);
        Err(AuthError::Denied {
            error: error.to_string(),
            description: description.map(str::to_string),
        })
    }

    /// Retry the long-lived upgrade for a stored short-lived credential.
    pub async fn retry_upgrade(&self) -> Result<AccessCredential, AuthError> {
        match self.tokens.get_token().await? {
            Some(credential) if !credential.is_long_lived() => self.upgrade(&credential).await,
            _ => Err(AuthError::NoPendingUpgrade),
        }
    }

    async fn upgrade(&self, short_lived: &AccessCredential) -> Result<AccessCredential, AuthError> {
        let grant = self
            .api
            .get_long_lived_token(&short_lived.token)
            .await
            .map_err(|e| {
                tracing::warn!("Long-lived token upgrade failed: {}", e);
                AuthError::Upgrade(e)
            })?;

        let long_lived = AccessCredential::from_grant(grant, TokenLifetime::LongLived, Utc::now());
        self.refresher.install(&long_lived).await?;
        self.refresher.arm().await?;

        tracing::info!("Login complete");
        Ok(long_lived)
    }

    async fn take_state(&self) -> Result<Option<AuthorizationState>, AuthError> {
        let Some(document) = self.session.get(AUTHORIZATION_STATE_KEY).await? else {
            return Ok(None);
        };
        self.session.delete(AUTHORIZATION_STATE_KEY).await?;

        let state = serde_json::from_str(document.expose()).map_err(StoreError::from)?;
        Ok(Some(state))
    }
}

impl std::fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlow")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}
