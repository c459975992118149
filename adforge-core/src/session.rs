//! The session context.
//!
//! [`Session`] wires one [`TokenStore`] into every component that needs the
//! credential and is the surface callers use: login, logout, status, reads
//! and writes.

use std::sync::Arc;

use crate::api::{AdPlatformApi, UserProfile};
use crate::authorize::AuthorizationFlow;
use crate::classify::ErrorClassification;
use crate::credential::AccessCredential;
use crate::error::AdforgeError;
use crate::mutation::MutationLayer;
use crate::provider::PlatformConfig;
use crate::query::QueryLayer;
use crate::refresher::TokenRefresher;
use crate::scheduler::{RefreshScheduler, ScheduleOutcome};
use crate::store::{MemoryStore, SecretStore};
use crate::token_store::TokenStore;

/// One user's connection to the ad platform.
pub struct Session {
    tokens: TokenStore,
    refresher: Arc<TokenRefresher>,
    flow: AuthorizationFlow,
    queries: Arc<QueryLayer>,
    mutations: MutationLayer,
}

impl Session {
    /// Create a session persisting credentials in `durable`.
    ///
    /// Login state lives in process memory.
    pub fn new(
        config: &PlatformConfig,
        api: Arc<dyn AdPlatformApi>,
        durable: Arc<dyn SecretStore>,
    ) -> Result<Self, AdforgeError> {
        Self::with_session_store(config, api, durable, Arc::new(MemoryStore::new()))
    }

    /// Create a session with an explicit store for login state.
    pub fn with_session_store(
        config: &PlatformConfig,
        api: Arc<dyn AdPlatformApi>,
        durable: Arc<dyn SecretStore>,
        session: Arc<dyn SecretStore>,
    ) -> Result<Self, AdforgeError> {
        let tokens = TokenStore::new(durable);
        let refresher = TokenRefresher::new(Arc::clone(&api), tokens.clone(), config.refresh_buffer());
        let flow = AuthorizationFlow::new(
            config,
            Arc::clone(&api),
            session,
            tokens.clone(),
            Arc::clone(&refresher),
        )?;
        let queries = Arc::new(QueryLayer::new(Arc::clone(&api), tokens.clone()));
        let mutations = MutationLayer::new(api, tokens.clone(), Arc::clone(&queries));

        Ok(Self {
            tokens,
            refresher,
            flow,
            queries,
            mutations,
        })
    }

    /// Start a login and return the URL to open.
    pub async fn get_login_url(&self) -> Result<String, AdforgeError> {
        Ok(self.flow.build_login_url().await?)
    }

    /// Complete a login from the redirect parameters.
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<AccessCredential, AdforgeError> {
        let credential = self.flow.handle_callback(code, state).await?;
        self.queries.clear();
        Ok(credential)
    }

    /// Complete a login whose redirect carried an error.
    pub async fn reject_login(&self, error: &str, description: Option<&str>) -> Result<(), AdforgeError> {
        Ok(self.flow.handle_provider_error(error, description).await?)
    }

    /// Retry the long-lived upgrade after a failed login.
    pub async fn retry_upgrade(&self) -> Result<AccessCredential, AdforgeError> {
        Ok(self.flow.retry_upgrade().await?)
    }

    /// End the session: stop refreshing, forget the credential and every
    /// cached result.
    pub async fn logout(&self) -> Result<(), AdforgeError> {
        self.refresher.end_session().await?;
        self.queries.clear();
        tracing::info!("Logged out");
        Ok(())
    }

    /// A long-lived credential is stored.
    pub async fn is_authenticated(&self) -> Result<bool, AdforgeError> {
        Ok(self
            .tokens
            .get_token()
            .await?
            .is_some_and(|c| c.is_long_lived()))
    }

    /// A long-lived credential is stored and has not expired.
    pub async fn is_token_valid(&self) -> Result<bool, AdforgeError> {
        Ok(self.tokens.is_token_valid().await?)
    }

    /// The stored credential, including a short-lived one awaiting upgrade.
    pub async fn credential(&self) -> Result<Option<AccessCredential>, AdforgeError> {
        Ok(self.tokens.get_token().await?)
    }

    /// Profile of the logged-in user.
    pub async fn current_user(&self) -> Result<UserProfile, ErrorClassification> {
        self.queries.current_user().await
    }

    /// Refresh the credential now instead of waiting for the timer.
    pub async fn refresh_now(&self) -> Result<AccessCredential, AdforgeError> {
        Ok(self.refresher.refresh().await?)
    }

    /// Arm the refresh timer for a credential persisted by an earlier run.
    pub async fn resume(&self) -> Result<ScheduleOutcome, AdforgeError> {
        match self.tokens.get_token().await? {
            Some(credential) if credential.is_long_lived() => Ok(self.refresher.arm().await?),
            Some(_) => {
                tracing::info!("Stored credential was never upgraded; run the login again or retry the upgrade");
                Ok(ScheduleOutcome::Skipped)
            }
            None => Ok(ScheduleOutcome::Skipped),
        }
    }

    pub fn queries(&self) -> &QueryLayer {
        &self.queries
    }

    pub fn mutations(&self) -> &MutationLayer {
        &self.mutations
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        self.refresher.scheduler()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("refresher", &self.refresher)
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}
