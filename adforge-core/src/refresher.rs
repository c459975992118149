//! The token refresh path.
//!
//! [`TokenRefresher`] owns the [`RefreshScheduler`] and is the only writer
//! of the current credential. Writes go through a gate that also tracks a
//! session epoch: every install or logout starts a new epoch, and a refresh
//! that started in an older epoch drops its result instead of writing it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::api::AdPlatformApi;
use crate::classify::RawProviderError;
use crate::credential::{AccessCredential, TokenLifetime};
use crate::scheduler::{RefreshCallback, RefreshScheduler, ScheduleOutcome};
use crate::store::StoreError;
use crate::token_store::TokenStore;

/// Error type for refresh operations.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// No long-lived credential is stored.
    #[error("no long-lived credential to refresh")]
    NoCredential,

    /// Another refresh is running.
    #[error("a token refresh is already in flight")]
    InFlight,

    /// The credential was replaced or cleared while the refresh ran.
    #[error("credential changed while refreshing; result discarded")]
    Superseded,

    /// The provider rejected the refresh.
    #[error("token refresh failed: {0}")]
    Provider(#[from] RawProviderError),

    /// Storage error reading or writing the credential.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Refreshes the current credential and keeps the scheduler armed.
pub struct TokenRefresher {
    api: Arc<dyn AdPlatformApi>,
    tokens: TokenStore,
    scheduler: RefreshScheduler,
    write_gate: Mutex<()>,
    in_flight: Mutex<()>,
    epoch: AtomicU64,
}

impl TokenRefresher {
    /// Create a refresher with an idle scheduler.
    pub fn new(api: Arc<dyn AdPlatformApi>, tokens: TokenStore, buffer: Duration) -> Arc<Self> {
        let scheduler = RefreshScheduler::new(tokens.clone(), buffer);
        Arc::new(Self {
            api,
            tokens,
            scheduler,
            write_gate: Mutex::new(()),
            in_flight: Mutex::new(()),
            epoch: AtomicU64::new(0),
        })
    }

    /// The scheduler driven by this refresher.
    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Store a freshly issued credential, starting a new epoch.
    pub async fn install(&self, credential: &AccessCredential) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.tokens.set_token(credential).await
    }

    /// Cancel the timer and clear the credential as one step.
    pub async fn end_session(&self) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.scheduler.cancel();
        self.tokens.clear_token().await
    }

    /// Arm the scheduler for the stored credential.
    pub async fn arm(self: &Arc<Self>) -> Result<ScheduleOutcome, StoreError> {
        self.scheduler.schedule_refresh(self.refresh_callback()).await
    }

    /// Exchange the current long-lived credential for a new one and re-arm.
    pub async fn refresh(self: &Arc<Self>) -> Result<AccessCredential, RefreshError> {
        let _in_flight = self.in_flight.try_lock().map_err(|_| RefreshError::InFlight)?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let current = self
            .tokens
            .get_token()
            .await?
            .filter(AccessCredential::is_long_lived)
            .ok_or(RefreshError::NoCredential)?;

        let grant = self.api.get_long_lived_token(&current.token).await?;
        let refreshed = AccessCredential::from_grant(grant, TokenLifetime::LongLived, Utc::now());

        {
            let _gate = self.write_gate.lock().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                tracing::info!("Credential changed during refresh, discarding refreshed token");
                return Err(RefreshError::Superseded);
            }
            self.tokens.set_token(&refreshed).await?;
        }

        tracing::info!(
            "Refreshed access token, new expiry {}",
            refreshed
                .expires_at
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "none".to_string())
        );

        // A grant that already sits inside the buffer would arm the timer at
        // "now" again; the platform will not extend it, so stop here.
        let extended = refreshed
            .expires_at
            .is_none_or(|expires_at| expires_at > Utc::now() + self.scheduler.buffer());
        if extended {
            self.scheduler
                .schedule_refresh(self.refresh_callback())
                .await?;
        } else {
            self.scheduler.cancel();
            tracing::warn!(
                "Refreshed token still expires within the refresh buffer; log in again before {}",
                refreshed
                    .expires_at
                    .map(|e| e.to_rfc3339())
                    .unwrap_or_default()
            );
        }

        Ok(refreshed)
    }

    fn refresh_callback(self: &Arc<Self>) -> RefreshCallback {
        let weak = Arc::downgrade(self);
        Arc::new(move || {
            let Some(refresher) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                match refresher.refresh().await {
                    Ok(_) => {}
                    Err(RefreshError::InFlight) => {
                        tracing::debug!("Scheduled refresh skipped, another refresh is running");
                    }
                    Err(e) => {
                        tracing::warn!("Scheduled token refresh failed: {}", e);
                    }
                }
            });
        })
    }
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("scheduler", &self.scheduler)
            .field("epoch", &self.epoch.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
