//! Proactive refresh scheduling.
//!
//! [`RefreshScheduler`] arms at most one timer per credential. The timer
//! fires `buffer` before the stored expiry and invokes a caller-supplied
//! [`RefreshCallback`]. Scheduling again cancels the previous timer first;
//! a credential that is already expired triggers the callback inline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::store::StoreError;
use crate::token_store::TokenStore;

/// Callback invoked when a refresh is due.
///
/// Runs on the timer task (or inline for stale credentials), so it should
/// only kick off the async refresh, not await it.
pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// A pending timer.
#[derive(Debug)]
pub struct ScheduledRefresh {
    fire_at: DateTime<Utc>,
    generation: u64,
    handle: JoinHandle<()>,
}

impl ScheduledRefresh {
    /// When the callback is due.
    pub fn fire_at(&self) -> DateTime<Utc> {
        self.fire_at
    }

    fn cancel(self) {
        self.handle.abort();
    }
}

/// Result of a [`RefreshScheduler::schedule_refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// No credential, or the credential never expires.
    Skipped,
    /// The credential had already expired; the callback ran inline.
    FiredImmediately,
    /// A timer is armed for `fire_at`.
    Scheduled { fire_at: DateTime<Utc> },
}

/// Arms and cancels the refresh timer for the current credential.
pub struct RefreshScheduler {
    tokens: TokenStore,
    buffer: Duration,
    pending: Arc<Mutex<Option<ScheduledRefresh>>>,
    generation: AtomicU64,
}

impl RefreshScheduler {
    /// Create an idle scheduler reading expiries from `tokens`.
    pub fn new(tokens: TokenStore, buffer: Duration) -> Self {
        Self {
            tokens,
            buffer,
            pending: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Lead time before expiry at which timers fire.
    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Schedule `on_refresh` for the stored credential's expiry.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn schedule_refresh(
        &self,
        on_refresh: RefreshCallback,
    ) -> Result<ScheduleOutcome, StoreError> {
        let Some(expires_at) = self.tokens.get_expiry().await? else {
            tracing::debug!("No credential expiry stored, nothing to schedule");
            return Ok(ScheduleOutcome::Skipped);
        };

        let now = Utc::now();
        if now >= expires_at {
            self.cancel();
            tracing::info!("Stored credential expired at {}, refreshing now", expires_at);
            on_refresh();
            return Ok(ScheduleOutcome::FiredImmediately);
        }

        let fire_at = (expires_at - self.buffer).max(now);
        let delay = (fire_at - now).to_std().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Held until the new entry is in place so the timer task cannot
        // observe the slot before it is filled.
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            tracing::debug!("Cancelling refresh previously scheduled for {}", previous.fire_at);
            previous.cancel();
        }

        let slot = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let due = {
                let mut guard = slot.lock();
                match guard.as_ref() {
                    Some(entry) if entry.generation == generation => guard.take(),
                    _ => None,
                }
            };

            if due.is_some() {
                tracing::debug!("Refresh timer fired");
                on_refresh();
            }
        });

        *pending = Some(ScheduledRefresh {
            fire_at,
            generation,
            handle,
        });

        tracing::debug!("Refresh scheduled for {} (expiry {})", fire_at, expires_at);
        Ok(ScheduleOutcome::Scheduled { fire_at })
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(scheduled) => {
                tracing::debug!("Cancelled refresh scheduled for {}", scheduled.fire_at);
                scheduled.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a timer is armed.
    pub fn is_scheduled(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Fire time of the armed timer, if any.
    pub fn pending_fire_at(&self) -> Option<DateTime<Utc>> {
        self.pending.lock().as_ref().map(ScheduledRefresh::fire_at)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(scheduled) = self.pending.lock().take() {
            scheduled.cancel();
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("buffer", &self.buffer)
            .field("pending_fire_at", &self.pending_fire_at())
            .finish()
    }
}
