//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use adforge_core::{
    AccessCredential, AdAccount, AdPlatformApi, Campaign, CampaignStatus, CampaignUpdate,
    InsightsKind, InsightsParams, InsightsRecord, MemoryStore, NewCampaign, PlatformConfig,
    RawProviderError, Secret, Session, TokenGrant, TokenLifetime, UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

/// Lifetime the fake platform gives long-lived tokens (60 days).
pub const LONG_LIVED_SECS: i64 = 60 * 24 * 60 * 60;

/// In-process stand-in for the ad platform.
///
/// Records every call and the token it carried; responses can be scripted
/// per test.
#[derive(Default)]
pub struct FakeApi {
    pub exchange_calls: AtomicUsize,
    pub upgrade_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
    pub seen_tokens: Mutex<Vec<String>>,
    exchange_error: Mutex<Option<RawProviderError>>,
    upgrade_results: Mutex<VecDeque<Result<TokenGrant, RawProviderError>>>,
    upgrade_delay: Mutex<Option<Duration>>,
    read_delay: Mutex<Option<Duration>>,
    read_error: Mutex<Option<RawProviderError>>,
    write_error: Mutex<Option<RawProviderError>>,
    campaigns: Mutex<Vec<Campaign>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_exchange(&self, error: RawProviderError) {
        *self.exchange_error.lock() = Some(error);
    }

    /// Queue the result of the next upgrade/refresh call.
    pub fn push_upgrade(&self, result: Result<TokenGrant, RawProviderError>) {
        self.upgrade_results.lock().push_back(result);
    }

    pub fn delay_upgrades(&self, delay: Duration) {
        *self.upgrade_delay.lock() = Some(delay);
    }

    pub fn delay_reads(&self, delay: Option<Duration>) {
        *self.read_delay.lock() = delay;
    }

    pub fn fail_reads(&self, error: Option<RawProviderError>) {
        *self.read_error.lock() = error;
    }

    pub fn fail_writes(&self, error: Option<RawProviderError>) {
        *self.write_error.lock() = error;
    }

    pub fn set_campaigns(&self, campaigns: Vec<Campaign>) {
        *self.campaigns.lock() = campaigns;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn record(&self, token: &Secret) {
        self.seen_tokens.lock().push(token.expose().to_string());
    }

    async fn read(&self, token: &Secret) -> Result<(), RawProviderError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.record(token);

        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.read_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn write(&self, token: &Secret) -> Result<(), RawProviderError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.record(token);
        match self.write_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AdPlatformApi for FakeApi {
    async fn exchange_code_for_token(&self, code: &str) -> Result<TokenGrant, RawProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.exchange_error.lock().clone() {
            return Err(error);
        }
        Ok(TokenGrant::new(format!("short-{}", code), Some(3600)))
    }

    async fn get_long_lived_token(&self, token: &Secret) -> Result<TokenGrant, RawProviderError> {
        let call = self.upgrade_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(token);

        let delay = *self.upgrade_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.upgrade_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(TokenGrant::new(format!("long-{}", call), Some(LONG_LIVED_SECS))))
    }

    async fn get_current_user(&self, token: &Secret) -> Result<UserProfile, RawProviderError> {
        self.read(token).await?;
        Ok(UserProfile {
            id: format!("owner-of-{}", token.expose()),
            name: Some("Dana".to_string()),
            email: None,
        })
    }

    async fn list_ad_accounts(&self, token: &Secret) -> Result<Vec<AdAccount>, RawProviderError> {
        self.read(token).await?;
        Ok(vec![AdAccount {
            id: "act_1".to_string(),
            name: Some("Main".to_string()),
            account_status: Some(1),
            currency: Some("USD".to_string()),
            timezone_name: None,
        }])
    }

    async fn get_insights(
        &self,
        _kind: InsightsKind,
        id: &str,
        _params: &InsightsParams,
        token: &Secret,
    ) -> Result<InsightsRecord, RawProviderError> {
        self.read(token).await?;
        let row = serde_json::json!({ "id": id, "impressions": "1200" });
        Ok(InsightsRecord {
            data: vec![row.as_object().cloned().unwrap_or_default()],
        })
    }

    async fn list_campaigns(
        &self,
        _account_id: &str,
        token: &Secret,
    ) -> Result<Vec<Campaign>, RawProviderError> {
        self.read(token).await?;
        Ok(self.campaigns.lock().clone())
    }

    async fn create_campaign(
        &self,
        _account_id: &str,
        campaign: &NewCampaign,
        token: &Secret,
    ) -> Result<String, RawProviderError> {
        self.write(token)?;
        let id = format!("c{}", self.campaigns.lock().len() + 1);
        self.campaigns.lock().push(Campaign {
            id: id.clone(),
            name: campaign.name.clone(),
            status: Some(campaign.status.clone()),
            objective: Some(campaign.objective.clone()),
            daily_budget: None,
            lifetime_budget: None,
        });
        Ok(id)
    }

    async fn update_campaign(
        &self,
        campaign_id: &str,
        update: &CampaignUpdate,
        token: &Secret,
    ) -> Result<(), RawProviderError> {
        self.write(token)?;
        for campaign in self.campaigns.lock().iter_mut() {
            if campaign.id == campaign_id {
                if let Some(status) = &update.status {
                    campaign.status = Some(status.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete_campaign(&self, campaign_id: &str, token: &Secret) -> Result<(), RawProviderError> {
        self.write(token)?;
        self.campaigns.lock().retain(|c| c.id != campaign_id);
        Ok(())
    }
}

pub fn config() -> PlatformConfig {
    PlatformConfig::new("app-123", "http://localhost:8765/callback").with_app_secret("shh")
}

/// A session over `api` with in-memory durable storage.
pub fn session(api: Arc<FakeApi>) -> (Session, Arc<MemoryStore>) {
    let durable = Arc::new(MemoryStore::new());
    let session = Session::new(&config(), api, durable.clone()).unwrap();
    (session, durable)
}

pub fn long_lived(token: &str, expires_in: Option<i64>) -> AccessCredential {
    AccessCredential::from_grant(
        TokenGrant::new(token, expires_in),
        TokenLifetime::LongLived,
        Utc::now(),
    )
}

pub fn campaign(id: &str, name: &str) -> Campaign {
    Campaign {
        id: id.to_string(),
        name: name.to_string(),
        status: Some(CampaignStatus::Active),
        objective: Some("OUTCOME_TRAFFIC".to_string()),
        daily_budget: None,
        lifetime_budget: None,
    }
}

/// Pull the `state` parameter out of a login URL.
pub fn state_param(login_url: &str) -> String {
    url::Url::parse(login_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}
