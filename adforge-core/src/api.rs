//! The ad platform collaborator and its data model.
//!
//! [`AdPlatformApi`] is the only way the rest of the crate talks to the
//! platform. Every method returns either data or a [`RawProviderError`];
//! classification happens in the query and mutation layers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classify::RawProviderError;
use crate::credential::TokenGrant;
use crate::store::Secret;

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// An ad account the user can manage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_status: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub timezone_name: Option<String>,
}

/// Delivery status of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Active,
    Paused,
    Deleted,
    Archived,
    #[serde(other)]
    Unknown,
}

impl CampaignStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Deleted => "DELETED",
            Self::Archived => "ARCHIVED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A campaign as listed by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<CampaignStatus>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub daily_budget: Option<String>,
    #[serde(default)]
    pub lifetime_budget: Option<String>,
}

/// Fields for a new campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub objective: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub special_ad_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<u64>,
}

/// Partial update for an existing campaign; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CampaignStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<u64>,
}

impl CampaignUpdate {
    /// An update that only pauses the campaign.
    pub fn pause() -> Self {
        Self {
            status: Some(CampaignStatus::Paused),
            ..Self::default()
        }
    }

    /// Form parameters for the update request.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.name {
            params.push(("name", name.clone()));
        }
        if let Some(status) = &self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(budget) = self.daily_budget {
            params.push(("daily_budget", budget.to_string()));
        }
        params
    }
}

/// Object whose insights are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightsKind {
    Account,
    Campaign,
    AdSet,
    Ad,
}

impl InsightsKind {
    /// The `level` parameter value for this kind.
    pub fn level(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Campaign => "campaign",
            Self::AdSet => "adset",
            Self::Ad => "ad",
        }
    }
}

impl std::str::FromStr for InsightsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(Self::Account),
            "campaign" => Ok(Self::Campaign),
            "adset" | "ad_set" => Ok(Self::AdSet),
            "ad" => Ok(Self::Ad),
            other => Err(format!("unknown insights kind: {}", other)),
        }
    }
}

/// Query parameters for an insights request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InsightsParams {
    /// Named range such as `last_7d`.
    pub date_preset: Option<String>,
    /// Explicit `(since, until)` range in `YYYY-MM-DD`.
    pub time_range: Option<(String, String)>,
    /// Metrics to return; empty means the default set.
    pub fields: Vec<String>,
}

impl InsightsParams {
    /// Metrics returned when no fields are requested.
    pub const DEFAULT_FIELDS: &'static [&'static str] = &[
        "impressions",
        "clicks",
        "spend",
        "reach",
        "ctr",
        "cpc",
        "cpm",
    ];

    /// Parameters for a named date preset.
    pub fn preset(preset: impl Into<String>) -> Self {
        Self {
            date_preset: Some(preset.into()),
            ..Self::default()
        }
    }

    /// Comma-joined field list, falling back to [`Self::DEFAULT_FIELDS`].
    pub fn fields_param(&self) -> String {
        if self.fields.is_empty() {
            Self::DEFAULT_FIELDS.join(",")
        } else {
            self.fields.join(",")
        }
    }
}

/// Insights rows for one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsRecord {
    #[serde(default)]
    pub data: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Operations the ad platform exposes.
///
/// Implementations own transport concerns (timeouts, retries on the wire);
/// callers only see data or a [`RawProviderError`].
#[async_trait]
pub trait AdPlatformApi: Send + Sync {
    /// Trade an authorization code for a short-lived token.
    async fn exchange_code_for_token(&self, code: &str) -> Result<TokenGrant, RawProviderError>;

    /// Trade a token for a long-lived one. Also used to refresh.
    async fn get_long_lived_token(&self, token: &Secret) -> Result<TokenGrant, RawProviderError>;

    /// Profile of the token's owner.
    async fn get_current_user(&self, token: &Secret) -> Result<UserProfile, RawProviderError>;

    /// Ad accounts the user can access.
    async fn list_ad_accounts(&self, token: &Secret) -> Result<Vec<AdAccount>, RawProviderError>;

    /// Insights for an account, campaign, ad set or ad.
    async fn get_insights(
        &self,
        kind: InsightsKind,
        id: &str,
        params: &InsightsParams,
        token: &Secret,
    ) -> Result<InsightsRecord, RawProviderError>;

    /// Campaigns of an ad account.
    async fn list_campaigns(
        &self,
        account_id: &str,
        token: &Secret,
    ) -> Result<Vec<Campaign>, RawProviderError>;

    /// Create a campaign; returns the new campaign id.
    async fn create_campaign(
        &self,
        account_id: &str,
        campaign: &NewCampaign,
        token: &Secret,
    ) -> Result<String, RawProviderError>;

    /// Apply a partial update to a campaign.
    async fn update_campaign(
        &self,
        campaign_id: &str,
        update: &CampaignUpdate,
        token: &Secret,
    ) -> Result<(), RawProviderError>;

    /// Delete a campaign.
    async fn delete_campaign(&self, campaign_id: &str, token: &Secret) -> Result<(), RawProviderError>;
}
