//! Writes to the ad platform and the cache entries they invalidate.

use std::sync::Arc;

use serde::Serialize;

use crate::api::{AdPlatformApi, CampaignUpdate, InsightsKind, NewCampaign};
use crate::classify::{ErrorClassification, RawProviderError, classify};
use crate::query::{QueryKey, QueryLayer, QueryState, usable_token};
use crate::store::Secret;
use crate::token_store::TokenStore;

/// A set of cached queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Every campaign list.
    AllCampaignLists,
    /// Campaign list of one account.
    CampaignList(String),
    /// Account-level insights of one account.
    AccountInsights(String),
    /// Insights of one object, for any parameters.
    Insights { kind: InsightsKind, id: String },
    /// Every insights query.
    AllInsights,
    /// Everything.
    All,
}

impl CacheScope {
    /// Whether `key` falls inside this scope.
    pub fn matches(&self, key: &QueryKey) -> bool {
        match (self, key) {
            (Self::All, _) => true,
            (Self::AllCampaignLists, QueryKey::Campaigns { .. }) => true,
            (Self::CampaignList(account), QueryKey::Campaigns { account_id }) => {
                account == account_id
            }
            (
                Self::AccountInsights(account),
                QueryKey::Insights {
                    kind: InsightsKind::Account,
                    id,
                    ..
                },
            ) => account == id,
            (
                Self::Insights { kind, id },
                QueryKey::Insights {
                    kind: key_kind,
                    id: key_id,
                    ..
                },
            ) => kind == key_kind && id == key_id,
            (Self::AllInsights, QueryKey::Insights { .. }) => true,
            _ => false,
        }
    }
}

/// A write against the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateCampaign {
        account_id: String,
        campaign: NewCampaign,
    },
    UpdateCampaign {
        campaign_id: String,
        update: CampaignUpdate,
    },
    PauseCampaign {
        campaign_id: String,
    },
    DeleteCampaign {
        campaign_id: String,
    },
}

impl Mutation {
    /// Cached queries made stale by a successful run of this mutation.
    pub fn invalidates(&self) -> Vec<CacheScope> {
        match self {
            Self::CreateCampaign { account_id, .. } => vec![
                CacheScope::CampaignList(account_id.clone()),
                CacheScope::AccountInsights(account_id.clone()),
            ],
            Self::UpdateCampaign { campaign_id, .. } | Self::PauseCampaign { campaign_id } => vec![
                CacheScope::AllCampaignLists,
                CacheScope::Insights {
                    kind: InsightsKind::Campaign,
                    id: campaign_id.clone(),
                },
            ],
            Self::DeleteCampaign { campaign_id } => vec![
                CacheScope::AllCampaignLists,
                CacheScope::Insights {
                    kind: InsightsKind::Campaign,
                    id: campaign_id.clone(),
                },
                CacheScope::AllInsights,
            ],
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::CreateCampaign { .. } => "create_campaign",
            Self::UpdateCampaign { .. } => "update_campaign",
            Self::PauseCampaign { .. } => "pause_campaign",
            Self::DeleteCampaign { .. } => "delete_campaign",
        }
    }
}

/// What a successful mutation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MutationOutput {
    Created { campaign_id: String },
    Updated,
    Deleted,
}

/// Classified writes with cache invalidation.
pub struct MutationLayer {
    api: Arc<dyn AdPlatformApi>,
    tokens: TokenStore,
    queries: Arc<QueryLayer>,
}

impl MutationLayer {
    pub fn new(api: Arc<dyn AdPlatformApi>, tokens: TokenStore, queries: Arc<QueryLayer>) -> Self {
        Self {
            api,
            tokens,
            queries,
        }
    }

    /// Run `mutation`, invalidating its scopes on success.
    pub async fn execute(&self, mutation: &Mutation) -> Result<MutationOutput, ErrorClassification> {
        let token = usable_token(&self.tokens)
            .await
            .ok_or_else(ErrorClassification::expired_auth)?;

        match self.send(mutation, &token).await {
            Ok(output) => {
                for scope in mutation.invalidates() {
                    self.queries.invalidate(&scope);
                }
                tracing::info!("{} succeeded", mutation.name());
                Ok(output)
            }
            Err(raw) => {
                tracing::warn!("{} failed: {}", mutation.name(), raw);
                Err(classify(&raw))
            }
        }
    }

    /// Hook-shaped view of [`execute`](Self::execute); disabled without a
    /// usable credential.
    pub async fn run(&self, mutation: Mutation) -> QueryState<MutationOutput> {
        if usable_token(&self.tokens).await.is_none() {
            return QueryState::disabled();
        }
        QueryState::from_result(self.execute(&mutation).await)
    }

    /// Create a campaign; returns its id.
    pub async fn create_campaign(
        &self,
        account_id: &str,
        campaign: NewCampaign,
    ) -> Result<String, ErrorClassification> {
        let mutation = Mutation::CreateCampaign {
            account_id: account_id.to_string(),
            campaign,
        };
        match self.execute(&mutation).await? {
            MutationOutput::Created { campaign_id } => Ok(campaign_id),
            other => Err(ErrorClassification::transient(format!(
                "unexpected mutation result: {:?}",
                other
            ))),
        }
    }

    pub async fn update_campaign(
        &self,
        campaign_id: &str,
        update: CampaignUpdate,
    ) -> Result<(), ErrorClassification> {
        self.execute(&Mutation::UpdateCampaign {
            campaign_id: campaign_id.to_string(),
            update,
        })
        .await
        .map(|_| ())
    }

    pub async fn pause_campaign(&self, campaign_id: &str) -> Result<(), ErrorClassification> {
        self.execute(&Mutation::PauseCampaign {
            campaign_id: campaign_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn delete_campaign(&self, campaign_id: &str) -> Result<(), ErrorClassification> {
        self.execute(&Mutation::DeleteCampaign {
            campaign_id: campaign_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn send(&self, mutation: &Mutation, token: &Secret) -> Result<MutationOutput, RawProviderError> {
        match mutation {
            Mutation::CreateCampaign {
                account_id,
                campaign,
            } => self
                .api
                .create_campaign(account_id, campaign, token)
                .await
                .map(|campaign_id| MutationOutput::Created { campaign_id }),
            Mutation::UpdateCampaign {
                campaign_id,
                update,
            } => self
                .api
                .update_campaign(campaign_id, update, token)
                .await
                .map(|_| MutationOutput::Updated),
            Mutation::PauseCampaign { campaign_id } => self
                .api
                .update_campaign(campaign_id, &CampaignUpdate::pause(), token)
                .await
                .map(|_| MutationOutput::Updated),
            Mutation::DeleteCampaign { campaign_id } => self
                .api
                .delete_campaign(campaign_id, token)
                .await
                .map(|_| MutationOutput::Deleted),
        }
    }
}

impl std::fmt::Debug for MutationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationLayer").finish_non_exhaustive()
    }
}
