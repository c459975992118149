//! HTTP implementation of [`AdPlatformApi`] for the Graph API.
//!
//! Requests carry the access token as a bearer header. Failures are parsed
//! from the platform's error envelope:
//!
//! ```json
//! {"error": {"message": "...", "type": "OAuthException", "code": 190, "error_subcode": 463}}
//! ```
//!
//! and returned as [`RawProviderError::Api`]; anything else becomes
//! [`RawProviderError::Http`], [`RawProviderError::Network`] or
//! [`RawProviderError::Decode`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::{
    AdAccount, AdPlatformApi, Campaign, CampaignUpdate, InsightsKind, InsightsParams,
    InsightsRecord, NewCampaign, UserProfile,
};
use crate::classify::RawProviderError;
use crate::credential::TokenGrant;
use crate::error::AdforgeError;
use crate::provider::PlatformConfig;
use crate::store::Secret;

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_FIELDS: &str = "id,name,email";
const AD_ACCOUNT_FIELDS: &str = "id,name,account_status,currency,timezone_name";
const CAMPAIGN_FIELDS: &str = "id,name,status,objective,daily_budget,lifetime_budget";
const PAGE_LIMIT: &str = "100";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Success {
    #[serde(default)]
    success: bool,
}

/// Graph API client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
    config: PlatformConfig,
}

impl GraphClient {
    /// Create a client with the default request timeout.
    pub fn new(config: PlatformConfig) -> Result<Self, AdforgeError> {
        Self::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(config: PlatformConfig, timeout: Duration) -> Result<Self, AdforgeError> {
        if config.app_secret.is_none() {
            return Err(AdforgeError::Config {
                message: "app_secret is required for token exchange".to_string(),
            });
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdforgeError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { http, config })
    }

    fn app_secret(&self) -> &str {
        self.config.app_secret.as_ref().map(Secret::expose).unwrap_or_default()
    }

    fn endpoint(&self, path: &str) -> Result<Url, RawProviderError> {
        let raw = format!("{}/{}", self.config.graph_base(), path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| RawProviderError::Network {
            message: format!("invalid request URL {}: {}", raw, e),
        })
    }

    fn token_endpoint(&self) -> Result<Url, RawProviderError> {
        Url::parse(&self.config.token_endpoint()).map_err(|e| RawProviderError::Network {
            message: format!("invalid token endpoint: {}", e),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RawProviderError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| RawProviderError::Decode {
            message: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &Secret,
    ) -> Result<T, RawProviderError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().extend_pairs(query);
        self.send(self.http.get(url).bearer_auth(token.expose())).await
    }

    async fn request_token(&self, query: &[(&str, &str)]) -> Result<TokenGrant, RawProviderError> {
        let mut url = self.token_endpoint()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.app_id)
            .append_pair("client_secret", self.app_secret())
            .extend_pairs(query);
        self.send(self.http.get(url)).await
    }
}

fn transport_error(e: reqwest::Error) -> RawProviderError {
    if let Some(status) = e.status() {
        return RawProviderError::Http {
            status: status.as_u16(),
            message: e.to_string(),
        };
    }
    RawProviderError::Network {
        message: e.to_string(),
    }
}

fn parse_error(status: u16, body: &str) -> RawProviderError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error:
                ErrorBody {
                    message,
                    kind,
                    code: Some(code),
                    error_subcode,
                },
        }) => {
            tracing::debug!("Graph error {} ({:?}), subcode {:?}", code, kind, error_subcode);
            RawProviderError::Api {
                code,
                subcode: error_subcode,
                message,
                status: Some(status),
            }
        }
        Ok(ErrorEnvelope { error }) => RawProviderError::Http {
            status,
            message: error.message,
        },
        Err(_) => RawProviderError::Http {
            status,
            message: if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            },
        },
    }
}

#[async_trait]
impl AdPlatformApi for GraphClient {
    async fn exchange_code_for_token(&self, code: &str) -> Result<TokenGrant, RawProviderError> {
        self.request_token(&[
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
    }

    async fn get_long_lived_token(&self, token: &Secret) -> Result<TokenGrant, RawProviderError> {
        self.request_token(&[
            ("grant_type", "fb_exchange_token"),
            ("fb_exchange_token", token.expose()),
        ])
        .await
    }

    async fn get_current_user(&self, token: &Secret) -> Result<UserProfile, RawProviderError> {
        self.get("me", &[("fields", USER_FIELDS)], token).await
    }

    async fn list_ad_accounts(&self, token: &Secret) -> Result<Vec<AdAccount>, RawProviderError> {
        let page: Page<AdAccount> = self
            .get(
                "me/adaccounts",
                &[("fields", AD_ACCOUNT_FIELDS), ("limit", PAGE_LIMIT)],
                token,
            )
            .await?;
        Ok(page.data)
    }

    async fn get_insights(
        &self,
        kind: InsightsKind,
        id: &str,
        params: &InsightsParams,
        token: &Secret,
    ) -> Result<InsightsRecord, RawProviderError> {
        let fields = params.fields_param();
        let mut query = vec![("fields", fields.as_str()), ("level", kind.level())];

        let time_range = params.time_range.as_ref().map(|(since, until)| {
            serde_json::json!({ "since": since, "until": until }).to_string()
        });
        if let Some(range) = &time_range {
            query.push(("time_range", range.as_str()));
        } else if let Some(preset) = &params.date_preset {
            query.push(("date_preset", preset.as_str()));
        }

        self.get(&format!("{}/insights", id), &query, token).await
    }

    async fn list_campaigns(
        &self,
        account_id: &str,
        token: &Secret,
    ) -> Result<Vec<Campaign>, RawProviderError> {
        let page: Page<Campaign> = self
            .get(
                &format!("{}/campaigns", account_id),
                &[("fields", CAMPAIGN_FIELDS), ("limit", PAGE_LIMIT)],
                token,
            )
            .await?;
        Ok(page.data)
    }

    async fn create_campaign(
        &self,
        account_id: &str,
        campaign: &NewCampaign,
        token: &Secret,
    ) -> Result<String, RawProviderError> {
        let mut form = vec![
            ("name", campaign.name.clone()),
            ("objective", campaign.objective.clone()),
            ("status", campaign.status.as_str().to_string()),
            (
                "special_ad_categories",
                serde_json::to_string(&campaign.special_ad_categories).map_err(|e| {
                    RawProviderError::Decode {
                        message: e.to_string(),
                    }
                })?,
            ),
        ];
        if let Some(budget) = campaign.daily_budget {
            form.push(("daily_budget", budget.to_string()));
        }

        let url = self.endpoint(&format!("{}/campaigns", account_id))?;
        let created: Created = self
            .send(self.http.post(url).bearer_auth(token.expose()).form(&form))
            .await?;
        Ok(created.id)
    }

    async fn update_campaign(
        &self,
        campaign_id: &str,
        update: &CampaignUpdate,
        token: &Secret,
    ) -> Result<(), RawProviderError> {
        let url = self.endpoint(campaign_id)?;
        let result: Success = self
            .send(
                self.http
                    .post(url)
                    .bearer_auth(token.expose())
                    .form(&update.to_params()),
            )
            .await?;
        if !result.success {
            tracing::warn!("Campaign {} update was not acknowledged", campaign_id);
        }
        Ok(())
    }

    async fn delete_campaign(&self, campaign_id: &str, token: &Secret) -> Result<(), RawProviderError> {
        let url = self.endpoint(campaign_id)?;
        let result: Success = self
            .send(self.http.delete(url).bearer_auth(token.expose()))
            .await?;
        if !result.success {
            tracing::warn!("Campaign {} deletion was not acknowledged", campaign_id);
        }
        Ok(())
    }
}
