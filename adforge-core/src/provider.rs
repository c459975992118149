//! Ad platform application configuration.
//!
//! [`PlatformConfig`] describes the registered application (id, secret,
//! redirect URI), the platform's endpoints and the refresh policy. It is
//! shared by the authorization flow, the refresh scheduler and the
//! [`GraphClient`](crate::graph::GraphClient).

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::store::Secret;

/// Default lead time before expiry at which a refresh is scheduled.
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// Default Graph API version.
pub const DEFAULT_API_VERSION: &str = "v18.0";

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &[&str] = &["ads_management", "ads_read", "business_management"];

/// Configuration for the ad platform application.
///
/// # Example
///
/// ```
/// use adforge_core::provider::PlatformConfig;
///
/// let config = PlatformConfig::new("1234", "http://localhost:8765/callback")
///     .with_app_secret("s3cret")
///     .with_api_version("v19.0");
///
/// assert_eq!(config.dialog_endpoint(), "https://www.facebook.com/v19.0/dialog/oauth");
/// assert_eq!(config.graph_base(), "https://graph.facebook.com/v19.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformConfig {
    /// Application (client) id.
    pub app_id: String,

    /// Application secret; required by the token endpoints.
    pub app_secret: Option<Secret>,

    /// Redirect URI registered with the platform.
    pub redirect_uri: String,

    /// Host serving the login dialog.
    pub dialog_url: String,

    /// Host serving the Graph API.
    pub graph_url: String,

    /// API version path segment, e.g. `v18.0`.
    pub api_version: String,

    /// Permissions requested at login.
    pub scopes: Vec<String>,

    /// Seconds before expiry at which the refresh fires.
    pub refresh_buffer_secs: i64,
}

impl PlatformConfig {
    /// Create a configuration with the platform's public endpoints.
    pub fn new(app_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: None,
            redirect_uri: redirect_uri.into(),
            dialog_url: "https://www.facebook.com".to_string(),
            graph_url: "https://graph.facebook.com".to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
        }
    }

    /// Set the application secret.
    pub fn with_app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Some(Secret::new(secret));
        self
    }

    /// Set the dialog host.
    pub fn with_dialog_url(mut self, url: impl Into<String>) -> Self {
        self.dialog_url = url.into();
        self
    }

    /// Set the Graph API host.
    pub fn with_graph_url(mut self, url: impl Into<String>) -> Self {
        self.graph_url = url.into();
        self
    }

    /// Set the API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Set the refresh buffer in seconds.
    pub fn with_refresh_buffer_secs(mut self, secs: i64) -> Self {
        self.refresh_buffer_secs = secs;
        self
    }

    /// Login dialog endpoint.
    pub fn dialog_endpoint(&self) -> String {
        format!(
            "{}/{}/dialog/oauth",
            self.dialog_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Versioned Graph API base URL.
    pub fn graph_base(&self) -> String {
        format!("{}/{}", self.graph_url.trim_end_matches('/'), self.api_version)
    }

    /// Token endpoint used by the code exchange and the upgrade.
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/access_token", self.graph_base())
    }

    /// Refresh buffer as a duration; negative values count as zero.
    pub fn refresh_buffer(&self) -> Duration {
        Duration::seconds(self.refresh_buffer_secs.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_config_defaults() {
        let config = PlatformConfig::new("app", "http://localhost/cb");

        assert_eq!(config.app_id, "app");
        assert!(config.app_secret.is_none());
        assert_eq!(config.scopes, vec!["ads_management", "ads_read", "business_management"]);
        assert_eq!(config.refresh_buffer(), Duration::minutes(5));
        assert_eq!(
            config.token_endpoint(),
            "https://graph.facebook.com/v18.0/oauth/access_token"
        );
    }

    #[test]
    fn test_platform_config_builder() {
        let config = PlatformConfig::new("app", "http://localhost/cb")
            .with_graph_url("http://127.0.0.1:9000/")
            .with_dialog_url("http://127.0.0.1:9001")
            .with_api_version("v20.0")
            .with_scopes(vec!["ads_read".to_string()])
            .with_refresh_buffer_secs(-5);

        assert_eq!(config.graph_base(), "http://127.0.0.1:9000/v20.0");
        assert_eq!(config.dialog_endpoint(), "http://127.0.0.1:9001/v20.0/dialog/oauth");
        assert_eq!(config.scopes, vec!["ads_read"]);
        assert_eq!(config.refresh_buffer(), Duration::zero());
    }
}
