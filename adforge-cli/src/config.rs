//! CLI configuration handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use adforge_core::provider::{DEFAULT_API_VERSION, DEFAULT_REFRESH_BUFFER_SECS, DEFAULT_SCOPES};
use adforge_core::{FileStore, PlatformConfig, Secret, StorageBackend};
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Environment variable overriding `app_id`.
pub const APP_ID_ENV: &str = "ADFORGE_APP_ID";

/// Environment variable overriding `app_secret`.
pub const APP_SECRET_ENV: &str = "ADFORGE_APP_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Application id registered with the platform.
    pub app_id: Option<String>,

    /// Application secret.
    pub app_secret: Option<Secret>,

    /// Redirect URI registered with the platform; the login command listens
    /// on its host and port.
    pub redirect_uri: String,

    pub api_version: String,

    pub graph_url: String,

    pub dialog_url: String,

    /// Permissions requested at login.
    pub scopes: Vec<String>,

    /// Seconds before expiry at which the credential is refreshed.
    pub refresh_buffer_secs: i64,

    /// Per-request timeout for platform calls.
    pub request_timeout_secs: u64,

    /// Where the credential is kept.
    pub storage: StorageBackend,

    /// Directory for the credential file.
    pub data_dir: PathBuf,

    /// Logging level when `RUST_LOG` is unset.
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        let data_dir = FileStore::default_dir().unwrap_or_else(|_| PathBuf::from(".adforge"));

        Self {
            app_id: None,
            app_secret: None,
            redirect_uri: "http://localhost:8765/callback".to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            graph_url: "https://graph.facebook.com".to_string(),
            dialog_url: "https://www.facebook.com".to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            request_timeout_secs: 30,
            storage: StorageBackend::default(),
            data_dir,
            log_level: "info".to_string(),
            config_path: PathBuf::new(),
        }
    }
}

impl CliConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration")
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(app_id) = lookup(APP_ID_ENV).filter(|v| !v.is_empty()) {
            self.app_id = Some(app_id);
        }
        if let Some(secret) = lookup(APP_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.app_secret = Some(Secret::new(secret));
        }
    }

    /// Platform settings for the core library.
    pub fn platform_config(&self) -> Result<PlatformConfig> {
        let Some(app_id) = self.app_id.as_deref() else {
            bail!(
                "app_id is not configured; set it in {:?} or via {}",
                self.config_path,
                APP_ID_ENV
            );
        };

        let mut config = PlatformConfig::new(app_id, self.redirect_uri.clone())
            .with_api_version(self.api_version.clone())
            .with_graph_url(self.graph_url.clone())
            .with_dialog_url(self.dialog_url.clone())
            .with_scopes(self.scopes.clone())
            .with_refresh_buffer_secs(self.refresh_buffer_secs);
        config.app_secret = self.app_secret.clone();

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file at the default location yields the defaults; a missing
/// file at an explicit path is an error.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let (config_path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        CliConfig::from_toml(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else if required {
        bail!("Config file {:?} does not exist", config_path);
    } else {
        CliConfig::default()
    };

    config.config_path = config_path;
    config.apply_env(|name| std::env::var(name).ok());

    Ok(config)
}

fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("adforge.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "adforge", "adforge")
}
