//! # adforge Core
//!
//! Credential lifecycle and data access for ad platform integrations.
//!
//! This crate provides:
//! - Login through the authorization code flow with a CSRF-checked `state`
//! - Durable storage of the current access credential
//! - Proactive refresh scheduling ahead of expiry
//! - Classification of platform failures into actionable categories
//! - Cached reads and invalidating writes against the platform
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use adforge_core::{GraphClient, MemoryStore, PlatformConfig, Session};
//!
//! async fn login(code: &str, state: &str) -> Result<(), adforge_core::AdforgeError> {
//!     let config = PlatformConfig::new("app-id", "http://localhost:8765/callback")
//!         .with_app_secret("app-secret");
//!     let api = Arc::new(GraphClient::new(config.clone())?);
//!     let session = Session::new(&config, api, Arc::new(MemoryStore::new()))?;
//!
//!     println!("Open {}", session.get_login_url().await?);
//!     session.exchange_code(code, state).await?;
//!     let user = session.current_user().await?;
//!     println!("Logged in as {}", user.id);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod authorize;
pub mod classify;
pub mod credential;
pub mod error;
pub mod mutation;
pub mod provider;
pub mod query;
pub mod refresher;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod token_store;

#[cfg(feature = "graph")]
pub mod graph;

// Re-export commonly used types at crate root
pub use api::{
    AdAccount,
    AdPlatformApi,
    Campaign,
    CampaignStatus,
    CampaignUpdate,
    InsightsKind,
    InsightsParams,
    InsightsRecord,
    NewCampaign,
    UserProfile,
};

pub use authorize::{
    AuthError,
    AuthorizationFlow,
    AuthorizationState,
};

pub use classify::{
    ErrorCategory,
    ErrorClassification,
    RawProviderError,
    RetryPolicy,
    classify,
};

pub use credential::{
    AccessCredential,
    TokenGrant,
    TokenLifetime,
};

pub use error::AdforgeError;

pub use mutation::{
    CacheScope,
    Mutation,
    MutationLayer,
    MutationOutput,
};

pub use provider::PlatformConfig;

pub use query::{
    QueryCache,
    QueryData,
    QueryKey,
    QueryLayer,
    QueryState,
    QueryStatus,
};

pub use refresher::{
    RefreshError,
    TokenRefresher,
};

pub use scheduler::{
    RefreshCallback,
    RefreshScheduler,
    ScheduleOutcome,
};

pub use session::Session;

pub use store::{
    FileStore,
    MemoryStore,
    Secret,
    SecretStore,
    StorageBackend,
    StoreError,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use token_store::TokenStore;

#[cfg(feature = "graph")]
pub use graph::GraphClient;
