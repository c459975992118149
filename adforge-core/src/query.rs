//! Read access to the ad platform.
//!
//! Every read goes through [`QueryLayer`], which:
//!
//! - reads the current credential from the [`TokenStore`] on every call and
//!   fails fast with [`ErrorClassification::expired_auth`] when there is no
//!   usable one,
//! - caches successful results in a [`QueryCache`] keyed by [`QueryKey`],
//! - turns platform failures into an [`ErrorClassification`] and never
//!   hands the raw error to callers.
//!
//! [`QueryLayer::query`] gives the same result in the shape UI code expects
//! (`data`, `error`, `is_loading`, `is_success`).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::api::{
    AdAccount, AdPlatformApi, Campaign, InsightsKind, InsightsParams, InsightsRecord, UserProfile,
};
use crate::classify::{ErrorClassification, classify};
use crate::mutation::CacheScope;
use crate::store::Secret;
use crate::token_store::TokenStore;

/// Identifies one cached read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum QueryKey {
    CurrentUser,
    AdAccounts,
    Campaigns {
        account_id: String,
    },
    Insights {
        kind: InsightsKind,
        id: String,
        params: InsightsParams,
    },
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryData {
    User(UserProfile),
    AdAccounts(Vec<AdAccount>),
    Campaigns(Vec<Campaign>),
    Insights(InsightsRecord),
}

/// Lifecycle of a read as seen by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// No usable credential; nothing was requested.
    Disabled,
    /// Never requested, or invalidated since.
    Idle,
    /// A request is in flight.
    Loading,
    /// Data is available.
    Success,
    /// The last request failed.
    Error,
}

/// Hook-shaped view of a read or write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<ErrorClassification>,
    pub status: QueryStatus,
}

impl<T> QueryState<T> {
    pub fn disabled() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Disabled,
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: QueryStatus::Success,
        }
    }

    pub fn failure(error: ErrorClassification) -> Self {
        Self {
            data: None,
            error: Some(error),
            status: QueryStatus::Error,
        }
    }

    pub fn from_result(result: Result<T, ErrorClassification>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(error),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_disabled(&self) -> bool {
        self.status == QueryStatus::Disabled
    }
}

/// Successful read results keyed by [`QueryKey`].
///
/// Every clear or invalidation starts a new generation. A read that began
/// in an older generation cannot store its result.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, QueryData>>,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<QueryData> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: QueryKey, data: QueryData) {
        self.entries.write().insert(key, data);
    }

    /// Current generation; capture it before starting a read.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Insert only if nothing was cleared or invalidated since `generation`.
    pub fn insert_if_current(&self, generation: u64, key: QueryKey, data: QueryData) -> bool {
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        entries.insert(key, data);
        true
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Drop every entry `scope` covers. Returns how many were dropped.
    pub fn invalidate(&self, scope: &CacheScope) -> usize {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = entries.len();
        entries.retain(|key, _| !scope.matches(key));
        before - entries.len()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Read the credential a request should carry.
///
/// Short-lived credentials and unreadable storage both count as "no usable
/// credential".
pub(crate) async fn usable_token(tokens: &TokenStore) -> Option<Secret> {
    match tokens.get_token().await {
        Ok(Some(credential)) if credential.is_long_lived() => Some(credential.token),
        Ok(Some(_)) => {
            tracing::debug!("Only a short-lived credential is stored; treating as logged out");
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Could not read stored credential: {}", e);
            None
        }
    }
}

/// Decrements the in-flight count for a key when dropped.
struct InFlight<'a> {
    counts: &'a Mutex<HashMap<QueryKey, usize>>,
    key: QueryKey,
}

impl<'a> InFlight<'a> {
    fn enter(counts: &'a Mutex<HashMap<QueryKey, usize>>, key: &QueryKey) -> Self {
        *counts.lock().entry(key.clone()).or_insert(0) += 1;
        Self {
            counts,
            key: key.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.key);
            }
        }
    }
}

/// Cached, classified reads.
pub struct QueryLayer {
    api: Arc<dyn AdPlatformApi>,
    tokens: TokenStore,
    cache: QueryCache,
    in_flight: Mutex<HashMap<QueryKey, usize>>,
    errors: Mutex<HashMap<QueryKey, ErrorClassification>>,
}

impl QueryLayer {
    pub fn new(api: Arc<dyn AdPlatformApi>, tokens: TokenStore) -> Self {
        Self {
            api,
            tokens,
            cache: QueryCache::new(),
            in_flight: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Hook-shaped read: disabled without a usable credential, cached data
    /// when present, otherwise a fresh request.
    pub async fn query(&self, key: QueryKey) -> QueryState<QueryData> {
        let Some(token) = usable_token(&self.tokens).await else {
            return QueryState::disabled();
        };
        QueryState::from_result(self.load(&key, &token, true).await)
    }

    /// Read `key`, serving from the cache when possible.
    pub async fn fetch(&self, key: &QueryKey) -> Result<QueryData, ErrorClassification> {
        let token = usable_token(&self.tokens)
            .await
            .ok_or_else(ErrorClassification::expired_auth)?;
        self.load(key, &token, true).await
    }

    /// Read `key` from the platform, replacing any cached value.
    pub async fn refetch(&self, key: &QueryKey) -> Result<QueryData, ErrorClassification> {
        let token = usable_token(&self.tokens)
            .await
            .ok_or_else(ErrorClassification::expired_auth)?;
        self.load(key, &token, false).await
    }

    /// Current status of `key` without issuing a request.
    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        if self.in_flight.lock().contains_key(key) {
            QueryStatus::Loading
        } else if self.cache.contains(key) {
            QueryStatus::Success
        } else if self.errors.lock().contains_key(key) {
            QueryStatus::Error
        } else {
            QueryStatus::Idle
        }
    }

    /// Drop cached results covered by `scope`.
    pub fn invalidate(&self, scope: &CacheScope) {
        let mut errors = self.errors.lock();
        let dropped = self.cache.invalidate(scope);
        errors.retain(|key, _| !scope.matches(key));
        tracing::debug!("Invalidated {} cached queries for {:?}", dropped, scope);
    }

    /// Drop every cached result, including results of reads still in
    /// flight.
    pub fn clear(&self) {
        let mut errors = self.errors.lock();
        self.cache.clear();
        errors.clear();
    }

    pub async fn current_user(&self) -> Result<UserProfile, ErrorClassification> {
        match self.fetch(&QueryKey::CurrentUser).await? {
            QueryData::User(user) => Ok(user),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn ad_accounts(&self) -> Result<Vec<AdAccount>, ErrorClassification> {
        match self.fetch(&QueryKey::AdAccounts).await? {
            QueryData::AdAccounts(accounts) => Ok(accounts),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn campaigns(&self, account_id: &str) -> Result<Vec<Campaign>, ErrorClassification> {
        let key = QueryKey::Campaigns {
            account_id: account_id.to_string(),
        };
        match self.fetch(&key).await? {
            QueryData::Campaigns(campaigns) => Ok(campaigns),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn insights(
        &self,
        kind: InsightsKind,
        id: &str,
        params: InsightsParams,
    ) -> Result<InsightsRecord, ErrorClassification> {
        let key = QueryKey::Insights {
            kind,
            id: id.to_string(),
            params,
        };
        match self.fetch(&key).await? {
            QueryData::Insights(record) => Ok(record),
            other => Err(unexpected(&other)),
        }
    }

    async fn load(
        &self,
        key: &QueryKey,
        token: &Secret,
        use_cache: bool,
    ) -> Result<QueryData, ErrorClassification> {
        if use_cache {
            if let Some(data) = self.cache.get(key) {
                tracing::debug!("Cache hit for {:?}", key);
                return Ok(data);
            }
        }

        let generation = self.cache.generation();
        let result = {
            let _in_flight = InFlight::enter(&self.in_flight, key);
            self.request(key, token).await
        };

        match result {
            Ok(data) => {
                let mut errors = self.errors.lock();
                if self.cache.insert_if_current(generation, key.clone(), data.clone()) {
                    errors.remove(key);
                } else {
                    tracing::debug!("Cache cleared while {:?} was loading, not storing result", key);
                }
                Ok(data)
            }
            Err(raw) => {
                tracing::warn!("Query {:?} failed: {}", key, raw);
                let classification = classify(&raw);
                let mut errors = self.errors.lock();
                if self.cache.generation() == generation {
                    errors.insert(key.clone(), classification.clone());
                }
                Err(classification)
            }
        }
    }

    async fn request(
        &self,
        key: &QueryKey,
        token: &Secret,
    ) -> Result<QueryData, crate::classify::RawProviderError> {
        match key {
            QueryKey::CurrentUser => self.api.get_current_user(token).await.map(QueryData::User),
            QueryKey::AdAccounts => self
                .api
                .list_ad_accounts(token)
                .await
                .map(QueryData::AdAccounts),
            QueryKey::Campaigns { account_id } => self
                .api
                .list_campaigns(account_id, token)
                .await
                .map(QueryData::Campaigns),
            QueryKey::Insights { kind, id, params } => self
                .api
                .get_insights(*kind, id, params, token)
                .await
                .map(QueryData::Insights),
        }
    }
}

fn unexpected(data: &QueryData) -> ErrorClassification {
    tracing::warn!("Cached data has unexpected shape: {:?}", data);
    ErrorClassification::transient("Unexpected response shape")
}

impl std::fmt::Debug for QueryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryLayer")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaigns_key(account: &str) -> QueryKey {
        QueryKey::Campaigns {
            account_id: account.to_string(),
        }
    }

    fn insights_key(kind: InsightsKind, id: &str) -> QueryKey {
        QueryKey::Insights {
            kind,
            id: id.to_string(),
            params: InsightsParams::preset("last_7d"),
        }
    }

    #[test]
    fn test_cache_invalidate_by_scope() {
        let cache = QueryCache::new();
        cache.insert(QueryKey::CurrentUser, QueryData::Campaigns(vec![]));
        cache.insert(campaigns_key("act_1"), QueryData::Campaigns(vec![]));
        cache.insert(campaigns_key("act_2"), QueryData::Campaigns(vec![]));
        cache.insert(
            insights_key(InsightsKind::Campaign, "c1"),
            QueryData::Insights(InsightsRecord::default()),
        );

        assert_eq!(cache.invalidate(&CacheScope::CampaignList("act_1".to_string())), 1);
        assert!(cache.contains(&campaigns_key("act_2")));

        assert_eq!(cache.invalidate(&CacheScope::AllCampaignLists), 1);
        assert_eq!(cache.invalidate(&CacheScope::AllInsights), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&QueryKey::CurrentUser));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_after_clear_is_dropped() {
        let cache = QueryCache::new();
        let generation = cache.generation();

        cache.clear();
        assert!(!cache.insert_if_current(
            generation,
            QueryKey::CurrentUser,
            QueryData::Campaigns(vec![])
        ));
        assert!(cache.is_empty());

        let generation = cache.generation();
        assert!(cache.insert_if_current(
            generation,
            QueryKey::CurrentUser,
            QueryData::Campaigns(vec![])
        ));
        cache.invalidate(&CacheScope::AllInsights);
        assert!(!cache.insert_if_current(
            generation,
            campaigns_key("act_1"),
            QueryData::Campaigns(vec![])
        ));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_query_state_shape() {
        let ok: QueryState<u32> = QueryState::from_result(Ok(1));
        assert!(ok.is_success());
        assert_eq!(ok.data, Some(1));

        let failed: QueryState<u32> =
            QueryState::from_result(Err(ErrorClassification::rate_limited()));
        assert!(failed.is_error());
        assert!(failed.data.is_none());

        let disabled: QueryState<u32> = QueryState::disabled();
        assert!(disabled.is_disabled());
        assert!(!disabled.is_loading());
        assert!(disabled.error.is_none());
    }

    #[test]
    fn test_query_state_serializes_for_callers() {
        let state: QueryState<u32> = QueryState::failure(ErrorClassification::expired_auth());
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["category"], "ExpiredAuth");
        assert!(json["data"].is_null());
    }
}
