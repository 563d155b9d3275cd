//! Bearer token cache and per-request auth headers
//!
//! ## Token lookup order
//! 1. In-process copy, if still fresh
//! 2. Shared cache, if configured and reachable
//! 3. `fetch` against the token endpoint
//!
//! A fetched token is written to both layers. The shared cache is best
//! effort: every failure or stall past the cache timeout is logged, counted
//! and treated as a miss, and the in-process copy stays authoritative.
//!
//! The token cache prefix is applied here, once, when the cache key is
//! built. Shared cache backends store keys verbatim.
//!
//! Concurrent refreshes are not serialised. Two callers that both see a
//! near-expiry token both fetch; the last write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use catalink_common::observability::ClientMetrics;
use catalink_domain::constants::AUTHORIZATION_HEADER;
use catalink_domain::{AuthSettings, CatalinkError, Credentials, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ports::SharedCache;

/// Deadline for one shared cache call unless configured otherwise
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(500);
use super::signature::signed_authorization;
use crate::api::endpoint::AuthScheme;

/// Token endpoint answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Bearer token plus absolute expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn from_grant(grant: TokenGrant, now: DateTime<Utc>) -> Self {
        let lifetime = chrono::Duration::from_std(grant.expires_in).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { token: grant.access_token, expires_at }
    }

    /// Usable if it does not expire within `threshold` of `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        let margin = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(margin).is_some_and(|deadline| deadline < self.expires_at)
    }

    fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Produces authentication material for every outgoing request
pub struct AuthManager {
    credentials: Credentials,
    signed_header: String,
    refresh_threshold: Duration,
    cache_key: String,
    token: RwLock<Option<CachedToken>>,
    shared_cache: Option<Arc<dyn SharedCache>>,
    cache_timeout: Duration,
    metrics: Arc<ClientMetrics>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("credentials", &self.credentials)
            .field("cache_key", &self.cache_key)
            .field("shared_cache", &self.shared_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    pub fn new(credentials: Credentials, settings: &AuthSettings) -> Self {
        let cache_key = format!(
            "{}:{}:{}",
            settings.token_cache_prefix, credentials.environment, credentials.client_id
        );
        Self {
            signed_header: signed_authorization(&credentials),
            credentials,
            refresh_threshold: settings.token_refresh_threshold(),
            cache_key,
            token: RwLock::new(None),
            shared_cache: None,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            metrics: Arc::new(ClientMetrics::new()),
        }
    }

    pub fn with_shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Bound every shared cache call
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Key under which the token is mirrored in the shared cache
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Headers for signed endpoints
    pub fn signed_headers(&self) -> Vec<(String, String)> {
        vec![(AUTHORIZATION_HEADER.to_string(), self.signed_header.clone())]
    }

    /// Headers for an endpoint of the given scheme
    ///
    /// `fetch` is only invoked for bearer endpoints without a fresh token.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` when a token is needed and cannot be fetched.
    pub async fn auth_headers<F, Fut>(
        &self,
        scheme: AuthScheme,
        fetch: F,
    ) -> Result<Vec<(String, String)>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant>>,
    {
        match scheme {
            AuthScheme::None => Ok(Vec::new()),
            AuthScheme::Signed => Ok(self.signed_headers()),
            AuthScheme::Bearer => {
                let token = self.get_token(fetch).await?;
                Ok(vec![(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"))])
            }
        }
    }

    /// Current token if fresh, without fetching
    pub fn current_token(&self) -> Option<CachedToken> {
        let now = Utc::now();
        self.token.read().as_ref().filter(|cached| cached.is_fresh(now, self.refresh_threshold)).cloned()
    }

    /// Bearer token, fetched through `fetch` when no fresh copy exists
    pub async fn get_token<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant>>,
    {
        if let Some(cached) = self.current_token() {
            return Ok(cached.token);
        }

        if let Some(cached) = self.read_shared().await {
            debug!(cache_key = %self.cache_key, "using bearer token from shared cache");
            let token = cached.token.clone();
            *self.token.write() = Some(cached);
            return Ok(token);
        }

        self.fetch_and_store(fetch).await
    }

    /// Drop the token from both layers
    pub async fn invalidate_token(&self) {
        *self.token.write() = None;
        if let Some(cache) = &self.shared_cache {
            if let Err(err) = self.bounded("delete", cache.delete(&self.cache_key)).await {
                self.metrics.record_shared_cache_error();
                warn!(error = %err, "failed to evict bearer token from shared cache");
            }
        }
        debug!("bearer token invalidated");
    }

    /// Invalidate and fetch a new token immediately
    pub async fn refresh_token<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant>>,
    {
        self.invalidate_token().await;
        self.fetch_and_store(fetch).await
    }

    async fn fetch_and_store<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenGrant>>,
    {
        self.metrics.record_token_fetch();
        let grant = fetch().await.map_err(|err| {
            let mut mapped = CatalinkError::authentication_failed(format!(
                "failed to obtain bearer token: {}",
                err.message
            ))
            .with_retryable(true)
            .with_context("cause", err.kind.as_str());
            if let Some(code) = err.vendor_code {
                mapped = mapped.with_vendor_code(code);
            }
            mapped
        })?;

        let now = Utc::now();
        let cached = CachedToken::from_grant(grant, now);
        info!(expires_at = %cached.expires_at, "fetched bearer token");

        self.write_shared(&cached, now).await;
        let token = cached.token.clone();
        *self.token.write() = Some(cached);
        Ok(token)
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.cache_timeout, call).await.unwrap_or_else(|_| {
            Err(CatalinkError::timeout(format!(
                "shared cache {operation} timed out after {}ms",
                self.cache_timeout.as_millis()
            )))
        })
    }

    async fn read_shared(&self) -> Option<CachedToken> {
        let cache = self.shared_cache.as_ref()?;
        let raw = match self.bounded("get", cache.get(&self.cache_key)).await {
            Ok(raw) => raw?,
            Err(err) => {
                self.metrics.record_shared_cache_error();
                warn!(error = %err, "shared token cache unavailable, falling back to in-process token");
                return None;
            }
        };
        match serde_json::from_str::<CachedToken>(&raw) {
            Ok(cached) if cached.is_fresh(Utc::now(), self.refresh_threshold) => Some(cached),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "ignoring malformed token in shared cache");
                None
            }
        }
    }

    async fn write_shared(&self, cached: &CachedToken, now: DateTime<Utc>) {
        let Some(cache) = &self.shared_cache else {
            return;
        };
        let value = match serde_json::to_string(cached) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to encode bearer token for shared cache");
                return;
            }
        };
        let ttl = cached.remaining(now);
        if let Err(err) = self.bounded("set", cache.set(&self.cache_key, &value, ttl)).await {
            self.metrics.record_shared_cache_error();
            warn!(error = %err, "failed to store bearer token in shared cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use catalink_domain::{Environment, ErrorKind};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct MapCache {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SharedCache for MapCache {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
            self.entries.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.entries.lock().remove(key);
            Ok(())
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl SharedCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(CatalinkError::network("connection refused"))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(CatalinkError::network("connection refused"))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(CatalinkError::network("connection refused"))
        }
    }

    /// Cache whose calls never complete
    struct StalledCache;

    #[async_trait]
    impl SharedCache for StalledCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            std::future::pending().await
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            std::future::pending().await
        }
    }

    fn manager() -> AuthManager {
        AuthManager::new(
            Credentials::new("cid", "secret", Environment::Sandbox),
            &AuthSettings::default(),
        )
    }

    fn grant(token: &str, secs: u64) -> Result<TokenGrant> {
        Ok(TokenGrant { access_token: token.to_string(), expires_in: Duration::from_secs(secs) })
    }

    #[tokio::test]
    async fn test_token_is_cached_until_near_expiry() {
        let auth = manager();
        let fetches = AtomicU32::new(0);
        let counter = &fetches;

        for _ in 0..3 {
            let token = auth
                .get_token(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    grant("tok-1", 3_600)
                })
                .await
                .unwrap();
            assert_eq!(token, "tok-1");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    /// Validates the refresh threshold.
    ///
    /// Assertions:
    /// - A token expiring within the 5-minute window is never returned.
    /// - Each call therefore fetches again.
    #[tokio::test]
    async fn test_near_expiry_token_is_refetched() {
        let auth = manager();
        let fetches = AtomicU32::new(0);
        let counter = &fetches;

        for _ in 0..2 {
            auth.get_token(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                grant("short", 120)
            })
            .await
            .unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert!(auth.current_token().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retryable_auth_error() {
        let auth = manager();
        let err = auth
            .get_token(|| async {
                Err(CatalinkError::api("token endpoint down").with_vendor_code("E500"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::AuthenticationFailed);
        assert!(err.retryable);
        assert_eq!(err.vendor_code.as_deref(), Some("E500"));
    }

    #[tokio::test]
    async fn test_shared_cache_is_consulted_and_populated() {
        let cache = Arc::new(MapCache::default());
        let first = manager().with_shared_cache(cache.clone());
        first.get_token(|| async { grant("shared-tok", 3_600) }).await.unwrap();
        assert!(cache.entries.lock().contains_key("catalink:token:sandbox:cid"));

        // A second client instance picks the token up without fetching.
        let second = manager().with_shared_cache(cache.clone());
        let token = second.get_token(|| async { grant("fetched", 3_600) }).await.unwrap();
        assert_eq!(token, "shared-tok");

        second.invalidate_token().await;
        assert!(cache.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_shared_cache_is_not_fatal() {
        let metrics = Arc::new(ClientMetrics::new());
        let auth = manager().with_shared_cache(Arc::new(BrokenCache)).with_metrics(metrics.clone());

        let token = auth.get_token(|| async { grant("local", 3_600) }).await.unwrap();
        assert_eq!(token, "local");
        assert_eq!(auth.get_token(|| async { grant("other", 3_600) }).await.unwrap(), "local");

        // One failed read, one failed write.
        assert_eq!(metrics.snapshot().shared_cache_errors, 2);
    }

    /// Validates that a cache which never answers cannot block auth.
    ///
    /// Assertions:
    /// - The token is fetched once the read deadline passes.
    /// - The stalled read, write and eviction each count as a cache error.
    #[tokio::test]
    async fn test_stalled_shared_cache_times_out_to_fetch() {
        let metrics = Arc::new(ClientMetrics::new());
        let auth = manager()
            .with_shared_cache(Arc::new(StalledCache))
            .with_cache_timeout(Duration::from_millis(20))
            .with_metrics(metrics.clone());

        let token = tokio::time::timeout(
            Duration::from_secs(2),
            auth.get_token(|| async { grant("fetched", 3_600) }),
        )
        .await
        .expect("token lookup must not hang")
        .unwrap();
        assert_eq!(token, "fetched");

        tokio::time::timeout(Duration::from_secs(2), auth.invalidate_token())
            .await
            .expect("eviction must not hang");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.shared_cache_errors, 3);
        assert_eq!(snapshot.token_fetches, 1);
    }

    /// Validates that the configured prefix appears exactly once in the
    /// stored key.
    #[tokio::test]
    async fn test_cache_key_carries_prefix_once() {
        let settings =
            AuthSettings { token_cache_prefix: "shop-eu".to_string(), ..AuthSettings::default() };
        let cache = Arc::new(MapCache::default());
        let auth = AuthManager::new(Credentials::new("cid", "secret", Environment::Production), &settings)
            .with_shared_cache(cache.clone());

        auth.get_token(|| async { grant("tok", 3_600) }).await.unwrap();

        assert_eq!(auth.cache_key(), "shop-eu:production:cid");
        let keys: Vec<String> = cache.entries.lock().keys().cloned().collect();
        assert_eq!(keys, vec!["shop-eu:production:cid".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let auth = manager();
        auth.get_token(|| async { grant("old", 3_600) }).await.unwrap();
        let token = auth.refresh_token(|| async { grant("new", 3_600) }).await.unwrap();
        assert_eq!(token, "new");
        assert_eq!(auth.current_token().map(|t| t.token), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_headers_per_scheme() {
        let auth = manager();
        let none = auth.auth_headers(AuthScheme::None, || async { grant("x", 3_600) }).await.unwrap();
        assert!(none.is_empty());

        let signed = auth.auth_headers(AuthScheme::Signed, || async { grant("x", 3_600) }).await.unwrap();
        assert_eq!(signed, vec![("Authorization".to_string(), "cid, secret".to_string())]);

        let bearer = auth.auth_headers(AuthScheme::Bearer, || async { grant("x", 3_600) }).await.unwrap();
        assert_eq!(bearer[0].1, "Bearer x");
    }
}
