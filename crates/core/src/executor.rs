//! Request executor
//!
//! Every vendor call funnels through [`RequestExecutor::execute_request`]:
//!
//! ```text
//! rate limiter admission (once per logical call)
//!   └─ retry strategy
//!        └─ endpoint circuit breaker
//!             └─ auth headers + transport call + error mapping
//! ```
//!
//! Client-side failures (not found, invalid request, validation, ...) are
//! returned through the breaker without counting against it; only outage
//! kinds can open a circuit.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use catalink_common::observability::ClientMetrics;
use catalink_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitStats, RateLimitError,
    RateLimitSnapshot, RateLimiter, ResilienceError, TokenBucketConfig,
};
use catalink_domain::constants::IDEMPOTENCY_KEY_HEADER;
use catalink_domain::{CatalinkError, ClientConfig, Credentials, ErrorKind, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::api::endpoint::{AuthScheme, Endpoint};
use crate::api::ports::{ApiRequest, ApiResponse, Transport};
use crate::auth::ports::SharedCache;
use crate::auth::{AuthManager, TokenGrant};
use crate::errors::ErrorMapper;
use crate::retry::{RetryOptions, RetryPolicyTable, RetryStrategy};

/// Kinds that say something about the vendor's health
///
/// Throttling (`RateLimited`, `QuotaExceeded`) is a healthy vendor pushing
/// back and never opens a circuit.
const fn counts_as_outage(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::ApiError | ErrorKind::Timeout | ErrorKind::NetworkError)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds
    expires_in: u64,
}

/// Result of an unauthenticated reachability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub reachable: bool,
    /// `None` when no HTTP response was received
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: Option<String>,
}

pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    auth: Arc<AuthManager>,
    limiter: RateLimiter<Endpoint>,
    breakers: CircuitBreakerRegistry<Endpoint>,
    retry: RetryStrategy,
    mapper: ErrorMapper,
    metrics: Arc<ClientMetrics>,
    config: ClientConfig,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("auth", &self.auth)
            .field("rate_limit_enabled", &self.limiter.is_enabled())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn builder(transport: Arc<dyn Transport>, credentials: Credentials) -> RequestExecutorBuilder {
        RequestExecutorBuilder::new(transport, credentials)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ClientMetrics> {
        &self.metrics
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn retry_strategy(&self) -> &RetryStrategy {
        &self.retry
    }

    /// Per-kind retry rules; changes apply to subsequent calls
    pub fn policy_table(&self) -> &Arc<RetryPolicyTable> {
        self.retry.table()
    }

    pub fn breaker(&self, endpoint: &Endpoint) -> Arc<CircuitBreaker> {
        self.breakers.get(endpoint)
    }

    pub fn is_circuit_open(&self, endpoint: &Endpoint) -> bool {
        self.breakers.is_open(endpoint)
    }

    /// Stats of every breaker used so far
    pub fn breaker_stats(&self) -> Vec<(Endpoint, CircuitStats)> {
        self.breakers.stats()
    }

    pub fn reset_breaker(&self, endpoint: &Endpoint) {
        self.breakers.reset(endpoint);
    }

    pub fn reset_all_breakers(&self) {
        self.breakers.reset_all();
    }

    pub fn rate_limit_snapshot(&self, endpoint: &Endpoint) -> RateLimitSnapshot {
        self.limiter.snapshot(endpoint)
    }

    /// Time until `endpoint` would be admitted
    pub fn rate_limit_wait(&self, endpoint: &Endpoint) -> Duration {
        self.limiter.wait_time(endpoint)
    }

    /// Run `call` under admission control, retry and the endpoint breaker
    ///
    /// `call` is invoked once per attempt. Errors it returns must already be
    /// classified.
    ///
    /// # Errors
    ///
    /// - `QuotaExceeded` when admission fails after waiting
    /// - `CircuitOpen` when the endpoint's breaker rejects the call
    /// - otherwise the last attempt's error
    pub async fn execute_request<F, Fut, T>(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        idempotent: bool,
        call: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.metrics.record_request_started();
        let result = self.admit_and_run(endpoint, operation, idempotent, &call).await;
        match &result {
            Ok(_) => self.metrics.record_request_succeeded(),
            Err(err) => {
                self.metrics.record_request_failed();
                debug!(operation, kind = %err.kind, "request failed");
            }
        }
        result
    }

    async fn admit_and_run<F, Fut, T>(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        idempotent: bool,
        call: &F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit(endpoint, operation).await?;

        let breaker = self.breakers.get(endpoint);
        let breaker = &breaker;
        let probe = move || breaker.is_open();
        let options = RetryOptions { idempotent, circuit_open: Some(&probe) };

        self.retry
            .execute_with(operation, options, move || async move {
                self.guarded(breaker, operation, call).await
            })
            .await
    }

    async fn admit(&self, endpoint: &Endpoint, operation: &str) -> Result<()> {
        if self.limiter.check_limit(endpoint) {
            return Ok(());
        }
        self.metrics.record_rate_limit_wait();
        self.limiter.wait_if_needed(endpoint).await.map_err(|err| {
            self.metrics.record_quota_rejection();
            let RateLimitError::QuotaExceeded { retry_after, .. } = err;
            warn!(operation, endpoint = %endpoint, ?retry_after, "rate limit quota exceeded");
            CatalinkError::quota_exceeded(
                format!("rate limit exceeded for {endpoint}"),
                retry_after,
            )
            .with_context("operation", operation)
        })
    }

    async fn guarded<F, Fut, T>(
        &self,
        breaker: &CircuitBreaker,
        operation: &str,
        call: &F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = breaker
            .execute(move || async move {
                match call().await {
                    Err(err) if !counts_as_outage(err.kind) => Ok(Err(err)),
                    other => other.map(Ok),
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(ResilienceError::OperationFailed { source }) => Err(source),
            Err(ResilienceError::CircuitOpen { retry_after }) => {
                self.metrics.record_circuit_rejection();
                Err(CatalinkError::circuit_open(operation, retry_after))
            }
        }
    }

    /// Send `request` to `endpoint` with the full resilience stack
    ///
    /// With an `idempotency_key`, the key is sent as a header on every
    /// attempt and the call is retried like an idempotent read.
    #[instrument(skip(self, endpoint, request), fields(endpoint = %endpoint))]
    pub async fn send(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        request: ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<ApiResponse> {
        let idempotent = endpoint.is_idempotent() || idempotency_key.is_some();
        let request = &request;
        self.execute_request(endpoint, operation, idempotent, move || async move {
            self.attempt(endpoint, operation, request.clone(), idempotency_key).await
        })
        .await
    }

    /// [`send`](Self::send) and decode the JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        request: ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<T> {
        let response = self.send(endpoint, operation, request, idempotency_key).await?;
        response.json::<T>().map_err(|err| {
            CatalinkError::from(err).with_context("operation", operation)
        })
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        mut request: ApiRequest,
        idempotency_key: Option<&str>,
    ) -> Result<ApiResponse> {
        let scheme = endpoint.auth_scheme();
        let headers = self.auth.auth_headers(scheme, move || self.fetch_token()).await?;
        request.headers.extend(headers);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, key);
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|err| self.mapper.map_transport(&err, operation))?;
        if response.is_success() {
            return Ok(response);
        }

        let err = self.mapper.map_response(&response, operation, scheme);
        if err.kind == ErrorKind::TokenExpired {
            self.auth.invalidate_token().await;
        }
        Err(err)
    }

    /// Signed call to the token endpoint, outside the retry path
    async fn fetch_token(&self) -> Result<TokenGrant> {
        let endpoint = Endpoint::FetchToken;
        let operation = endpoint.as_str();
        let mut request = ApiRequest::post(endpoint.path(None))
            .json(&serde_json::json!({ "grant_type": "client_credentials" }))?;
        request.headers.extend(self.auth.signed_headers());

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|err| self.mapper.map_transport(&err, operation))?;
        if !response.is_success() {
            return Err(self.mapper.map_response(&response, operation, AuthScheme::Signed));
        }

        let body: TokenResponse = response.json()?;
        Ok(TokenGrant {
            access_token: body.access_token,
            expires_in: Duration::from_secs(body.expires_in),
        })
    }

    /// Unauthenticated probe, no admission control or retry
    pub async fn health_check(&self) -> HealthReport {
        let endpoint = Endpoint::HealthCheck;
        let started = Instant::now();
        match self.transport.send(ApiRequest::get(endpoint.path(None))).await {
            Ok(response) => HealthReport {
                reachable: response.is_success(),
                status: Some(response.status),
                latency: started.elapsed(),
                error: None,
            },
            Err(err) => HealthReport {
                reachable: false,
                status: None,
                latency: started.elapsed(),
                error: Some(err.to_string()),
            },
        }
    }
}

/// Builder for [`RequestExecutor`]
pub struct RequestExecutorBuilder {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    config: ClientConfig,
    shared_cache: Option<Arc<dyn SharedCache>>,
    metrics: Option<Arc<ClientMetrics>>,
    mapper: ErrorMapper,
}

impl RequestExecutorBuilder {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
            config: ClientConfig::default(),
            shared_cache: None,
            metrics: None,
            mapper: ErrorMapper::default(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    pub fn metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn error_mapper(mut self, mapper: ErrorMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// # Errors
    ///
    /// `ValidationError` if the configuration is invalid.
    pub fn build(self) -> Result<RequestExecutor> {
        let config = self.config;
        config.validate()?;
        let metrics = self.metrics.unwrap_or_default();

        let mut auth = AuthManager::new(self.credentials, &config.auth)
            .with_cache_timeout(config.cache_timeout())
            .with_metrics(metrics.clone());
        if let Some(cache) = self.shared_cache {
            auth = auth.with_shared_cache(cache);
        }

        let limiter = if config.rate_limit.enabled {
            let global = TokenBucketConfig::new(
                config.rate_limit.global.burst,
                config.rate_limit.global.requests_per_second,
            );
            let rules = config
                .rate_limit
                .per_endpoint
                .iter()
                .map(|(name, rule)| {
                    (Endpoint::from_name(name), TokenBucketConfig::new(rule.burst, rule.requests_per_second))
                })
                .collect();
            RateLimiter::new(global, rules)
                .map_err(invalid_config)?
                .with_max_wait(config.rate_limit.max_wait())
        } else {
            RateLimiter::disabled()
        };

        let settings = &config.circuit_breaker;
        let breaker_config = CircuitBreakerConfig::builder()
            .enabled(settings.enabled)
            .failure_threshold(settings.failure_threshold)
            .failure_window(settings.failure_window())
            .reset_timeout(settings.reset_timeout())
            .half_open_success_threshold(settings.half_open_success_threshold)
            .half_open_max_calls(settings.half_open_max_calls)
            .build()
            .map_err(invalid_config)?;
        let breakers = CircuitBreakerRegistry::new(breaker_config).map_err(invalid_config)?;

        let retry = RetryStrategy::new(&config.retry).with_metrics(metrics.clone());

        Ok(RequestExecutor {
            transport: self.transport,
            auth: Arc::new(auth),
            limiter,
            breakers,
            retry,
            mapper: self.mapper,
            metrics,
            config,
        })
    }
}

fn invalid_config(err: impl std::fmt::Display) -> CatalinkError {
    CatalinkError::validation(format!("invalid configuration: {err}"))
}
