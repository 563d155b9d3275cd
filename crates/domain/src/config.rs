//! Client configuration structures
//!
//! Every section derives `Default` and is `#[serde(default)]`, so a config
//! file only needs to name the values it overrides. Durations are stored as
//! integer milliseconds (seconds for the auth/webhook sections) and exposed
//! through `Duration` accessors.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_PAGE_SIZE, IDEMPOTENCY_RETENTION_SECS, MAX_PAGE_SIZE, TOKEN_CACHE_PREFIX,
    TOKEN_REFRESH_THRESHOLD_SECS, WEBHOOK_MAX_SKEW_SECS,
};
use crate::errors::{CatalinkError, Result};
use crate::types::Environment;

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Overrides the environment's default API base URL
    pub base_url: Option<String>,
    pub request_timeout_ms: u64,
    pub rate_limit: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub batch: BatchSettings,
    pub auth: AuthSettings,
    pub webhook: WebhookSettings,
    /// Connection string of the external shared token cache (Redis)
    pub cache_url: Option<String>,
    /// Per-operation deadline for the shared token cache
    pub cache_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: 30_000,
            rate_limit: RateLimitSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            retry: RetrySettings::default(),
            batch: BatchSettings::default(),
            auth: AuthSettings::default(),
            webhook: WebhookSettings::default(),
            cache_url: None,
            cache_timeout_ms: 500,
        }
    }
}

impl ClientConfig {
    pub fn base_url_for(&self, environment: Environment) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| environment.default_base_url().to_string())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms must be greater than 0"));
        }
        if self.cache_timeout_ms == 0 {
            return Err(invalid("cache_timeout_ms must be greater than 0"));
        }
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        self.batch.validate()?;
        Ok(())
    }
}

fn invalid(message: &str) -> CatalinkError {
    CatalinkError::validation(format!("invalid configuration: {message}"))
}

/// Token-bucket parameters for one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Sustained refill rate
    pub requests_per_second: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl RateLimitRule {
    pub const fn new(requests_per_second: f64, burst: u32) -> Self {
        Self { requests_per_second, burst }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.requests_per_second.is_finite() && self.requests_per_second > 0.0) {
            return Err(invalid(&format!("{name}: requests_per_second must be positive")));
        }
        if self.burst == 0 {
            return Err(invalid(&format!("{name}: burst must be greater than 0")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub global: RateLimitRule,
    /// Keyed by endpoint wire name (e.g. `create_order`)
    pub per_endpoint: BTreeMap<String, RateLimitRule>,
    /// Longest a call waits for a token before failing with quota exceeded
    pub max_wait_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            global: RateLimitRule::new(10.0, 20),
            per_endpoint: BTreeMap::new(),
            max_wait_ms: 30_000,
        }
    }
}

impl RateLimitSettings {
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    fn validate(&self) -> Result<()> {
        self.global.validate("rate_limit.global")?;
        for (endpoint, rule) in &self.per_endpoint {
            rule.validate(&format!("rate_limit.per_endpoint.{endpoint}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub failure_window_ms: u64,
    pub reset_timeout_ms: u64,
    pub half_open_success_threshold: u32,
    /// Trial calls allowed in flight while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            failure_window_ms: 60_000,
            reset_timeout_ms: 30_000,
            half_open_success_threshold: 1,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerSettings {
    pub const fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold must be greater than 0"));
        }
        if self.half_open_success_threshold == 0 {
            return Err(invalid(
                "circuit_breaker.half_open_success_threshold must be greater than 0",
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(invalid("circuit_breaker.half_open_max_calls must be greater than 0"));
        }
        if self.failure_window_ms == 0 {
            return Err(invalid("circuit_breaker.failure_window_ms must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Total time a call may spend retrying; unlimited when absent
    pub retry_budget_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            retry_budget_ms: None,
        }
    }
}

impl RetrySettings {
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn retry_budget(&self) -> Option<Duration> {
        self.retry_budget_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(invalid("retry.backoff_multiplier must be >= 1.0"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(invalid("retry.initial_delay_ms must not exceed retry.max_delay_ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub chunk_size: usize,
    pub max_concurrency: usize,
    /// Page size used by the whole-catalog fetcher
    pub page_size: u32,
    /// Pause between successful page calls
    pub page_delay_ms: u64,
    /// Pause after a failed page call
    pub page_failure_backoff_ms: u64,
    /// Hard stop on the number of pages requested
    pub max_pages: Option<u32>,
    /// Give up after this many failed pages in a row
    pub max_consecutive_page_failures: u32,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            max_concurrency: 5,
            page_size: DEFAULT_PAGE_SIZE,
            page_delay_ms: 100,
            page_failure_backoff_ms: 2_000,
            max_pages: None,
            max_consecutive_page_failures: 3,
        }
    }
}

impl BatchSettings {
    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub const fn page_failure_backoff(&self) -> Duration {
        Duration::from_millis(self.page_failure_backoff_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(invalid("batch.chunk_size must be greater than 0"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("batch.max_concurrency must be greater than 0"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid(&format!("batch.page_size must be between 1 and {MAX_PAGE_SIZE}")));
        }
        if self.max_consecutive_page_failures == 0 {
            return Err(invalid("batch.max_consecutive_page_failures must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Refresh the bearer token when it expires within this window
    pub token_refresh_threshold_secs: u64,
    pub token_cache_prefix: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_refresh_threshold_secs: TOKEN_REFRESH_THRESHOLD_SECS,
            token_cache_prefix: TOKEN_CACHE_PREFIX.to_string(),
        }
    }
}

impl AuthSettings {
    pub const fn token_refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.token_refresh_threshold_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub secret: Option<String>,
    pub max_skew_secs: i64,
    pub retention_secs: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            max_skew_secs: WEBHOOK_MAX_SKEW_SECS,
            retention_secs: IDEMPOTENCY_RETENTION_SECS,
        }
    }
}

impl WebhookSettings {
    pub const fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}
