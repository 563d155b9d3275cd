//! Token-bucket admission control
//!
//! A [`RateLimiter`] combines one global [`TokenBucket`] with optional
//! per-key buckets that are created the first time a key is used. Refill is
//! computed lazily from elapsed time on every access.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::{Clock, ConfigError, ConfigResult, SystemClock};

/// Default bound on how long [`RateLimiter::wait_if_needed`] keeps waiting
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Rate limiting failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// No token could be won within the limiter's maximum wait
    #[error("Quota exceeded for {key}, next token in {retry_after:?}")]
    QuotaExceeded { key: String, retry_after: Duration },
}

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketConfig {
    /// Maximum tokens held (burst size)
    pub capacity: u32,
    /// Tokens added per second
    pub refill_per_second: f64,
}

impl TokenBucketConfig {
    pub const fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self { capacity, refill_per_second }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity must be greater than 0"));
        }
        if !(self.refill_per_second.is_finite() && self.refill_per_second > 0.0) {
            return Err(ConfigError::invalid("refill_per_second must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Continuously refilling bucket of permits
///
/// The token count is kept in `[0, capacity]`.
pub struct TokenBucket<C: Clock = SystemClock> {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
    clock: C,
}

impl<C: Clock> fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_per_second", &self.refill_per_second)
            .field("tokens", &self.state.lock().tokens)
            .finish()
    }
}

impl TokenBucket<SystemClock> {
    pub fn new(config: TokenBucketConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a full bucket driven by `clock`
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        let capacity = f64::from(config.capacity);
        Ok(Self {
            capacity,
            refill_per_second: config.refill_per_second,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: clock.now() }),
            clock,
        })
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if !elapsed.is_zero() {
            state.tokens =
                (state.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Give back a token taken by [`try_acquire`](Self::try_acquire)
    pub fn refund(&self) {
        let mut state = self.state.lock();
        state.tokens = (state.tokens + 1.0).min(self.capacity);
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Time until one whole token is available
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_second)
        }
    }

    /// Refill the bucket to capacity
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.capacity;
        state.last_refill = self.clock.now();
    }
}

/// Token counts seen by one key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSnapshot {
    pub global_tokens: f64,
    /// `None` when the key has no dedicated bucket
    pub key_tokens: Option<f64>,
}

/// Global plus per-key token buckets
///
/// Keys without a configured rule are limited by the global bucket alone.
pub struct RateLimiter<K, C = SystemClock>
where
    K: Eq + Hash + Clone + fmt::Display,
    C: Clock + Clone,
{
    enabled: bool,
    global: TokenBucket<C>,
    rules: HashMap<K, TokenBucketConfig>,
    buckets: DashMap<K, Arc<TokenBucket<C>>>,
    max_wait: Duration,
    clock: C,
}

impl<K> RateLimiter<K, SystemClock>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    pub fn new(global: TokenBucketConfig, rules: HashMap<K, TokenBucketConfig>) -> ConfigResult<Self> {
        Self::with_clock(global, rules, SystemClock)
    }

    /// A limiter that admits everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            global: TokenBucket {
                capacity: 1.0,
                refill_per_second: 1.0,
                state: Mutex::new(BucketState { tokens: 1.0, last_refill: Instant::now() }),
                clock: SystemClock,
            },
            rules: HashMap::new(),
            buckets: DashMap::new(),
            max_wait: DEFAULT_MAX_WAIT,
            clock: SystemClock,
        }
    }
}

impl<K, C> RateLimiter<K, C>
where
    K: Eq + Hash + Clone + fmt::Display,
    C: Clock + Clone,
{
    pub fn with_clock(
        global: TokenBucketConfig,
        rules: HashMap<K, TokenBucketConfig>,
        clock: C,
    ) -> ConfigResult<Self> {
        for (key, rule) in &rules {
            rule.validate().map_err(|err| ConfigError::invalid(format!("{key}: {err}")))?;
        }
        Ok(Self {
            enabled: true,
            global: TokenBucket::with_clock(global, clock.clone())?,
            rules,
            buckets: DashMap::new(),
            max_wait: DEFAULT_MAX_WAIT,
            clock,
        })
    }

    /// Bound the total time [`wait_if_needed`](Self::wait_if_needed) sleeps
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn bucket_for(&self, key: &K) -> Option<Arc<TokenBucket<C>>> {
        if let Some(bucket) = self.buckets.get(key) {
            return Some(Arc::clone(bucket.value()));
        }
        let rule = *self.rules.get(key)?;
        let entry = self.buckets.entry(key.clone()).or_insert_with(|| {
            let capacity = f64::from(rule.capacity);
            Arc::new(TokenBucket {
                capacity,
                refill_per_second: rule.refill_per_second,
                state: Mutex::new(BucketState { tokens: capacity, last_refill: self.clock.now() }),
                clock: self.clock.clone(),
            })
        });
        Some(Arc::clone(entry.value()))
    }

    /// Try to admit one call for `key`
    ///
    /// Consumes from the global bucket and the key's bucket. If either is
    /// empty, any token already taken is refunded and `false` is returned.
    pub fn check_limit(&self, key: &K) -> bool {
        if !self.enabled {
            return true;
        }
        if !self.global.try_acquire() {
            return false;
        }
        if let Some(bucket) = self.bucket_for(key) {
            if !bucket.try_acquire() {
                self.global.refund();
                return false;
            }
        }
        true
    }

    /// Longest wait among the buckets `key` draws from
    pub fn wait_time(&self, key: &K) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let global = self.global.time_until_available();
        self.bucket_for(key).map_or(global, |bucket| global.max(bucket.time_until_available()))
    }

    /// Admit one call for `key`, sleeping until a token is won
    ///
    /// Concurrent waiters race for each refilled token; a caller that loses
    /// sleeps again for the next one. Tokens are never borrowed ahead of the
    /// refill.
    ///
    /// # Errors
    ///
    /// Returns `QuotaExceeded` when winning a token would take longer than the
    /// limiter's maximum wait.
    pub async fn wait_if_needed(&self, key: &K) -> Result<(), RateLimitError> {
        let mut waited = Duration::ZERO;
        loop {
            if self.check_limit(key) {
                return Ok(());
            }

            let wait = self.wait_time(key);
            if waited.saturating_add(wait) > self.max_wait {
                return Err(RateLimitError::QuotaExceeded { key: key.to_string(), retry_after: wait });
            }
            debug!(key = %key, wait_ms = wait.as_millis() as u64, "rate limited, waiting for token");
            tokio::time::sleep(wait).await;
            waited = waited.saturating_add(wait);
        }
    }

    pub fn snapshot(&self, key: &K) -> RateLimitSnapshot {
        RateLimitSnapshot {
            global_tokens: self.global.available_tokens(),
            key_tokens: self.bucket_for(key).map(|bucket| bucket.available_tokens()),
        }
    }
}
