//! Circuit breaker with a rolling failure window
//!
//! The breaker has no background timer. The Open to HalfOpen transition is
//! computed lazily the next time anyone looks at the state, so an idle
//! breaker costs nothing.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Source of time for breakers and buckets
///
/// Production code uses [`SystemClock`]; tests drive a [`MockClock`] so state
/// transitions can be checked without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic now
    fn now(&self) -> Instant;

    /// Wall clock now
    fn system_time(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Manually advanced clock for deterministic tests
///
/// Clones share the same elapsed time, so a test can hand one clone to a
/// breaker and keep another to move time forward.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }
}

//==============================================================================
// Error Types
//==============================================================================

/// Invalid resilience configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Outcome of a breaker-guarded call
///
/// Generic over the wrapped operation's error `E`, which is preserved
/// unchanged.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call without running it
    #[error("Circuit breaker is open, next trial in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// The wrapped operation ran and failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The wrapped operation's error, if the operation ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            Self::CircuitOpen { .. } => None,
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected
    Open,
    /// Cooldown elapsed; trial calls decide whether to close or reopen
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// When false the breaker never rejects and records nothing
    pub enabled: bool,
    /// Failures inside `failure_window` that open the circuit
    pub failure_threshold: u32,
    /// Trailing window over which failures are counted
    pub failure_window: Duration,
    /// Time spent Open before a trial call is admitted
    pub reset_timeout: Duration,
    /// Successes in HalfOpen needed to close the circuit
    pub half_open_success_threshold: u32,
    /// Trial calls allowed in flight at once while HalfOpen
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 1,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold must be greater than 0"));
        }
        if self.half_open_success_threshold == 0 {
            return Err(ConfigError::invalid(
                "half_open_success_threshold must be greater than 0",
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::invalid("half_open_max_calls must be greater than 0"));
        }
        if self.failure_window.is_zero() {
            return Err(ConfigError::invalid("failure_window must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn failure_window(mut self, window: Duration) -> Self {
        self.config.failure_window = window;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.config.half_open_success_threshold = threshold;
        self
    }

    pub fn half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.config.half_open_max_calls = max_calls;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitStats {
    pub state: CircuitState,
    /// Failures currently inside the rolling window
    pub failures: u32,
    /// Successes since the last state transition
    pub successes: u32,
    pub last_failure: Option<Instant>,
    pub last_success: Option<Instant>,
    pub state_changed_at: Instant,
    /// Calls rejected while Open or while the HalfOpen trial slots were taken
    pub rejected_calls: u64,
    /// Trial calls currently running in HalfOpen
    pub trial_calls: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    successes: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    state_changed_at: Instant,
    rejected_calls: u64,
    trial_calls: u32,
}

impl Inner {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            successes: 0,
            last_failure: None,
            last_success: None,
            state_changed_at: now,
            rejected_calls: 0,
            trial_calls: 0,
        }
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.state_changed_at = now;
        self.successes = 0;
        self.trial_calls = 0;
        if to == CircuitState::Closed {
            self.failures.clear();
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Failure-aware gate in front of one dependency
///
/// All state lives behind a single mutex that is never held across an
/// `.await`.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker driven by `clock` (useful for testing)
    pub fn with_clock(
        name: impl Into<Arc<str>>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let now = clock.now();
        Ok(Self { name: name.into(), config, inner: Mutex::new(Inner::new(now)), clock })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Apply the lazy Open to HalfOpen transition
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state == CircuitState::Open
            && now.saturating_duration_since(inner.state_changed_at) >= self.config.reset_timeout
        {
            inner.transition(CircuitState::HalfOpen, now);
            debug!(breaker = %self.name, "circuit half-open, admitting trial calls");
        }
    }

    /// Current state, applying the lazy Open to HalfOpen transition
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        inner.state
    }

    pub fn is_open(&self) -> bool {
        self.config.enabled && self.state() == CircuitState::Open
    }

    /// Admission check
    ///
    /// Returns the remaining cooldown when the circuit is Open. While
    /// HalfOpen each admitted call holds one of `half_open_max_calls` trial
    /// slots until its outcome is recorded; callers beyond that are rejected
    /// with a full `reset_timeout` as the suggested wait.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.admit().map(|_| ())
    }

    /// Admission check that reports whether a trial slot was taken
    fn admit(&self) -> Result<bool, Duration> {
        if !self.config.enabled {
            return Ok(false);
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                inner.rejected_calls += 1;
                let open_for = now.saturating_duration_since(inner.state_changed_at);
                Err(self.config.reset_timeout.saturating_sub(open_for))
            }
            CircuitState::HalfOpen if inner.trial_calls >= self.config.half_open_max_calls => {
                inner.rejected_calls += 1;
                Err(self.config.reset_timeout)
            }
            CircuitState::HalfOpen => {
                inner.trial_calls += 1;
                Ok(true)
            }
        }
    }

    /// Free a trial slot whose call never reported an outcome
    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_calls = inner.trial_calls.saturating_sub(1);
        }
    }

    pub fn record_success(&self) {
        if !self.config.enabled {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        inner.last_success = Some(now);
        inner.successes = inner.successes.saturating_add(1);

        if inner.state == CircuitState::HalfOpen {
            inner.trial_calls = inner.trial_calls.saturating_sub(1);
            if inner.successes >= self.config.half_open_success_threshold {
                inner.transition(CircuitState::Closed, now);
                info!(breaker = %self.name, "circuit closed after successful trial calls");
            }
        }
    }

    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                inner.prune(now, self.config.failure_window);
                let failures = u32::try_from(inner.failures.len()).unwrap_or(u32::MAX);
                if failures >= self.config.failure_threshold {
                    inner.transition(CircuitState::Open, now);
                    warn!(breaker = %self.name, failures, "circuit opened");
                }
            }
            CircuitState::HalfOpen => {
                inner.failures.push_back(now);
                inner.transition(CircuitState::Open, now);
                warn!(breaker = %self.name, "trial call failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }

    /// Run `operation` behind the breaker
    ///
    /// Rejected calls never invoke `operation`. The operation's own error is
    /// returned unchanged inside `OperationFailed`.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.config.enabled {
            return operation().await.map_err(|source| ResilienceError::OperationFailed { source });
        }

        let trial = match self.admit() {
            Ok(trial) => trial,
            Err(retry_after) => {
                debug!(breaker = %self.name, ?retry_after, "circuit open, rejecting call");
                return Err(ResilienceError::CircuitOpen { retry_after });
            }
        };

        let mut slot = TrialSlot { breaker: self, armed: trial };
        let outcome = operation().await;
        slot.armed = false;

        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                self.record_failure();
                Err(ResilienceError::OperationFailed { source })
            }
        }
    }

    pub fn stats(&self) -> CircuitStats {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, now);
        inner.prune(now, self.config.failure_window);
        CircuitStats {
            state: inner.state,
            failures: u32::try_from(inner.failures.len()).unwrap_or(u32::MAX),
            successes: inner.successes,
            last_failure: inner.last_failure,
            last_success: inner.last_success,
            state_changed_at: inner.state_changed_at,
            rejected_calls: inner.rejected_calls,
            trial_calls: inner.trial_calls,
        }
    }

    /// Force the breaker back to a fresh Closed state
    pub fn reset(&self) {
        let now = self.clock.now();
        *self.inner.lock() = Inner::new(now);
        info!(breaker = %self.name, "circuit reset");
    }
}

/// Hands a HalfOpen trial slot back if the guarded future is dropped
/// before its outcome is recorded
struct TrialSlot<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    armed: bool,
}

impl<C: Clock> Drop for TrialSlot<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}

//==============================================================================
// Registry
//==============================================================================

/// Lazily created breakers, one per key
///
/// Every breaker shares the registry's configuration and clock.
pub struct CircuitBreakerRegistry<K, C = SystemClock>
where
    K: Eq + Hash + Clone + fmt::Display,
    C: Clock + Clone,
{
    config: CircuitBreakerConfig,
    clock: C,
    breakers: DashMap<K, Arc<CircuitBreaker<C>>>,
}

impl<K> CircuitBreakerRegistry<K, SystemClock>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, C> CircuitBreakerRegistry<K, C>
where
    K: Eq + Hash + Clone + fmt::Display,
    C: Clock + Clone,
{
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, clock, breakers: DashMap::new() })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `key`, created on first use
    pub fn get(&self, key: &K) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(existing.value());
        }
        let entry = self.breakers.entry(key.clone()).or_insert_with(|| {
            Arc::new(CircuitBreaker {
                name: Arc::from(key.to_string()),
                config: self.config.clone(),
                inner: Mutex::new(Inner::new(self.clock.now())),
                clock: self.clock.clone(),
            })
        });
        Arc::clone(entry.value())
    }

    /// Breaker for `key` if it has been used
    pub fn peek(&self, key: &K) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `key`'s breaker is currently Open; unused keys are never open
    pub fn is_open(&self, key: &K) -> bool {
        self.peek(key).is_some_and(|breaker| breaker.is_open())
    }

    pub fn stats(&self) -> Vec<(K, CircuitStats)> {
        self.breakers.iter().map(|entry| (entry.key().clone(), entry.value().stats())).collect()
    }

    pub fn reset(&self, key: &K) {
        if let Some(breaker) = self.peek(key) {
            breaker.reset();
        }
    }

    pub fn reset_all(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
    }
}
