//! Generic retry executor with exponential backoff and jitter
//!
//! The executor knows nothing about error semantics. A [`RetryPolicy`] looks
//! at each failure and answers with a [`RetryDecision`]; the executor turns
//! that into a delay, enforces the retry limit and the optional time budget,
//! and sleeps.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Why the executor gave up
///
/// Every variant that follows a failed attempt carries that attempt's error.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The retry limit was reached
    #[error("All retry attempts exhausted after {attempts} tries: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The policy declined to retry this error
    #[error("Operation failed with non-retryable error: {source}")]
    NonRetryable { attempts: u32, source: E },

    /// Waiting for another attempt would exceed the retry budget
    #[error("Retry budget exceeded after {elapsed:?}: {source}")]
    BudgetExceeded { elapsed: Duration, source: E },
}

impl<E> RetryError<E> {
    /// The error of the last attempt
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. }
            | Self::NonRetryable { source, .. }
            | Self::BudgetExceeded { source, .. } => source,
        }
    }

    pub fn source_ref(&self) -> &E {
        match self {
            Self::Exhausted { source, .. }
            | Self::NonRetryable { source, .. }
            | Self::BudgetExceeded { source, .. } => source,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Result plus statistics of one execution
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Time spent sleeping between attempts
    pub total_delay: Duration,
    pub budget_exhausted: bool,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }
}

/// Decides, per failure, whether and how to retry
pub trait RetryPolicy<E> {
    /// `retries_so_far` is 0 after the first failed attempt
    fn should_retry(&self, error: &E, retries_so_far: u32) -> RetryDecision;
}

impl<E, F> RetryPolicy<E> for F
where
    F: Fn(&E, u32) -> RetryDecision,
{
    fn should_retry(&self, error: &E, retries_so_far: u32) -> RetryDecision {
        self(error, retries_so_far)
    }
}

/// Answer of a [`RetryPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up and surface the error
    Stop,
    /// Retry after the computed backoff delay
    Retry,
    /// Retry after exactly this delay (e.g. a server-supplied hint)
    RetryAfter(Duration),
    /// Retry after the computed delay, but never sooner than this
    RetryAtLeast(Duration),
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    Fixed(Duration),
    /// `min(max_delay, initial_delay * multiplier^attempt)`
    Exponential { initial_delay: Duration, multiplier: f64, max_delay: Duration },
}

impl BackoffStrategy {
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, multiplier, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max_delay.as_secs_f64() {
                    *max_delay
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

/// Randomisation applied to backoff delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `[delay / 2, delay]`
    Equal,
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
    /// Upper bound on total time spent in one execution
    pub budget: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(1),
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Full,
            budget: None,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }
}

/// Builder for RetryConfig
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, multiplier, max_delay };
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn budget(mut self, budget: Option<Duration>) -> Self {
        self.config.budget = budget;
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

/// Runs an operation until it succeeds or the policy gives up
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Delay before retry number `retries_so_far + 1`, before the policy's
    /// adjustments
    pub fn backoff_delay(&self, retries_so_far: u32) -> Duration {
        self.config.jitter.apply(self.config.backoff.calculate_delay(retries_so_far))
    }

    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute `operation` with retries and return outcome statistics
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut retries: u32 = 0;
        let mut total_delay = Duration::ZERO;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(retries, "operation succeeded after retrying");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: retries + 1,
                        total_delay,
                        budget_exhausted: false,
                    };
                }
                Err(error) => error,
            };
            let attempts = retries + 1;

            if retries >= self.config.max_retries {
                warn!(attempts, error = %error, "retry attempts exhausted");
                return RetryOutcome {
                    result: Err(RetryError::Exhausted { attempts, source: error }),
                    attempts,
                    total_delay,
                    budget_exhausted: false,
                };
            }

            let delay = match self.policy.should_retry(&error, retries) {
                RetryDecision::Stop => {
                    debug!(attempts, error = %error, "error is not retryable");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable { attempts, source: error }),
                        attempts,
                        total_delay,
                        budget_exhausted: false,
                    };
                }
                RetryDecision::Retry => self.backoff_delay(retries),
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::RetryAtLeast(floor) => self.backoff_delay(retries).max(floor),
            };

            if let Some(budget) = self.config.budget {
                let elapsed = started.elapsed();
                if elapsed + delay > budget {
                    warn!(?elapsed, ?delay, ?budget, "retry budget exceeded");
                    return RetryOutcome {
                        result: Err(RetryError::BudgetExceeded { elapsed, source: error }),
                        attempts,
                        total_delay,
                        budget_exhausted: true,
                    };
                }
            }

            warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %error, "retrying after failure");
            tokio::time::sleep(delay).await;
            total_delay += delay;
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for backoff maths, jitter bounds and the executor loop.

    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_retries(max_retries)
            .exponential_backoff(Duration::from_millis(10), 2.0, Duration::from_millis(25))
            .jitter(Jitter::None)
            .build()
    }

    fn always(_: &String, _: u32) -> RetryDecision {
        RetryDecision::Retry
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(backoff.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(200);
        for _ in 0..200 {
            assert!(Jitter::Full.apply(delay) <= delay);
            let equal = Jitter::Equal.apply(delay);
            assert!(equal >= Duration::from_millis(100) && equal <= delay);
        }
        assert_eq!(Jitter::None.apply(delay), delay);
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    /// Validates that a transiently failing operation eventually succeeds.
    ///
    /// Assertions:
    /// - The value is returned after two failures.
    /// - Accumulated delay equals the first two backoff delays (10ms + 20ms).
    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor = RetryExecutor::new(fast_config(3), always);

        let start = Instant::now();
        let outcome = executor
            .execute_with_outcome(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.total_delay, Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(outcome.result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_exhausted_carries_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor = RetryExecutor::new(fast_config(2), always);

        let err = executor
            .execute(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(format!("failure {n}"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.into_inner(), "failure 2");
    }

    #[tokio::test]
    async fn test_stop_decision_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let executor =
            RetryExecutor::new(fast_config(5), |_: &String, _: u32| RetryDecision::Stop);

        let err = executor
            .execute(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("fatal".to_string())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::NonRetryable { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_retry_after_and_floor_override_backoff() {
        let executor = RetryExecutor::new(fast_config(1), |_: &String, _: u32| {
            RetryDecision::RetryAtLeast(Duration::from_millis(40))
        });
        let outcome = executor.execute_with_outcome(|| async { Err::<(), _>("x".to_string()) }).await;
        assert_eq!(outcome.total_delay, Duration::from_millis(40));

        let executor = RetryExecutor::new(fast_config(1), |_: &String, _: u32| {
            RetryDecision::RetryAfter(Duration::from_millis(5))
        });
        let outcome = executor.execute_with_outcome(|| async { Err::<(), _>("x".to_string()) }).await;
        assert_eq!(outcome.total_delay, Duration::from_millis(5));
    }

    /// Validates that the retry budget aborts before sleeping past it.
    ///
    /// Assertions:
    /// - The executor stops with `BudgetExceeded` after the first attempt.
    /// - No delay was spent.
    #[tokio::test]
    async fn test_budget_aborts_retrying() {
        let config = RetryConfig::builder()
            .max_retries(10)
            .fixed_backoff(Duration::from_millis(50))
            .jitter(Jitter::None)
            .budget(Some(Duration::from_millis(20)))
            .build();
        let executor = RetryExecutor::new(config, always);

        let outcome = executor.execute_with_outcome(|| async { Err::<(), _>("slow".to_string()) }).await;

        assert!(outcome.budget_exhausted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
        assert!(matches!(outcome.result, Err(RetryError::BudgetExceeded { .. })));
    }
}
