//! Resilience patterns for calling an unreliable dependency
//!
//! This module provides **generic, reusable** building blocks:
//! - **Circuit Breaker**: stops calling a dependency that keeps failing, with
//!   a lazily evaluated cooldown and a per-key registry
//! - **Rate Limiter**: global plus per-key token buckets
//! - **Retry**: exponential backoff with jitter, driven by a pluggable policy
//!
//! Everything is generic over the caller's key and error types. The
//! catalog-specific composition lives in `catalink-core`.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerRegistry,
    CircuitState, CircuitStats, Clock, ConfigError, ConfigResult, MockClock, ResilienceError,
    SystemClock,
};
// Re-export rate limiter types
pub use rate_limiter::{RateLimitError, RateLimitSnapshot, RateLimiter, TokenBucket, TokenBucketConfig};
// Re-export retry types
pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
