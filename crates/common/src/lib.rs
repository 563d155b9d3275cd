//! Generic building blocks shared across Catalink crates.
//!
//! Nothing in this crate knows about catalogs, orders or the vendor API. It
//! provides the resilience primitives (clock, circuit breaker, token bucket,
//! retry executor) and the counters the client records into.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error and configuration types only
//! - `observability`: tracing support
//! - `runtime`: async infrastructure (resilience, metrics)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod observability;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use observability::{ClientMetrics, MetricsSnapshot};
#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, CircuitStats,
    Clock, MockClock, RateLimitError, RateLimiter, ResilienceError, RetryConfig, RetryDecision,
    RetryError, RetryExecutor, RetryPolicy, SystemClock, TokenBucket,
};
