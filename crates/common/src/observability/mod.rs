//! Observability primitives
//!
//! Lock-free counters recorded by the client. Structured logging goes
//! through `tracing` directly; subscriber setup belongs to the binary (see
//! `catalink-infra`).

pub mod metrics;

pub use metrics::{ClientMetrics, MetricsSnapshot};
