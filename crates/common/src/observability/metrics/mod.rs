//! Client counters

mod client;

pub use client::{ClientMetrics, MetricsSnapshot};
