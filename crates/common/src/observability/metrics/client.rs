//! Request, resilience and batch counters for one client instance
//!
//! ## Design
//! - Plain `AtomicU64` counters, `Relaxed` ordering: every counter is
//!   independent and no derived value is computed from two of them
//! - `snapshot()` produces a serialisable copy for export or assertions

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident => $record:ident),+ $(,)?) => {
        /// Counters shared by every component of one client
        #[derive(Debug, Default)]
        pub struct ClientMetrics {
            $($(#[$doc])* $name: AtomicU64,)+
        }

        impl ClientMetrics {
            pub fn new() -> Self {
                Self::default()
            }

            $(
                $(#[$doc])*
                pub fn $record(&self) {
                    self.$name.fetch_add(1, Ordering::Relaxed);
                }
            )+

            /// Copy of every counter
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)+
                }
            }

            /// Zero every counter
            pub fn reset(&self) {
                $(self.$name.store(0, Ordering::Relaxed);)+
            }
        }

        /// Point-in-time copy of [`ClientMetrics`]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct MetricsSnapshot {
            $(pub $name: u64,)+
        }
    };
}

counters! {
    /// Logical requests started
    requests_started => record_request_started,
    /// Logical requests that returned a value
    requests_succeeded => record_request_succeeded,
    /// Logical requests that surfaced an error
    requests_failed => record_request_failed,
    /// Retries scheduled after a failed attempt
    retries_scheduled => record_retry,
    /// Calls rejected by an open circuit
    circuit_rejections => record_circuit_rejection,
    /// Admissions that had to wait for a token
    rate_limit_waits => record_rate_limit_wait,
    /// Admissions that failed even after waiting
    quota_rejections => record_quota_rejection,
    /// Bearer tokens fetched from the token endpoint
    token_fetches => record_token_fetch,
    /// Failed reads or writes against the shared token cache
    shared_cache_errors => record_shared_cache_error,
    /// Batch items that succeeded
    batch_items_succeeded => record_batch_item_succeeded,
    /// Batch items that failed
    batch_items_failed => record_batch_item_failed,
    /// Webhook deliveries skipped as duplicates
    webhook_duplicates => record_webhook_duplicate,
}

impl ClientMetrics {
    /// Record `n` batch outcomes at once
    pub fn record_batch(&self, succeeded: u64, failed: u64) {
        self.batch_items_succeeded.fetch_add(succeeded, Ordering::Relaxed);
        self.batch_items_failed.fetch_add(failed, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = ClientMetrics::new();
        metrics.record_request_started();
        metrics.record_request_started();
        metrics.record_retry();
        metrics.record_batch(7, 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_started, 2);
        assert_eq!(snapshot.retries_scheduled, 1);
        assert_eq!(snapshot.batch_items_succeeded, 7);
        assert_eq!(snapshot.batch_items_failed, 2);
        assert_eq!(snapshot.webhook_duplicates, 0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = ClientMetrics::new();
        metrics.record_token_fetch();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["token_fetches"], 1);
    }
}
