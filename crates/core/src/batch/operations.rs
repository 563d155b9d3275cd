//! Chunked, concurrency-bounded execution of independent calls
//!
//! Items are split into chunks of `chunk_size`. Up to `max_concurrency`
//! chunks are in flight at once, started in submission order; items inside
//! a chunk run concurrently. One item failing never aborts its siblings.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use catalink_common::observability::ClientMetrics;
use catalink_domain::{BatchSettings, CatalinkError, ErrorKind, Result};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::result::BatchResult;

/// What to do with the remaining chunks once an item fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    ContinueOnError,
    /// Stop starting chunks after the first failure; items never started
    /// are recorded as skipped failures
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub chunk_size: usize,
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchSettings::default())
    }
}

impl From<&BatchSettings> for BatchOptions {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size.max(1),
            max_concurrency: settings.max_concurrency.max(1),
            failure_policy: FailurePolicy::ContinueOnError,
        }
    }
}

impl BatchOptions {
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BatchOperations {
    options: BatchOptions,
    metrics: Arc<ClientMetrics>,
}

impl BatchOperations {
    pub fn new(options: BatchOptions) -> Self {
        Self { options, metrics: Arc::new(ClientMetrics::new()) }
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run `per_item` over every item
    ///
    /// The result always accounts for every input: successes plus failures
    /// equals `items.len()`.
    pub async fn execute<I, T, F, Fut>(
        &self,
        operation: &str,
        items: Vec<I>,
        per_item: F,
    ) -> BatchResult<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let total = items.len();
        let chunk_size = self.options.chunk_size.max(1);
        let fail_fast = self.options.failure_policy == FailurePolicy::FailFast;

        let mut chunks: Vec<Vec<(usize, I)>> = Vec::with_capacity(total.div_ceil(chunk_size));
        let mut indexed = items.into_iter().enumerate().peekable();
        while indexed.peek().is_some() {
            chunks.push(indexed.by_ref().take(chunk_size).collect());
        }

        let halted = AtomicBool::new(false);
        let halted = &halted;
        let per_item = &per_item;

        let outcomes: Vec<Vec<(usize, Result<T>)>> = stream::iter(chunks)
            .map(move |chunk| async move {
                if fail_fast && halted.load(Ordering::SeqCst) {
                    return chunk
                        .into_iter()
                        .map(|(index, _)| (index, Err(skipped(operation))))
                        .collect();
                }
                let results = join_all(
                    chunk
                        .into_iter()
                        .map(|(index, item)| async move { (index, per_item(item).await) }),
                )
                .await;
                if results.iter().any(|(_, result)| result.is_err()) {
                    halted.store(true, Ordering::SeqCst);
                }
                results
            })
            .buffered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        let mut batch = BatchResult::default();
        for (index, result) in outcomes.into_iter().flatten() {
            match result {
                Ok(value) => batch.successes.push((index, value)),
                Err(err) => batch.failures.push((index, err)),
            }
        }
        batch.sort();
        batch.elapsed = started.elapsed();

        let succeeded = batch.success_count();
        let failed = batch.failure_count();
        self.metrics.record_batch(succeeded as u64, failed as u64);
        if failed == 0 {
            info!(operation, total, elapsed_ms = batch.elapsed.as_millis() as u64, "batch completed");
        } else {
            warn!(operation, total, succeeded, failed, "batch completed with failures");
        }
        batch
    }
}

fn skipped(operation: &str) -> CatalinkError {
    CatalinkError::new(
        ErrorKind::BatchPartialFailure,
        format!("{operation}: skipped after an earlier failure"),
    )
    .with_retryable(false)
}
