//! Retry strategy for vendor calls
//!
//! Wraps the generic [`RetryExecutor`] with a policy built per call from:
//! - the [`RetryPolicyTable`] rule for the error's kind
//! - the call's idempotency class
//! - an optional "is the breaker open" probe
//!
//! A vendor `retry_after` hint replaces the computed backoff, but never
//! undercuts the kind's minimum delay. Each kind's retry cap is counted
//! against retries caused by that kind only; `max_retries` still bounds the
//! total.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use catalink_common::observability::ClientMetrics;
use catalink_common::resilience::{Jitter, RetryConfig, RetryDecision, RetryExecutor, RetryOutcome};
use catalink_domain::{CatalinkError, ErrorKind, Result, RetrySettings};
use parking_lot::Mutex;
use tracing::debug;

use super::policy::RetryPolicyTable;

/// Per-call retry inputs
#[derive(Clone, Copy)]
pub struct RetryOptions<'a> {
    /// Repeating the call cannot cause a second effect
    pub idempotent: bool,
    /// Returns `true` while the endpoint's breaker is open
    pub circuit_open: Option<&'a (dyn Fn() -> bool + Send + Sync)>,
}

impl Default for RetryOptions<'_> {
    fn default() -> Self {
        Self { idempotent: true, circuit_open: None }
    }
}

impl std::fmt::Debug for RetryOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("idempotent", &self.idempotent)
            .field("circuit_open", &self.circuit_open.is_some())
            .finish()
    }
}

/// Errors that prove a non-idempotent request was never processed
const fn safe_to_repeat(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::RateLimited | ErrorKind::QuotaExceeded | ErrorKind::TokenExpired)
}

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
    table: Arc<RetryPolicyTable>,
    metrics: Arc<ClientMetrics>,
}

impl RetryStrategy {
    pub fn new(settings: &RetrySettings) -> Self {
        let config = RetryConfig::builder()
            .max_retries(settings.max_retries)
            .exponential_backoff(
                settings.initial_delay(),
                settings.backoff_multiplier,
                settings.max_delay(),
            )
            .jitter(if settings.jitter { Jitter::Full } else { Jitter::None })
            .budget(settings.retry_budget())
            .build();
        Self {
            table: Arc::new(RetryPolicyTable::defaults(settings.max_retries)),
            config,
            metrics: Arc::new(ClientMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_table(mut self, table: Arc<RetryPolicyTable>) -> Self {
        self.table = table;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<RetryPolicyTable> {
        &self.table
    }

    /// Retry an idempotent operation
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with(operation_name, RetryOptions::default(), operation).await
    }

    /// Retry with explicit options
    ///
    /// # Errors
    ///
    /// The error of the last attempt, unchanged apart from added context.
    pub async fn execute_with<F, Fut, T>(
        &self,
        operation_name: &str,
        options: RetryOptions<'_>,
        operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self.execute_with_outcome(operation_name, options, operation).await;
        let attempts = outcome.attempts;
        outcome.result.map_err(|err| {
            let err = err.into_inner();
            if attempts > 1 {
                err.with_context("attempts", attempts.to_string())
            } else {
                err
            }
        })
    }

    /// Retry and report attempts, accumulated delay and budget exhaustion
    pub async fn execute_with_outcome<F, Fut, T>(
        &self,
        operation_name: &str,
        options: RetryOptions<'_>,
        operation: F,
    ) -> RetryOutcome<T, CatalinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retries_by_kind: Mutex<HashMap<ErrorKind, u32>> = Mutex::new(HashMap::new());
        let policy = |err: &CatalinkError, _retries_so_far: u32| {
            let mut retries_by_kind = retries_by_kind.lock();
            let kind_retries = retries_by_kind.entry(err.kind).or_insert(0);
            let decision = self.decide(err, *kind_retries, options);
            if decision == RetryDecision::Stop {
                debug!(operation = operation_name, kind = %err.kind, "not retrying");
            } else {
                *kind_retries += 1;
                self.metrics.record_retry();
            }
            decision
        };
        RetryExecutor::new(self.config.clone(), policy).execute_with_outcome(operation).await
    }

    /// Decision for one failure, exposed for inspection
    ///
    /// `kind_retries` counts earlier retries caused by `err.kind` in the same
    /// call.
    pub fn decide(
        &self,
        err: &CatalinkError,
        kind_retries: u32,
        options: RetryOptions<'_>,
    ) -> RetryDecision {
        let rule = self.table.get(err.kind);
        if !rule.allows(kind_retries) {
            return RetryDecision::Stop;
        }
        if !options.idempotent && !safe_to_repeat(err.kind) {
            return RetryDecision::Stop;
        }
        if options.circuit_open.is_some_and(|is_open| is_open()) {
            return RetryDecision::Stop;
        }

        match (err.retry_after, rule.min_delay) {
            (Some(hint), floor) => RetryDecision::RetryAfter(floor.map_or(hint, |f| hint.max(f))),
            (None, Some(floor)) => RetryDecision::RetryAtLeast(floor),
            (None, None) => RetryDecision::Retry,
        }
    }
}
