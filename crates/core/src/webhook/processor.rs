//! Webhook processing: verify, claim, handle, record
//!
//! State machine per idempotency key:
//!
//! ```text
//! (absent) ──claim──▶ processing ──ok──▶ done
//!                         │
//!                         └──err──▶ failed ──claim──▶ processing
//! ```

use std::future::Future;
use std::sync::Arc;

use catalink_common::observability::ClientMetrics;
use catalink_domain::{
    CatalinkError, ErrorKind, IdempotencyState, Result, WebhookEvent, WebhookSettings,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::ports::IdempotencyStore;
use super::signature::verify_signature;

/// Result of handing one event to [`WebhookProcessor::process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The handler ran and succeeded
    Processed,
    /// Already marked done; the handler was not invoked
    AlreadyProcessed,
    /// Another delivery of the same event is being handled
    InProgress,
}

pub struct WebhookProcessor {
    secret: String,
    max_skew_secs: i64,
    store: Arc<dyn IdempotencyStore>,
    metrics: Arc<ClientMetrics>,
}

impl std::fmt::Debug for WebhookProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookProcessor")
            .field("max_skew_secs", &self.max_skew_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookProcessor {
    /// # Errors
    ///
    /// `ValidationError` when no webhook secret is configured.
    pub fn new(settings: &WebhookSettings, store: Arc<dyn IdempotencyStore>) -> Result<Self> {
        let secret = settings
            .secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| CatalinkError::validation("webhook secret is not configured"))?;
        Ok(Self {
            secret,
            max_skew_secs: settings.max_skew_secs,
            store,
            metrics: Arc::new(ClientMetrics::new()),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Check freshness and signature against `now` (unix seconds)
    ///
    /// # Errors
    ///
    /// - `ValidationError` when the timestamp is outside the skew window
    /// - non-retryable `AuthenticationFailed` on a signature mismatch
    pub fn verify(&self, event: &WebhookEvent, now: i64) -> Result<()> {
        let skew = now.saturating_sub(event.timestamp).saturating_abs();
        if skew > self.max_skew_secs {
            return Err(CatalinkError::validation(format!(
                "webhook timestamp is {skew}s away from now (max {}s)",
                self.max_skew_secs
            ))
            .with_context("event_id", event.event_id.clone()));
        }

        if !verify_signature(
            &self.secret,
            &event.payload,
            event.timestamp,
            &event.nonce,
            &event.signature,
        )? {
            return Err(CatalinkError::new(ErrorKind::AuthenticationFailed, "invalid webhook signature")
                .with_retryable(false)
                .with_context("event_id", event.event_id.clone()));
        }
        Ok(())
    }

    /// Verify and handle `event` at most once
    pub async fn process<H, Fut>(&self, event: WebhookEvent, handler: H) -> Result<WebhookOutcome>
    where
        H: FnOnce(WebhookEvent) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.process_at(event, Utc::now().timestamp(), handler).await
    }

    /// [`process`](Self::process) with an explicit clock reading
    ///
    /// # Errors
    ///
    /// Verification failures, idempotency store failures, or the handler's
    /// own error. A failed handler leaves the key `failed` so a redelivery
    /// is processed again.
    pub async fn process_at<H, Fut>(
        &self,
        event: WebhookEvent,
        now: i64,
        handler: H,
    ) -> Result<WebhookOutcome>
    where
        H: FnOnce(WebhookEvent) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.verify(&event, now)?;

        let key = event.idempotency_key();
        match self.store.try_begin(&key).await? {
            None => {}
            Some(IdempotencyState::Done) => {
                self.metrics.record_webhook_duplicate();
                info!(key = %key, "duplicate webhook ignored");
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            Some(IdempotencyState::Processing) => {
                self.metrics.record_webhook_duplicate();
                info!(key = %key, "webhook already in progress");
                return Ok(WebhookOutcome::InProgress);
            }
            Some(IdempotencyState::Failed) => {
                // try_begin reclaims failed keys; treat as contention
                debug!(key = %key, "failed webhook key not reclaimed");
                return Ok(WebhookOutcome::InProgress);
            }
        }

        match handler(event).await {
            Ok(()) => {
                self.store.set_state(&key, IdempotencyState::Done).await?;
                debug!(key = %key, "webhook processed");
                Ok(WebhookOutcome::Processed)
            }
            Err(err) => {
                warn!(key = %key, error = %err, "webhook handler failed");
                if let Err(store_err) = self.store.set_state(&key, IdempotencyState::Failed).await {
                    warn!(key = %key, error = %store_err, "could not mark webhook failed");
                }
                Err(err.with_context("idempotency_key", key))
            }
        }
    }
}
