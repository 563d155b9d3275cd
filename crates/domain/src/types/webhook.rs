//! Inbound webhook events

use serde::{Deserialize, Serialize};

use crate::impl_wire_name;

/// A signed event pushed by the vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub resource_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Raw payload exactly as received; the signature covers these bytes.
    pub payload: String,
    /// Hex-encoded HMAC-SHA256
    pub signature: String,
    pub nonce: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
}

impl WebhookEvent {
    /// Deterministic de-duplication key `eventId:resourceId:type`
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.event_id, self.resource_id, self.event_type)
    }
}

/// Processing state recorded against an idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyState {
    Processing,
    Done,
    Failed,
}

impl_wire_name!(IdempotencyState {
    Processing => "processing",
    Done => "done",
    Failed => "failed",
});
