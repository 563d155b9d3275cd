//! Error types used throughout the client
//!
//! Every failure that leaves the client is a [`CatalinkError`]: a closed
//! [`ErrorKind`] plus the metadata callers need to decide what to do next
//! (retryability, a suggested wait, the vendor's own error code).

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_wire_name;

/// Closed taxonomy of client failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationFailed,
    TokenExpired,
    InvalidCredentials,
    EntityNotFound,
    OutOfStock,
    ApiError,
    RateLimited,
    Timeout,
    InvalidRequest,
    NetworkError,
    CircuitOpen,
    BatchPartialFailure,
    SyncConflict,
    ValidationError,
    QuotaExceeded,
}

impl_wire_name!(ErrorKind {
    AuthenticationFailed => "authentication_failed",
    TokenExpired => "token_expired",
    InvalidCredentials => "invalid_credentials",
    EntityNotFound => "entity_not_found",
    OutOfStock => "out_of_stock",
    ApiError => "api_error",
    RateLimited => "rate_limited",
    Timeout => "timeout",
    InvalidRequest => "invalid_request",
    NetworkError => "network_error",
    CircuitOpen => "circuit_open",
    BatchPartialFailure => "batch_partial_failure",
    SyncConflict => "sync_conflict",
    ValidationError => "validation_error",
    QuotaExceeded => "quota_exceeded",
});

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::AuthenticationFailed,
        Self::TokenExpired,
        Self::InvalidCredentials,
        Self::EntityNotFound,
        Self::OutOfStock,
        Self::ApiError,
        Self::RateLimited,
        Self::Timeout,
        Self::InvalidRequest,
        Self::NetworkError,
        Self::CircuitOpen,
        Self::BatchPartialFailure,
        Self::SyncConflict,
        Self::ValidationError,
        Self::QuotaExceeded,
    ];

    /// Whether an error of this kind is worth retrying from the caller's
    /// point of view.
    ///
    /// This is caller-facing metadata. The retry policy table decides what
    /// the client itself retries.
    pub const fn default_retryable(self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::TokenExpired
                | Self::ApiError
                | Self::RateLimited
                | Self::Timeout
                | Self::NetworkError
                | Self::QuotaExceeded
        )
    }
}

/// Main error type for Catalink
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalinkError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default)]
    pub retry_after: Option<Duration>,
    #[serde(default)]
    pub vendor_code: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl fmt::Display for CatalinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = &self.vendor_code {
            write!(f, " (vendor code {code})")?;
        }
        Ok(())
    }
}

impl CatalinkError {
    /// Create an error of `kind` with that kind's default retryability.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.default_retryable(),
            retry_after: None,
            vendor_code: None,
            context: BTreeMap::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EntityNotFound, message)
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationFailed, message)
    }

    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::new(ErrorKind::RateLimited, message).with_retry_after(retry_after)
    }

    pub fn quota_exceeded(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message).with_retry_after(retry_after)
    }

    /// Circuit-open rejection carrying the estimated time until the next
    /// trial call is admitted.
    pub fn circuit_open(operation: &str, retry_after: Duration) -> Self {
        Self::new(ErrorKind::CircuitOpen, format!("circuit open for {operation}"))
            .with_retry_after(retry_after)
            .with_context("operation", operation)
    }

    pub fn sync_conflict(entity_id: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyncConflict, message).with_context("entity_id", entity_id)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_vendor_code(mut self, code: impl Into<String>) -> Self {
        self.vendor_code = Some(code.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a context key/value pair (e.g. operation name, HTTP status)
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Message suitable for showing to an end user
    ///
    /// Includes the suggested wait when one is known.
    pub fn user_message(&self) -> String {
        match self.retry_after {
            Some(wait) if self.retryable || self.kind == ErrorKind::CircuitOpen => {
                format!("{} (try again in {}s)", self.message, wait.as_secs().max(1))
            }
            _ => self.message.clone(),
        }
    }
}

impl From<serde_json::Error> for CatalinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::api(format!("malformed response body: {err}")).with_retryable(false)
    }
}

/// Result type alias for Catalink operations
pub type Result<T> = std::result::Result<T, CatalinkError>;
