//! Conversions from external infrastructure errors into domain errors.

use std::error::Error as _;

use catalink_core::TransportError;
use catalink_domain::CatalinkError;
use redis::RedisError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CatalinkError);

impl From<InfraError> for CatalinkError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CatalinkError> for InfraError {
    fn from(value: CatalinkError) -> Self {
        Self(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

/// Classify a failed request that produced no HTTP status
pub fn classify_reqwest(err: &HttpError) -> TransportError {
    let description = describe(err);
    if err.is_timeout() {
        return TransportError::Timeout(description);
    }
    if err.is_connect() {
        let lower = description.to_ascii_lowercase();
        if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
            return TransportError::Dns(description);
        }
        return TransportError::ConnectionRefused(description);
    }
    TransportError::Other(description)
}

/// Message including the source chain; reqwest's own `Display` omits it.
fn describe(err: &HttpError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        match classify_reqwest(&value) {
            TransportError::Timeout(message) => Self(CatalinkError::timeout(message)),
            TransportError::Other(message) if value.is_builder() => {
                Self(CatalinkError::validation(format!("invalid HTTP request: {message}")))
            }
            other => Self(CatalinkError::network(other.to_string())),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* redis::RedisError → CatalinkError */
/* -------------------------------------------------------------------------- */

impl From<RedisError> for InfraError {
    fn from(value: RedisError) -> Self {
        let err = if value.is_timeout() {
            CatalinkError::timeout(format!("redis timed out: {value}"))
        } else {
            CatalinkError::network(format!("redis error: {value}"))
        };
        Self(err.with_context("backend", "redis"))
    }
}
