//! Classification of transport and vendor failures
//!
//! Lookup order for an HTTP error response:
//! 1. a vendor error code in the body, via the code table
//! 2. the status code, by convention
//!
//! A `Retry-After` header is honoured whichever path chose the kind.

use std::collections::HashMap;
use std::time::Duration;

use catalink_domain::constants::{DEFAULT_RATE_LIMITED_RETRY_AFTER_SECS, RETRY_AFTER_HEADER};
use catalink_domain::{CatalinkError, ErrorKind};
use serde_json::Value;

use crate::api::endpoint::AuthScheme;
use crate::api::ports::{ApiResponse, TransportError};

const MAX_MESSAGE_LEN: usize = 300;

/// Maps raw failures into [`CatalinkError`]
#[derive(Debug, Clone)]
pub struct ErrorMapper {
    vendor_codes: HashMap<String, ErrorKind>,
    default_retry_after: Duration,
}

impl Default for ErrorMapper {
    fn default() -> Self {
        let vendor_codes = [
            ("AUTH_FAILED", ErrorKind::AuthenticationFailed),
            ("UNAUTHORIZED", ErrorKind::AuthenticationFailed),
            ("INVALID_SIGNATURE", ErrorKind::AuthenticationFailed),
            ("TOKEN_EXPIRED", ErrorKind::TokenExpired),
            ("INVALID_TOKEN", ErrorKind::TokenExpired),
            ("INVALID_CREDENTIALS", ErrorKind::InvalidCredentials),
            ("NOT_FOUND", ErrorKind::EntityNotFound),
            ("PRODUCT_NOT_FOUND", ErrorKind::EntityNotFound),
            ("ORDER_NOT_FOUND", ErrorKind::EntityNotFound),
            ("ORDER_NOT_EXISTS", ErrorKind::EntityNotFound),
            ("OUT_OF_STOCK", ErrorKind::OutOfStock),
            ("RATE_LIMIT_EXCEEDED", ErrorKind::RateLimited),
            ("TOO_MANY_REQUESTS", ErrorKind::RateLimited),
            ("QUOTA_EXCEEDED", ErrorKind::QuotaExceeded),
            ("INVALID_REQUEST", ErrorKind::InvalidRequest),
            ("VALIDATION_FAILED", ErrorKind::InvalidRequest),
        ]
        .into_iter()
        .map(|(code, kind)| (code.to_string(), kind))
        .collect();

        Self {
            vendor_codes,
            default_retry_after: Duration::from_secs(DEFAULT_RATE_LIMITED_RETRY_AFTER_SECS),
        }
    }
}

impl ErrorMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a vendor code mapping
    pub fn with_vendor_code(mut self, code: impl Into<String>, kind: ErrorKind) -> Self {
        self.vendor_codes.insert(code.into().to_ascii_uppercase(), kind);
        self
    }

    pub fn with_default_retry_after(mut self, retry_after: Duration) -> Self {
        self.default_retry_after = retry_after;
        self
    }

    pub fn vendor_kind(&self, code: &str) -> Option<ErrorKind> {
        self.vendor_codes.get(&code.to_ascii_uppercase()).copied()
    }

    /// Network-level failure: timeouts stay timeouts, everything else is a
    /// network error. Both are retryable.
    pub fn map_transport(&self, error: &TransportError, operation: &str) -> CatalinkError {
        let err = match error {
            TransportError::Timeout(_) => CatalinkError::timeout(error.to_string()),
            TransportError::ConnectionRefused(_)
            | TransportError::Dns(_)
            | TransportError::Other(_) => CatalinkError::network(error.to_string()),
        };
        err.with_context("operation", operation)
    }

    /// Non-2xx response
    ///
    /// A 401 on a bearer-authenticated endpoint means the cached token was
    /// rejected and maps to `TokenExpired`.
    pub fn map_response(
        &self,
        response: &ApiResponse,
        operation: &str,
        scheme: AuthScheme,
    ) -> CatalinkError {
        let (vendor_code, vendor_message) = extract_vendor_error(&response.body);
        let message = vendor_message
            .unwrap_or_else(|| format!("{operation} failed with HTTP {}", response.status));

        let kind = vendor_code
            .as_deref()
            .and_then(|code| self.vendor_kind(code))
            .unwrap_or_else(|| kind_for_status(response.status, scheme));

        let mut err = CatalinkError::new(kind, message)
            .with_context("operation", operation)
            .with_context("status", response.status.to_string());

        if let Some(code) = vendor_code {
            err = err.with_vendor_code(code);
        }

        let header_wait = response.header(RETRY_AFTER_HEADER).and_then(parse_retry_after);
        match (header_wait, kind) {
            (Some(wait), _) => err.with_retry_after(wait),
            (None, ErrorKind::RateLimited) => err.with_retry_after(self.default_retry_after),
            _ => err,
        }
    }
}

fn kind_for_status(status: u16, scheme: AuthScheme) -> ErrorKind {
    match status {
        401 if scheme == AuthScheme::Bearer => ErrorKind::TokenExpired,
        401 | 403 => ErrorKind::AuthenticationFailed,
        404 => ErrorKind::EntityNotFound,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ApiError,
        _ => ErrorKind::InvalidRequest,
    }
}

/// Pull `code`/`message` out of the common vendor error body shapes:
/// `{"code": .., "message": ..}` and `{"error": {"code": .., "message": ..}}`
fn extract_vendor_error(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        let message = (!trimmed.is_empty()).then(|| truncate(trimmed));
        return (None, message);
    };

    let scope = value.get("error").filter(|inner| inner.is_object()).unwrap_or(&value);
    let code = ["code", "error_code"]
        .iter()
        .find_map(|key| scope.get(*key))
        .and_then(|code| match code {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    let message = ["message", "error_description", "detail"]
        .iter()
        .find_map(|key| scope.get(*key).and_then(Value::as_str))
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(truncate);

    (code, message)
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_MESSAGE_LEN).collect()
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> ErrorMapper {
        ErrorMapper::new()
    }

    #[test]
    fn test_status_conventions() {
        let cases = [
            (401, AuthScheme::Signed, ErrorKind::AuthenticationFailed),
            (403, AuthScheme::Bearer, ErrorKind::AuthenticationFailed),
            (401, AuthScheme::Bearer, ErrorKind::TokenExpired),
            (404, AuthScheme::Signed, ErrorKind::EntityNotFound),
            (429, AuthScheme::Signed, ErrorKind::RateLimited),
            (502, AuthScheme::Signed, ErrorKind::ApiError),
            (422, AuthScheme::Signed, ErrorKind::InvalidRequest),
        ];
        for (status, scheme, kind) in cases {
            let err = mapper().map_response(&ApiResponse::new(status, ""), "op", scheme);
            assert_eq!(err.kind, kind, "status {status}");
        }
    }

    #[test]
    fn test_server_errors_retryable_client_errors_not() {
        let err = mapper().map_response(&ApiResponse::new(503, ""), "op", AuthScheme::Signed);
        assert!(err.retryable);
        let err = mapper().map_response(&ApiResponse::new(400, ""), "op", AuthScheme::Signed);
        assert!(!err.retryable);
    }

    #[test]
    fn test_vendor_code_wins_over_status() {
        let body = r#"{"code":"ORDER_NOT_FOUND","message":"Order 77 does not exist"}"#;
        let err = mapper().map_response(&ApiResponse::new(400, body), "pay_order", AuthScheme::Bearer);

        assert_eq!(err.kind, ErrorKind::EntityNotFound);
        assert_eq!(err.vendor_code.as_deref(), Some("ORDER_NOT_FOUND"));
        assert_eq!(err.message, "Order 77 does not exist");
        assert_eq!(err.context.get("status").map(String::as_str), Some("400"));
    }

    #[test]
    fn test_nested_error_body_and_unknown_code() {
        let body = r#"{"error":{"code":"SOMETHING_NEW","message":"odd"}}"#;
        let err = mapper().map_response(&ApiResponse::new(500, body), "op", AuthScheme::Signed);
        assert_eq!(err.kind, ErrorKind::ApiError);
        assert_eq!(err.vendor_code.as_deref(), Some("SOMETHING_NEW"));
    }

    #[test]
    fn test_rate_limit_retry_after() {
        let err = mapper().map_response(&ApiResponse::new(429, "{}"), "op", AuthScheme::Signed);
        assert_eq!(err.retry_after, Some(Duration::from_secs(5)));

        let response = ApiResponse::new(429, "{}").with_header("retry-after", "12");
        let err = mapper().map_response(&response, "op", AuthScheme::Signed);
        assert_eq!(err.retry_after, Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_custom_vendor_code() {
        let mapper = mapper().with_vendor_code("sold_out", ErrorKind::OutOfStock);
        let err = mapper.map_response(
            &ApiResponse::new(409, r#"{"error_code":"SOLD_OUT"}"#),
            "create_order",
            AuthScheme::Bearer,
        );
        assert_eq!(err.kind, ErrorKind::OutOfStock);
        assert_eq!(err.message, "create_order failed with HTTP 409");
    }

    #[test]
    fn test_transport_mapping() {
        let err = mapper().map_transport(&TransportError::Timeout("30s".into()), "op");
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);

        for raw in [
            TransportError::ConnectionRefused("x".into()),
            TransportError::Dns("x".into()),
            TransportError::Other("x".into()),
        ] {
            let err = mapper().map_transport(&raw, "op");
            assert_eq!(err.kind, ErrorKind::NetworkError);
            assert!(err.retryable);
        }
    }

    #[test]
    fn test_plain_text_body_becomes_message() {
        let err = mapper().map_response(
            &ApiResponse::new(502, "Bad Gateway"),
            "list_products",
            AuthScheme::Signed,
        );
        assert_eq!(err.message, "Bad Gateway");
    }
}
