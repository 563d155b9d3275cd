//! Domain constants
//!
//! Centralized location for the vendor-facing constants shared by every
//! Catalink crate.

// Vendor endpoints
pub const SANDBOX_BASE_URL: &str = "https://sandbox.catalog-api.net/v1";
pub const PRODUCTION_BASE_URL: &str = "https://api.catalog-api.net/v1";

// Header names
pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

// Authentication
pub const TOKEN_REFRESH_THRESHOLD_SECS: u64 = 300;
pub const TOKEN_CACHE_PREFIX: &str = "catalink:token";

// Retry floors and defaults (seconds)
pub const DEFAULT_RATE_LIMITED_RETRY_AFTER_SECS: u64 = 5;
pub const RATE_LIMITED_MIN_DELAY_SECS: u64 = 5;
pub const QUOTA_EXCEEDED_MIN_DELAY_SECS: u64 = 10;

// Pagination
pub const MIN_PAGE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

// Webhooks
pub const WEBHOOK_MAX_SKEW_SECS: i64 = 300;
pub const IDEMPOTENCY_RETENTION_SECS: u64 = 86_400;
