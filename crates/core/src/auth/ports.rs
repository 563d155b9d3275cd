//! Port interfaces for the shared token cache

use std::time::Duration;

use async_trait::async_trait;
use catalink_domain::Result;

/// Key/value cache shared between client instances (e.g. Redis)
///
/// Used best-effort: the auth manager treats every error as a cache miss.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Get a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove a value; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}
