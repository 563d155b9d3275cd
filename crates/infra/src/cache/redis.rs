//! Redis-backed shared token cache
//!
//! Lets several client processes share one bearer token per environment.
//! Every failure is returned to the caller; the auth manager treats them
//! as cache misses.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, RedisResult};
use async_trait::async_trait;
use catalink_core::SharedCache;
use catalink_domain::{CatalinkError, Result};
use tracing::info;

use crate::errors::InfraError;

/// Shared cache over one multiplexed Redis connection
///
/// Keys are stored as given; namespacing is the caller's job. Connecting and
/// every command are bounded by the same deadline.
pub struct RedisSharedCache {
    connection: ConnectionManager,
    timeout: Duration,
}

impl std::fmt::Debug for RedisSharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSharedCache").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

impl RedisSharedCache {
    /// Connect, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// `ValidationError` for a malformed URL, `NetworkError` when the server
    /// refuses the connection, `Timeout` when it does not answer in time.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|err| CatalinkError::validation(format!("invalid cache URL: {err}")))?;
        let connection = bounded(timeout, "connect", ConnectionManager::new(client)).await?;
        info!(timeout_ms = timeout.as_millis() as u64, "connected to shared token cache");

        Ok(Self { connection, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Run one Redis call under `timeout`, mapping both failure modes
async fn bounded<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|err| InfraError::from(err).into()),
        Err(_) => Err(CatalinkError::timeout(format!(
            "shared cache {operation} timed out after {}ms",
            timeout.as_millis()
        ))
        .with_context("source", "redis")),
    }
}

/// Redis rejects a zero expiry
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        bounded(self.timeout, "get", connection.get::<_, Option<String>>(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        bounded(self.timeout, "set", connection.set_ex::<_, _, ()>(key, value, expiry_secs(ttl))).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        bounded(self.timeout, "delete", connection.del::<_, ()>(key)).await
    }
}

#[cfg(test)]
mod tests {
    use catalink_domain::ErrorKind;

    use super::*;

    #[test]
    fn sub_second_ttls_round_up() {
        assert_eq!(expiry_secs(Duration::from_millis(200)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(3_600)), 3_600);
    }

    #[tokio::test]
    async fn malformed_url_is_a_validation_error() {
        let err = RedisSharedCache::connect("not-a-redis-url", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn stalled_call_becomes_timeout_error() {
        let err = bounded(Duration::from_millis(20), "get", std::future::pending::<RedisResult<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("shared cache get timed out after 20ms"));
    }

    #[tokio::test]
    async fn unreachable_server_fails_within_deadline() {
        let started = std::time::Instant::now();
        let err = RedisSharedCache::connect("redis://127.0.0.1:1", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NetworkError | ErrorKind::Timeout), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
