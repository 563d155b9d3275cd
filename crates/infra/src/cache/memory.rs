//! In-process shared cache
//!
//! Stands in for Redis in single-process deployments and tests. Each entry
//! carries its own TTL, so a token expires with the token.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalink_core::SharedCache;
use catalink_domain::Result;
use moka::future::Cache;
use moka::Expiry;

const MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Clone)]
pub struct InMemorySharedCache {
    cache: Cache<String, Entry>,
}

impl std::fmt::Debug for InMemorySharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySharedCache").field("entries", &self.cache.entry_count()).finish()
    }
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self { cache: Cache::builder().max_capacity(MAX_ENTRIES).expire_after(PerEntryTtl).build() }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), Entry { value: value.to_string(), ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_deletes_values() {
        let cache = InMemorySharedCache::new();
        cache.set("token:sandbox", "abc", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("token:sandbox").await.unwrap().as_deref(), Some("abc"));

        cache.delete("token:sandbox").await.unwrap();
        assert_eq!(cache.get("token:sandbox").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_their_own_ttl() {
        let cache = InMemorySharedCache::new();
        cache.set("short", "a", Duration::from_millis(20)).await.unwrap();
        cache.set("long", "b", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("b"));
    }
}
