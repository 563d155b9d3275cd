//! In-memory fakes for the sync ports

use std::collections::BTreeMap;

use async_trait::async_trait;
use catalink_core::{BatchResult, CatalogStore, ChangeFeed};
use catalink_domain::{CatalinkError, Result, SyncEntity};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Feed over a fixed remote collection, optionally failing every fetch
pub struct FixedFeed<T> {
    remote: Mutex<Vec<T>>,
    failing: Mutex<Option<CatalinkError>>,
}

impl<T: SyncEntity> FixedFeed<T> {
    pub fn new(remote: Vec<T>) -> Self {
        Self { remote: Mutex::new(remote), failing: Mutex::new(None) }
    }

    pub fn failing(error: CatalinkError) -> Self {
        Self { remote: Mutex::new(Vec::new()), failing: Mutex::new(Some(error)) }
    }

    pub fn set_remote(&self, remote: Vec<T>) {
        *self.remote.lock() = remote;
    }
}

#[async_trait]
impl<T: SyncEntity> ChangeFeed<T> for FixedFeed<T> {
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> BatchResult<T> {
        let mut result = BatchResult::default();
        if let Some(err) = self.failing.lock().clone() {
            result.failures.push((1, err));
            return result;
        }
        let changed = self
            .remote
            .lock()
            .iter()
            .filter(|entity| match (since, entity.updated_at()) {
                (Some(since), Some(updated)) => updated >= since,
                _ => true,
            })
            .cloned()
            .enumerate()
            .collect();
        result.successes = changed;
        result
    }
}

pub struct MapStore<T> {
    entries: Mutex<BTreeMap<String, T>>,
}

impl<T> Default for MapStore<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(BTreeMap::new()) }
    }
}

impl<T: SyncEntity> MapStore<T> {
    pub fn with(entities: Vec<T>) -> Self {
        let entries =
            entities.into_iter().map(|entity| (entity.entity_id().to_string(), entity)).collect();
        Self { entries: Mutex::new(entries) }
    }

    pub fn snapshot(&self, id: &str) -> Option<T> {
        self.entries.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl<T: SyncEntity> CatalogStore<T> for MapStore<T> {
    async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.entries.lock().get(id).cloned())
    }

    async fn upsert(&self, entity: T) -> Result<()> {
        self.entries.lock().insert(entity.entity_id().to_string(), entity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<T>> {
        Ok(self.entries.lock().values().cloned().collect())
    }
}
