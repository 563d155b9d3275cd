//! In-memory [`CatalogStore`]

use std::collections::BTreeMap;

use async_trait::async_trait;
use catalink_core::CatalogStore;
use catalink_domain::{Result, SyncEntity};
use parking_lot::RwLock;

/// Entities keyed by id; listing is in id order.
pub struct InMemoryCatalogStore<T> {
    entries: RwLock<BTreeMap<String, T>>,
}

impl<T> Default for InMemoryCatalogStore<T> {
    fn default() -> Self {
        Self { entries: RwLock::new(BTreeMap::new()) }
    }
}

impl<T> std::fmt::Debug for InMemoryCatalogStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalogStore").field("len", &self.entries.read().len()).finish()
    }
}

impl<T: SyncEntity> InMemoryCatalogStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store
    pub fn with_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let entries =
            entities.into_iter().map(|entity| (entity.entity_id().to_string(), entity)).collect();
        Self { entries: RwLock::new(entries) }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        self.entries.write().remove(id)
    }
}

#[async_trait]
impl<T: SyncEntity> CatalogStore<T> for InMemoryCatalogStore<T> {
    async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.entries.read().get(id).cloned())
    }

    async fn upsert(&self, entity: T) -> Result<()> {
        self.entries.write().insert(entity.entity_id().to_string(), entity);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<T>> {
        Ok(self.entries.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use catalink_domain::Product;

    use super::*;

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryCatalogStore::new();
        store.upsert(Product::new("p-2", "Old")).await.unwrap();
        store.upsert(Product::new("p-1", "First")).await.unwrap();
        store.upsert(Product::new("p-2", "New")).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("p-2").await.unwrap().map(|p| p.name), Some("New".to_string()));
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p-1", "p-2"]);
    }
}
