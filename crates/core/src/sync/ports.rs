//! Port interfaces for delta synchronisation

use async_trait::async_trait;
use catalink_domain::{Result, SyncEntity};
use chrono::{DateTime, Utc};

use crate::batch::BatchResult;

/// Source of remote changes
#[async_trait]
pub trait ChangeFeed<T: SyncEntity>: Send + Sync {
    /// Records modified at or after `since`; every record when `None`
    ///
    /// Never fails as a whole: unreachable pages are reported as failures
    /// inside the result.
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> BatchResult<T>;
}

/// Local copy of the catalog
#[async_trait]
pub trait CatalogStore<T: SyncEntity>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<T>>;

    /// Insert or replace by `entity_id`
    async fn upsert(&self, entity: T) -> Result<()>;

    async fn list(&self) -> Result<Vec<T>>;
}
