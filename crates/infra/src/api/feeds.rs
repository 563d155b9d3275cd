//! Change feeds for delta sync

use std::sync::Arc;

use async_trait::async_trait;
use catalink_core::{BatchResult, ChangeFeed};
use catalink_domain::{Category, FilterQuery, Product};
use chrono::{DateTime, Utc};

use super::client::CatalogClient;

/// Products changed since a checkpoint; the full catalog without one
#[derive(Debug, Clone)]
pub struct ProductFeed {
    client: Arc<CatalogClient>,
    filter: FilterQuery,
}

impl ProductFeed {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client, filter: FilterQuery::default() }
    }

    /// Restrict both full and delta fetches, e.g. to one region
    pub fn with_filter(mut self, filter: FilterQuery) -> Self {
        self.filter = filter;
        self
    }
}

#[async_trait]
impl ChangeFeed<Product> for ProductFeed {
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> BatchResult<Product> {
        match since {
            Some(since) => self.client.fetch_products_updated_since(&self.filter, since).await,
            None => self.client.fetch_all_products(&self.filter, None).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryFeed {
    client: Arc<CatalogClient>,
}

impl CategoryFeed {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChangeFeed<Category> for CategoryFeed {
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> BatchResult<Category> {
        match since {
            Some(since) => {
                self.client.fetch_categories_updated_since(&FilterQuery::default(), since).await
            }
            None => self.client.fetch_all_categories(&FilterQuery::default(), None).await,
        }
    }
}
