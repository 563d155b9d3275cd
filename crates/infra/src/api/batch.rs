//! Bulk fetches over the catalog client

use chrono::{DateTime, Utc};
use catalink_core::{BatchResult, FetchProgress};
use catalink_domain::{Category, FilterQuery, Product};
use tracing::instrument;

use super::client::CatalogClient;

/// Progress callback for paginated fetches
pub type ProgressFn<'a> = &'a (dyn Fn(FetchProgress) + Send + Sync);

impl CatalogClient {
    /// Fetch products one by one; failures are reported per input index
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn fetch_products_by_ids(&self, ids: Vec<String>) -> BatchResult<Product> {
        self.batch_operations()
            .execute("fetch_products_by_ids", ids, move |id| async move {
                self.get_product(&id).await
            })
            .await
    }

    /// Every product matching `filter`, page by page
    #[instrument(skip(self, filter, on_progress))]
    pub async fn fetch_all_products(
        &self,
        filter: &FilterQuery,
        on_progress: Option<ProgressFn<'_>>,
    ) -> BatchResult<Product> {
        let base = self.paged(filter);
        let base = &base;
        self.fetcher()
            .fetch_all(
                "fetch_all_products",
                move |page| async move { self.list_products(&base.for_page(page)).await },
                on_progress,
            )
            .await
    }

    /// Products matching `filter` and modified at or after `since`, oldest
    /// first
    pub async fn fetch_products_updated_since(
        &self,
        filter: &FilterQuery,
        since: DateTime<Utc>,
    ) -> BatchResult<Product> {
        self.fetch_all_products(&filter.changed_since(since), None).await
    }

    #[instrument(skip(self, filter, on_progress))]
    pub async fn fetch_all_categories(
        &self,
        filter: &FilterQuery,
        on_progress: Option<ProgressFn<'_>>,
    ) -> BatchResult<Category> {
        let base = self.paged(filter);
        let base = &base;
        self.fetcher()
            .fetch_all(
                "fetch_all_categories",
                move |page| async move { self.list_categories(&base.for_page(page)).await },
                on_progress,
            )
            .await
    }

    pub async fn fetch_categories_updated_since(
        &self,
        filter: &FilterQuery,
        since: DateTime<Utc>,
    ) -> BatchResult<Category> {
        self.fetch_all_categories(&filter.changed_since(since), None).await
    }

    /// `filter` with the fetcher's page size
    fn paged(&self, filter: &FilterQuery) -> FilterQuery {
        FilterQuery { page_size: self.fetcher().options().page_size, ..filter.clone() }
    }
}
