//! Catalog API client with rate limiting, circuit breaking and retry
//!
//! Every operation is a thin request builder over the core
//! [`RequestExecutor`], which owns the resilience stack.

use std::sync::Arc;

use catalink_common::observability::{ClientMetrics, MetricsSnapshot};
use catalink_common::resilience::{CircuitStats, RateLimitSnapshot};
use catalink_core::{
    ApiRequest, BatchOperations, Endpoint, HealthReport, PaginatedFetcher, RequestExecutor,
    SharedCache, Transport,
};
use catalink_domain::{
    CatalinkError, Category, ClientConfig, Credentials, FilterQuery, Page, PriceSimulation,
    Product, Result,
};
use tracing::{info, instrument, warn};

use crate::cache::RedisSharedCache;
use crate::config::LoadedConfig;
use crate::http::HttpTransport;

/// Client for the vendor's catalog and order API
pub struct CatalogClient {
    executor: Arc<RequestExecutor>,
    batch: BatchOperations,
    fetcher: PaginatedFetcher,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient").field("executor", &self.executor).finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn builder(credentials: Credentials) -> CatalogClientBuilder {
        CatalogClientBuilder::new(credentials)
    }

    /// Build from loaded configuration, connecting the shared token cache
    /// when `cache_url` is set.
    ///
    /// An unreachable cache is logged and skipped; tokens then live only in
    /// this process.
    ///
    /// # Errors
    ///
    /// `ValidationError` for invalid configuration.
    pub async fn connect(loaded: LoadedConfig) -> Result<Self> {
        let LoadedConfig { credentials, client } = loaded;
        let mut builder = Self::builder(credentials);

        if let Some(url) = client.cache_url.as_deref() {
            match RedisSharedCache::connect(url, client.cache_timeout()).await {
                Ok(cache) => builder = builder.shared_cache(Arc::new(cache)),
                Err(err) => warn!(error = %err, "shared token cache unavailable, using in-process tokens"),
            }
        }

        builder.config(client).build()
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub(crate) fn batch_operations(&self) -> &BatchOperations {
        &self.batch
    }

    pub(crate) fn fetcher(&self) -> &PaginatedFetcher {
        &self.fetcher
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.executor.metrics().snapshot()
    }

    pub fn breaker_stats(&self) -> Vec<(Endpoint, CircuitStats)> {
        self.executor.breaker_stats()
    }

    pub fn reset_breaker(&self, endpoint: &Endpoint) {
        self.executor.reset_breaker(endpoint);
    }

    pub fn reset_all_breakers(&self) {
        self.executor.reset_all_breakers();
    }

    pub fn rate_limit_snapshot(&self, endpoint: &Endpoint) -> RateLimitSnapshot {
        self.executor.rate_limit_snapshot(endpoint)
    }

    /// One page of products matching `filter`
    #[instrument(skip(self, filter), fields(page = filter.page))]
    pub async fn list_products(&self, filter: &FilterQuery) -> Result<Page<Product>> {
        let endpoint = Endpoint::ListProducts;
        let request = ApiRequest::get(endpoint.path(None)).queries(filter.to_query_params());
        self.executor.send_json(&endpoint, "list_products", request, None).await
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &str) -> Result<Product> {
        let id = require_id("product id", id)?;
        let endpoint = Endpoint::GetProduct;
        let request = ApiRequest::get(endpoint.path(Some(id)));
        self.executor.send_json(&endpoint, "get_product", request, None).await
    }

    #[instrument(skip(self, filter), fields(page = filter.page))]
    pub async fn list_categories(&self, filter: &FilterQuery) -> Result<Page<Category>> {
        let endpoint = Endpoint::ListCategories;
        let request = ApiRequest::get(endpoint.path(None)).queries(filter.to_query_params());
        self.executor.send_json(&endpoint, "list_categories", request, None).await
    }

    /// Price breakdown if `product_id` were sold at `proposed_price`
    #[instrument(skip(self))]
    pub async fn simulate_price(&self, product_id: &str, proposed_price: f64) -> Result<PriceSimulation> {
        let product_id = require_id("product id", product_id)?;
        if !proposed_price.is_finite() || proposed_price <= 0.0 {
            return Err(CatalinkError::validation(format!(
                "proposed price must be positive, got {proposed_price}"
            )));
        }
        let endpoint = Endpoint::SimulatePrice;
        let request = ApiRequest::get(endpoint.path(Some(product_id)))
            .query("price", proposed_price.to_string());
        self.executor.send_json(&endpoint, "simulate_price", request, None).await
    }

    pub async fn health_check(&self) -> HealthReport {
        let report = self.executor.health_check().await;
        info!(reachable = report.reachable, status = ?report.status, "health check");
        report
    }
}

/// Trimmed id usable as one path segment
pub(crate) fn require_id<'a>(what: &str, id: &'a str) -> Result<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CatalinkError::validation(format!("{what} must not be empty")));
    }
    if id == "." || id == ".." {
        return Err(CatalinkError::validation(format!("{what} '{id}' is not a valid path segment")));
    }
    Ok(id)
}

/// Builder for [`CatalogClient`]
pub struct CatalogClientBuilder {
    credentials: Credentials,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    shared_cache: Option<Arc<dyn SharedCache>>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl CatalogClientBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials, config: ClientConfig::default(), transport: None, shared_cache: None, metrics: None }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the reqwest transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn shared_cache(mut self, cache: Arc<dyn SharedCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    pub fn metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    ///
    /// `ValidationError` for invalid configuration or base URL.
    pub fn build(self) -> Result<CatalogClient> {
        let config = self.config;
        let metrics = self.metrics.unwrap_or_default();

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::builder(config.base_url_for(self.credentials.environment))
                    .timeout(config.request_timeout())
                    .user_agent(concat!("catalink/", env!("CARGO_PKG_VERSION")))
                    .build()?,
            ),
        };

        let batch = BatchOperations::new((&config.batch).into()).with_metrics(metrics.clone());
        let fetcher = PaginatedFetcher::new((&config.batch).into()).with_metrics(metrics.clone());

        let mut executor = RequestExecutor::builder(transport, self.credentials)
            .config(config)
            .metrics(metrics);
        if let Some(cache) = self.shared_cache {
            executor = executor.shared_cache(cache);
        }

        Ok(CatalogClient { executor: Arc::new(executor.build()?), batch, fetcher })
    }
}
