//! Delta sync of the product and category streams from a mock vendor API

use std::collections::HashMap;
use std::sync::Arc;

use catalink_core::{
    ChangeFeed, DeltaSync, DeltaSyncStream, StreamStatus, SyncMode, SyncOrchestrator,
};
use catalink_domain::{
    ClientConfig, Credentials, Environment, FilterBuilder, Product, SyncCheckpoint,
};
use catalink_infra::{CatalogClient, CategoryFeed, InMemoryCatalogStore, ProductFeed};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Arc<CatalogClient> {
    let mut config = ClientConfig::default();
    config.base_url = Some(server.uri());
    config.rate_limit.enabled = false;
    config.retry.max_retries = 0;
    config.batch.page_delay_ms = 0;
    config.batch.page_failure_backoff_ms = 1;

    let client = CatalogClient::builder(Credentials::new("client-1", "secret-1", Environment::Sandbox))
        .config(config)
        .build()
        .expect("client should build");
    Arc::new(client)
}

async fn mount_listing(server: &MockServer, resource: &str, items: serde_json::Value) {
    let total = items.as_array().map_or(0, Vec::len);
    Mock::given(method("GET"))
        .and(path(format!("/{resource}")))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": total, "page": 1, "items": items
        })))
        .mount(server)
        .await;
}

/// Validates a full orchestrated run over the HTTP stack.
///
/// # Test Steps
/// 1. Seed the product store with a stale copy of `p-1`
/// 2. Run both streams in parallel from a dated checkpoint
/// 3. `p-1` is updated, `p-2` and the category are new
/// 4. Both checkpoints advance to the newest remote timestamp
#[tokio::test]
async fn test_orchestrated_delta_sync_over_http() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        "products",
        json!([
            { "id": "p-1", "name": "Game", "price": 12.0, "updated_at": "2026-03-02T10:00:00Z" },
            { "id": "p-2", "name": "DLC", "price": 4.0, "updated_at": "2026-03-02T11:00:00Z" }
        ]),
    )
    .await;
    mount_listing(
        &server,
        "categories",
        json!([{ "id": "c-1", "name": "Games", "updated_at": "2026-03-01T09:00:00Z" }]),
    )
    .await;

    let client = client(&server);
    let mut stale = Product::new("p-1", "Game");
    stale.price = Some(10.0);
    stale.updated_at = Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
    let products = Arc::new(InMemoryCatalogStore::with_entities([stale]));
    let categories = Arc::new(InMemoryCatalogStore::new());

    let orchestrator = SyncOrchestrator::new(SyncMode::Parallel)
        .with_stream(Arc::new(DeltaSyncStream::new(
            "products",
            DeltaSync::new(Arc::new(ProductFeed::new(client.clone())), products.clone()),
        )))
        .with_stream(Arc::new(DeltaSyncStream::new(
            "categories",
            DeltaSync::new(Arc::new(CategoryFeed::new(client.clone())), categories.clone()),
        )));

    let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let mut checkpoints = HashMap::from([
        ("products".to_string(), SyncCheckpoint::at("products", since)),
        ("categories".to_string(), SyncCheckpoint::at("categories", since)),
    ]);

    let report = orchestrator.run(&mut checkpoints).await;

    assert!(report.is_success(), "report: {report:?}");
    let Some(StreamStatus::Completed(summary)) = report.outcome("products") else {
        panic!("products stream should complete");
    };
    assert_eq!((summary.new, summary.updated), (1, 1));
    assert_eq!(products.len(), 2);
    assert_eq!(categories.len(), 1);
    assert_eq!(
        checkpoints["products"].last_synced_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap())
    );
    assert_eq!(
        checkpoints["categories"].last_synced_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn test_failed_listing_keeps_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server);
    let store = Arc::new(InMemoryCatalogStore::<Product>::new());
    let delta = DeltaSync::new(Arc::new(ProductFeed::new(client)), store.clone());

    let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let mut checkpoint = SyncCheckpoint::at("products", since);
    assert!(delta.run(&mut checkpoint).await.is_err());
    assert_eq!(checkpoint.last_synced_at, Some(since));
    assert!(store.is_empty());
}

/// Validates that a filtered product feed keeps its filter on delta fetches.
///
/// Assertions:
/// - The delta listing carries both the region predicate and the
///   `updated_at` lower bound.
/// - Only that listing is requested and its product is returned.
#[tokio::test]
async fn test_filtered_feed_applies_filter_to_delta_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("filter[region][eq]", "EU"))
        .and(query_param("filter[updated_at][gte]", "2026-03-01T00:00:00.000Z"))
        .and(query_param("sort", "updated_at"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "page": 1,
            "items": [{ "id": "p-eu", "name": "EU key", "updated_at": "2026-03-02T10:00:00Z" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let feed = ProductFeed::new(client(&server))
        .with_filter(FilterBuilder::new().eq("region", "EU").build());
    let since = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    let result = feed.changed_since(Some(since)).await;

    assert!(result.failures.is_empty(), "failures: {:?}", result.failures);
    assert_eq!(result.successes.len(), 1);
    assert_eq!(result.successes[0].1.id, "p-eu");
}
