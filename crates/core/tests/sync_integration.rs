//! Delta sync and orchestration over in-memory feeds and stores

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use catalink_core::{
    ConflictResolver, DeltaSync, DeltaSyncStream, ReconciliationReport, StreamStatus,
    StreamSummary, SyncMode, SyncOrchestrator, SyncStream,
};
use catalink_domain::{
    CatalinkError, Category, ChangeKind, ConflictStrategy, ErrorKind, Product, Result, SyncCheckpoint,
};
use chrono::{Duration, TimeZone, Utc};
use support::stores::{FixedFeed, MapStore};

fn product(id: &str, price: f64, minute: u32) -> Product {
    let mut product = Product::new(id, format!("Product {id}"));
    product.price = Some(price);
    product.updated_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap());
    product
}

fn category(id: &str) -> Category {
    serde_json::from_value(serde_json::json!({ "id": id, "name": id })).unwrap()
}

/// Validates a delta pass with new, updated and unchanged records.
///
/// Assertions:
/// - Counts by change kind match the remote set.
/// - The store holds the remote versions.
/// - The checkpoint advances to the newest remote `updated_at`.
#[tokio::test]
async fn test_delta_run_classifies_and_advances() {
    let feed = Arc::new(FixedFeed::new(vec![
        product("p-1", 10.0, 1),
        product("p-2", 25.0, 5),
        product("p-3", 7.5, 3),
    ]));
    let store = Arc::new(MapStore::with(vec![product("p-1", 10.0, 1), product("p-2", 20.0, 0)]));
    let sync = DeltaSync::new(feed, store.clone());
    let mut checkpoint = SyncCheckpoint::initial("products");

    let report = sync.run(&mut checkpoint).await.unwrap();

    assert_eq!(report.count(ChangeKind::New), 1);
    assert_eq!(report.count(ChangeKind::Updated), 1);
    assert_eq!(report.unchanged, 1);
    assert!(report.is_clean());
    assert!(report.checkpoint_advanced);
    assert_eq!(store.snapshot("p-2").unwrap().price, Some(25.0));
    assert_eq!(store.len(), 3);
    assert_eq!(checkpoint.last_synced_at, Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap()));
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let remote = vec![product("p-1", 10.0, 1), product("p-2", 20.0, 2)];
    let feed = Arc::new(FixedFeed::new(remote));
    let store = Arc::new(MapStore::<Product>::default());
    let sync = DeltaSync::new(feed, store);
    let mut checkpoint = SyncCheckpoint::initial("products");

    sync.run(&mut checkpoint).await.unwrap();
    let again = sync.run(&mut checkpoint).await.unwrap();

    assert!(again.applied.is_empty());
    assert_eq!(again.unchanged, 1);
    assert!(!again.checkpoint_advanced);
}

#[tokio::test]
async fn test_manual_review_leaves_local_copy() {
    let feed = Arc::new(FixedFeed::new(vec![product("p-1", 99.0, 9)]));
    let store = Arc::new(MapStore::with(vec![product("p-1", 10.0, 1)]));
    let sync = DeltaSync::new(feed, store.clone())
        .with_resolver(ConflictResolver::new(ConflictStrategy::ManualReview));
    let mut checkpoint = SyncCheckpoint::initial("products");

    let report = sync.run(&mut checkpoint).await.unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].entity_id, "p-1");
    assert_eq!(report.conflicts[0].remote.price, Some(99.0));
    assert_eq!(store.snapshot("p-1").unwrap().price, Some(10.0));
}

#[tokio::test]
async fn test_failed_fetch_keeps_checkpoint() {
    let feed = Arc::new(FixedFeed::<Product>::failing(CatalinkError::timeout("page 1 timed out")));
    let sync = DeltaSync::new(feed, Arc::new(MapStore::<Product>::default()));
    let since = Utc::now() - Duration::hours(1);
    let mut checkpoint = SyncCheckpoint::at("products", since);

    let err = sync.run(&mut checkpoint).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.context.get("stream").map(String::as_str), Some("products"));
    assert_eq!(checkpoint.last_synced_at, Some(since));
}

#[tokio::test]
async fn test_reconcile_reports_drift() {
    let feed = Arc::new(FixedFeed::new(vec![product("p-1", 10.0, 1), product("p-2", 20.0, 2)]));
    let store = Arc::new(MapStore::with(vec![product("p-2", 21.0, 2), product("p-9", 1.0, 1)]));
    let sync = DeltaSync::new(feed, store);

    let report = sync.reconcile().await.unwrap();

    assert_eq!(report.missing_locally, vec!["p-1".to_string()]);
    assert_eq!(report.missing_remotely, vec!["p-9".to_string()]);
    assert_eq!(report.drifted, vec!["p-2".to_string()]);
    assert!(!report.is_clean());
}

/// Stream that fails every run
struct BrokenStream;

#[async_trait]
impl SyncStream for BrokenStream {
    fn name(&self) -> &str {
        "categories"
    }

    async fn sync(&self, _checkpoint: &mut SyncCheckpoint) -> Result<StreamSummary> {
        Err(CatalinkError::network("vendor unreachable"))
    }

    async fn reconcile(&self) -> Result<ReconciliationReport> {
        Err(CatalinkError::network("vendor unreachable"))
    }
}

fn product_stream(store: Arc<MapStore<Product>>) -> Arc<dyn SyncStream> {
    let feed = Arc::new(FixedFeed::new(vec![product("p-1", 10.0, 1)]));
    Arc::new(DeltaSyncStream::new("products", DeltaSync::new(feed, store)))
}

/// Validates failure isolation between parallel streams.
///
/// Assertions:
/// - The healthy stream completes and its checkpoint is stored.
/// - The failing stream is reported without affecting the other.
#[tokio::test]
async fn test_parallel_streams_fail_independently() {
    let store = Arc::new(MapStore::<Product>::default());
    let orchestrator = SyncOrchestrator::new(SyncMode::Parallel)
        .with_stream(Arc::new(BrokenStream))
        .with_stream(product_stream(store.clone()));
    let mut checkpoints = HashMap::new();

    let report = orchestrator.run(&mut checkpoints).await;

    assert!(!report.is_success());
    assert_eq!(report.failed_streams(), vec!["categories"]);
    let Some(StreamStatus::Completed(summary)) = report.outcome("products") else {
        panic!("products stream should complete");
    };
    assert_eq!(summary.new, 1);
    assert!(checkpoints["products"].last_synced_at.is_some());
    assert!(checkpoints["categories"].last_synced_at.is_none());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_sequential_mode_skips_after_failure() {
    let store = Arc::new(MapStore::<Product>::default());
    let orchestrator = SyncOrchestrator::new(SyncMode::Sequential)
        .with_stream(Arc::new(BrokenStream))
        .with_stream(product_stream(store.clone()));
    let mut checkpoints = HashMap::new();

    let report = orchestrator.run(&mut checkpoints).await;

    assert_eq!(report.outcome("products"), Some(&StreamStatus::Skipped));
    assert_eq!(store.len(), 0);
    assert!(!checkpoints.contains_key("products"));
}

#[tokio::test]
async fn test_two_streams_sync_and_reconcile() {
    let categories = Arc::new(FixedFeed::new(vec![category("c-1"), category("c-2")]));
    let category_store = Arc::new(MapStore::<Category>::default());
    let orchestrator = SyncOrchestrator::new(SyncMode::Sequential)
        .with_stream(Arc::new(DeltaSyncStream::new(
            "categories",
            DeltaSync::new(categories, category_store.clone()),
        )))
        .with_stream(product_stream(Arc::new(MapStore::default())));
    let mut checkpoints = HashMap::new();

    let report = orchestrator.run(&mut checkpoints).await;
    assert!(report.is_success());
    assert_eq!(category_store.len(), 2);

    let reconciled = orchestrator.reconcile_all().await;
    assert_eq!(reconciled.len(), 2);
    assert!(reconciled.iter().all(|(_, report)| report.as_ref().is_ok_and(|r| r.is_clean())));
}
