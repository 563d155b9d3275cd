//! Incremental synchronisation of one remote collection into a local store
//!
//! A run:
//! 1. fetches records changed since the checkpoint
//! 2. classifies each against the store (new, updated, unchanged)
//! 3. resolves disagreements with the configured [`ConflictResolver`]
//! 4. advances the checkpoint, only if nothing failed
//!
//! Records whose content checksum matches the local copy count as
//! unchanged, so re-fetching the checkpoint boundary is harmless.

use std::sync::Arc;
use std::time::{Duration, Instant};

use catalink_domain::{
    CatalinkError, ChangeKind, ConflictRecord, Result, SyncCheckpoint, SyncEntity,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::conflict::{ConflictResolver, Resolution};
use super::ports::{CatalogStore, ChangeFeed};
use super::reconcile::{content_checksum, reconcile, ReconciliationReport};

/// Outcome of one delta run
#[derive(Debug, Clone)]
pub struct DeltaReport<T> {
    /// Ids written, with how they related to local state
    pub applied: Vec<(String, ChangeKind)>,
    pub unchanged: usize,
    /// Ids where the resolver kept the local copy
    pub kept_local: Vec<String>,
    /// Conflicts queued for manual review
    pub conflicts: Vec<ConflictRecord<T>>,
    /// Per-entity store or merge failures
    pub failures: Vec<(String, CatalinkError)>,
    /// Failed remote pages
    pub fetch_failures: Vec<(usize, CatalinkError)>,
    pub checkpoint_advanced: bool,
    pub elapsed: Duration,
}

impl<T> Default for DeltaReport<T> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            unchanged: 0,
            kept_local: Vec::new(),
            conflicts: Vec::new(),
            failures: Vec::new(),
            fetch_failures: Vec::new(),
            checkpoint_advanced: false,
            elapsed: Duration::ZERO,
        }
    }
}

impl<T> DeltaReport<T> {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.applied.iter().filter(|(_, applied)| *applied == kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.fetch_failures.is_empty()
    }
}

pub struct DeltaSync<T: SyncEntity> {
    feed: Arc<dyn ChangeFeed<T>>,
    store: Arc<dyn CatalogStore<T>>,
    resolver: ConflictResolver<T>,
}

impl<T: SyncEntity> std::fmt::Debug for DeltaSync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaSync").field("resolver", &self.resolver).finish_non_exhaustive()
    }
}

impl<T> DeltaSync<T>
where
    T: SyncEntity + Serialize + DeserializeOwned,
{
    pub fn new(feed: Arc<dyn ChangeFeed<T>>, store: Arc<dyn CatalogStore<T>>) -> Self {
        Self { feed, store, resolver: ConflictResolver::default() }
    }

    pub fn with_resolver(mut self, resolver: ConflictResolver<T>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run one delta pass and move `checkpoint` forward on success
    ///
    /// The checkpoint advances to the newest remote `updated_at` seen, or to
    /// the run's start time when no fetched record carries one. It never
    /// moves backwards and stays put if any page or entity failed.
    ///
    /// # Errors
    ///
    /// Only when the remote fetch failed outright (no page succeeded).
    pub async fn run(&self, checkpoint: &mut SyncCheckpoint) -> Result<DeltaReport<T>> {
        let started = Instant::now();
        let run_started_at = Utc::now();
        let fetched = self.feed.changed_since(checkpoint.last_synced_at).await;

        if fetched.successes.is_empty() {
            if let Some((page, err)) = fetched.failures.first() {
                warn!(stream = %checkpoint.stream, page, error = %err, "delta fetch failed");
                return Err(err.clone().with_context("stream", checkpoint.stream.clone()));
            }
        }

        let mut report = DeltaReport { fetch_failures: fetched.failures, ..DeltaReport::default() };
        let newest = fetched.successes.iter().filter_map(|(_, entity)| entity.updated_at()).max();

        for (_, remote) in fetched.successes {
            let id = remote.entity_id().to_string();
            if let Err(err) = self.apply(remote, &mut report).await {
                debug!(entity_id = %id, error = %err, "failed to apply remote change");
                report.failures.push((id, err));
            }
        }

        if report.is_clean() {
            report.checkpoint_advanced = checkpoint.advance(newest.unwrap_or(run_started_at));
        }
        report.elapsed = started.elapsed();

        info!(
            stream = %checkpoint.stream,
            new = report.count(ChangeKind::New),
            updated = report.count(ChangeKind::Updated),
            unchanged = report.unchanged,
            manual_review = report.conflicts.len(),
            failures = report.failures.len() + report.fetch_failures.len(),
            "delta sync finished"
        );
        Ok(report)
    }

    async fn apply(&self, remote: T, report: &mut DeltaReport<T>) -> Result<()> {
        let id = remote.entity_id().to_string();
        let Some(local) = self.store.get(&id).await? else {
            self.store.upsert(remote).await?;
            report.applied.push((id, ChangeKind::New));
            return Ok(());
        };

        if content_checksum(&local)? == content_checksum(&remote)? {
            report.unchanged += 1;
            return Ok(());
        }

        let resolution = self.resolver.resolve(&local, &remote)?;
        let outcome = resolution.outcome();
        match resolution {
            Resolution::UseRemote(entity) | Resolution::Merged(entity) => {
                self.store.upsert(entity).await?;
                report.applied.push((id, ChangeKind::Updated));
            }
            Resolution::KeepLocal => report.kept_local.push(id),
            Resolution::ManualReview => report.conflicts.push(ConflictRecord {
                entity_id: id,
                local,
                remote,
                outcome,
                detected_at: Utc::now(),
            }),
        }
        Ok(())
    }

    /// Full comparison of the store against the remote collection
    ///
    /// # Errors
    ///
    /// `BatchPartialFailure` if any remote page failed.
    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let remote = self.feed.changed_since(None).await;
        if let Some(err) = remote.partial_failure_error() {
            return Err(err.with_context("phase", "reconciliation"));
        }
        let remote = remote.into_values();
        let local = self.store.list().await?;
        let report = reconcile(&local, &remote)?;
        if !report.is_clean() {
            warn!(
                missing_locally = report.missing_locally.len(),
                missing_remotely = report.missing_remotely.len(),
                drifted = report.drifted.len(),
                "reconciliation found drift"
            );
        }
        Ok(report)
    }
}

