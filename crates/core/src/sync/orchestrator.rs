//! Coordination of several sync streams
//!
//! Parallel mode treats streams as independent failure domains. Sequential
//! mode is for dependent streams (e.g. categories before products): once a
//! stream fails outright, the remaining ones are skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalink_domain::{CatalinkError, ChangeKind, Result, SyncCheckpoint, SyncEntity};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use super::delta::DeltaSync;
use super::reconcile::ReconciliationReport;

/// Counts from one stream run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub kept_local: usize,
    pub manual_review: usize,
    /// Entity and page failures
    pub failures: usize,
    pub checkpoint_advanced: bool,
}

/// One independently checkpointed sync unit
#[async_trait]
pub trait SyncStream: Send + Sync {
    fn name(&self) -> &str;

    /// Run once from `checkpoint`, advancing it on success
    async fn sync(&self, checkpoint: &mut SyncCheckpoint) -> Result<StreamSummary>;

    async fn reconcile(&self) -> Result<ReconciliationReport>;
}

/// [`SyncStream`] over a [`DeltaSync`]
pub struct DeltaSyncStream<T: SyncEntity> {
    name: String,
    delta: DeltaSync<T>,
}

impl<T: SyncEntity> DeltaSyncStream<T> {
    pub fn new(name: impl Into<String>, delta: DeltaSync<T>) -> Self {
        Self { name: name.into(), delta }
    }
}

#[async_trait]
impl<T> SyncStream for DeltaSyncStream<T>
where
    T: SyncEntity + Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(&self, checkpoint: &mut SyncCheckpoint) -> Result<StreamSummary> {
        let report = self.delta.run(checkpoint).await?;
        Ok(StreamSummary {
            new: report.count(ChangeKind::New),
            updated: report.count(ChangeKind::Updated),
            unchanged: report.unchanged,
            kept_local: report.kept_local.len(),
            manual_review: report.conflicts.len(),
            failures: report.failures.len() + report.fetch_failures.len(),
            checkpoint_advanced: report.checkpoint_advanced,
        })
    }

    async fn reconcile(&self) -> Result<ReconciliationReport> {
        self.delta.reconcile().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    Completed(StreamSummary),
    Failed(CatalinkError),
    /// Not run because an earlier stream failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub stream: String,
    pub status: StreamStatus,
}

/// Aggregated outcome of one orchestrated run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// One entry per stream, in registration order
    pub outcomes: Vec<StreamOutcome>,
    pub elapsed: Duration,
}

impl SyncReport {
    /// Every stream completed without entity or page failures
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|outcome| {
            matches!(&outcome.status, StreamStatus::Completed(summary) if summary.failures == 0)
        })
    }

    pub fn failed_streams(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, StreamStatus::Failed(_)))
            .map(|outcome| outcome.stream.as_str())
            .collect()
    }

    pub fn outcome(&self, stream: &str) -> Option<&StreamStatus> {
        self.outcomes.iter().find(|outcome| outcome.stream == stream).map(|outcome| &outcome.status)
    }
}

#[derive(Default)]
pub struct SyncOrchestrator {
    streams: Vec<Arc<dyn SyncStream>>,
    mode: SyncMode,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.streams.iter().map(|stream| stream.name()).collect();
        f.debug_struct("SyncOrchestrator").field("streams", &names).field("mode", &self.mode).finish()
    }
}

impl SyncOrchestrator {
    pub fn new(mode: SyncMode) -> Self {
        Self { streams: Vec::new(), mode }
    }

    pub fn with_stream(mut self, stream: Arc<dyn SyncStream>) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Run every stream once
    ///
    /// Checkpoints are keyed by stream name; missing ones start from
    /// scratch and are inserted.
    pub async fn run(&self, checkpoints: &mut HashMap<String, SyncCheckpoint>) -> SyncReport {
        let started = Instant::now();
        let outcomes = match self.mode {
            SyncMode::Parallel => self.run_parallel(checkpoints).await,
            SyncMode::Sequential => self.run_sequential(checkpoints).await,
        };
        let report = SyncReport { outcomes, elapsed: started.elapsed() };
        info!(
            streams = report.outcomes.len(),
            failed = report.failed_streams().len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "sync run finished"
        );
        report
    }

    async fn run_parallel(
        &self,
        checkpoints: &mut HashMap<String, SyncCheckpoint>,
    ) -> Vec<StreamOutcome> {
        let runs = self.streams.iter().map(|stream| {
            let mut checkpoint = take_checkpoint(checkpoints, stream.name());
            async move {
                let result = stream.sync(&mut checkpoint).await;
                (checkpoint, outcome(stream.name(), result))
            }
        });
        // Checkpoints are taken eagerly before any future is polled.
        let runs: Vec<_> = runs.collect();

        join_all(runs)
            .await
            .into_iter()
            .map(|(checkpoint, outcome)| {
                checkpoints.insert(checkpoint.stream.clone(), checkpoint);
                outcome
            })
            .collect()
    }

    async fn run_sequential(
        &self,
        checkpoints: &mut HashMap<String, SyncCheckpoint>,
    ) -> Vec<StreamOutcome> {
        let mut outcomes = Vec::with_capacity(self.streams.len());
        let mut halted = false;

        for stream in &self.streams {
            if halted {
                warn!(stream = stream.name(), "skipping stream after earlier failure");
                outcomes.push(StreamOutcome {
                    stream: stream.name().to_string(),
                    status: StreamStatus::Skipped,
                });
                continue;
            }
            let mut checkpoint = take_checkpoint(checkpoints, stream.name());
            let result = stream.sync(&mut checkpoint).await;
            checkpoints.insert(checkpoint.stream.clone(), checkpoint);

            let outcome = outcome(stream.name(), result);
            halted = matches!(outcome.status, StreamStatus::Failed(_));
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Reconcile every stream, in registration order
    pub async fn reconcile_all(&self) -> Vec<(String, Result<ReconciliationReport>)> {
        let mut reports = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            reports.push((stream.name().to_string(), stream.reconcile().await));
        }
        reports
    }
}

fn take_checkpoint(
    checkpoints: &mut HashMap<String, SyncCheckpoint>,
    stream: &str,
) -> SyncCheckpoint {
    checkpoints.remove(stream).unwrap_or_else(|| SyncCheckpoint::initial(stream))
}

fn outcome(stream: &str, result: Result<StreamSummary>) -> StreamOutcome {
    let status = match result {
        Ok(summary) => {
            info!(stream, new = summary.new, updated = summary.updated, "stream synced");
            StreamStatus::Completed(summary)
        }
        Err(err) => {
            error!(stream, error = %err, "stream failed");
            StreamStatus::Failed(err)
        }
    };
    StreamOutcome { stream: stream.to_string(), status }
}
