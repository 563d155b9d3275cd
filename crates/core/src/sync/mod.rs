//! Delta synchronisation of catalog collections
//!
//! Each collection is a stream with its own checkpoint. [`DeltaSync`] moves
//! one stream forward; [`SyncOrchestrator`] runs several of them.

pub mod conflict;
pub mod delta;
pub mod orchestrator;
pub mod ports;
pub mod reconcile;

pub use conflict::{ConflictResolver, CustomResolver, Resolution};
pub use delta::{DeltaReport, DeltaSync};
pub use orchestrator::{
    DeltaSyncStream, StreamOutcome, StreamStatus, StreamSummary, SyncMode, SyncOrchestrator,
    SyncReport, SyncStream,
};
pub use reconcile::{content_checksum, reconcile, ReconciliationReport};
