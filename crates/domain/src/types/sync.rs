//! Delta-synchronisation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{Category, Product};
use crate::impl_wire_name;

/// Anything that can take part in a delta sync
///
/// Entities are matched by `entity_id` and ordered by `updated_at`.
pub trait SyncEntity: Clone + Send + Sync + 'static {
    fn entity_id(&self) -> &str;

    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

impl SyncEntity for Product {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl SyncEntity for Category {
    fn entity_id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// Position of one sync stream
///
/// Owned and persisted by the caller. A checkpoint never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub stream: String,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl SyncCheckpoint {
    /// Checkpoint that has never synced; the first run is a full fetch.
    pub fn initial(stream: impl Into<String>) -> Self {
        Self { stream: stream.into(), last_synced_at: None, cursor: None }
    }

    pub fn at(stream: impl Into<String>, last_synced_at: DateTime<Utc>) -> Self {
        Self { stream: stream.into(), last_synced_at: Some(last_synced_at), cursor: None }
    }

    /// Move the checkpoint forward to `to`
    ///
    /// Returns `false` and leaves the checkpoint untouched when `to` is not
    /// later than the current position.
    pub fn advance(&mut self, to: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            Some(current) if to <= current => false,
            _ => {
                self.last_synced_at = Some(to);
                true
            }
        }
    }
}

/// How a fetched record relates to local state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Updated,
}

/// Built-in conflict resolution policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Remote (source) version always replaces the local one
    #[default]
    SourceWins,
    /// Local (destination) version is always kept
    DestinationWins,
    /// Version with the later `updated_at` wins
    NewerWins,
    /// Union of both versions' fields, remote values win on overlap
    FieldMerge,
    /// Leave local untouched and queue the conflict for a human
    ManualReview,
}

impl_wire_name!(ConflictStrategy {
    SourceWins => "source_wins",
    DestinationWins => "destination_wins",
    NewerWins => "newer_wins",
    FieldMerge => "field_merge",
    ManualReview => "manual_review",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictOutcome {
    KeptLocal,
    KeptRemote,
    Merged,
    NeedsManualReview,
}

/// A detected disagreement between local and remote versions of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord<T> {
    pub entity_id: String,
    pub local: T,
    pub remote: T,
    pub outcome: ConflictOutcome,
    pub detected_at: DateTime<Utc>,
}
