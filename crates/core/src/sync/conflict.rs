//! Conflict resolution between a local record and its remote update

use std::sync::Arc;

use catalink_domain::{CatalinkError, ConflictOutcome, ConflictStrategy, Result, SyncEntity};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// What to store for a conflicting entity
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    KeepLocal,
    UseRemote(T),
    Merged(T),
    /// Leave local untouched and queue the conflict
    ManualReview,
}

impl<T> Resolution<T> {
    pub fn outcome(&self) -> ConflictOutcome {
        match self {
            Self::KeepLocal => ConflictOutcome::KeptLocal,
            Self::UseRemote(_) => ConflictOutcome::KeptRemote,
            Self::Merged(_) => ConflictOutcome::Merged,
            Self::ManualReview => ConflictOutcome::NeedsManualReview,
        }
    }
}

/// Caller-supplied resolution: `(local, remote) -> resolution`
pub type CustomResolver<T> = Arc<dyn Fn(&T, &T) -> Resolution<T> + Send + Sync>;

#[derive(Clone)]
enum Rule<T> {
    Builtin(ConflictStrategy),
    Custom(CustomResolver<T>),
}

#[derive(Clone)]
pub struct ConflictResolver<T> {
    rule: Rule<T>,
}

impl<T> std::fmt::Debug for ConflictResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rule {
            Rule::Builtin(strategy) => write!(f, "ConflictResolver({strategy})"),
            Rule::Custom(_) => f.write_str("ConflictResolver(custom)"),
        }
    }
}

impl<T> Default for ConflictResolver<T> {
    fn default() -> Self {
        Self::new(ConflictStrategy::default())
    }
}

impl<T> ConflictResolver<T> {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { rule: Rule::Builtin(strategy) }
    }

    pub fn custom(resolver: impl Fn(&T, &T) -> Resolution<T> + Send + Sync + 'static) -> Self {
        Self { rule: Rule::Custom(Arc::new(resolver)) }
    }
}

impl<T> ConflictResolver<T>
where
    T: SyncEntity + Serialize + DeserializeOwned,
{
    /// Resolve a disagreement between `local` and `remote`
    ///
    /// `NewerWins` compares `updated_at`: ties go to remote, and a side
    /// with a timestamp beats one without.
    ///
    /// # Errors
    ///
    /// `SyncConflict` when a field merge produces a record that no longer
    /// deserialises.
    pub fn resolve(&self, local: &T, remote: &T) -> Result<Resolution<T>> {
        let strategy = match &self.rule {
            Rule::Custom(resolver) => return Ok(resolver(local, remote)),
            Rule::Builtin(strategy) => *strategy,
        };

        Ok(match strategy {
            ConflictStrategy::SourceWins => Resolution::UseRemote(remote.clone()),
            ConflictStrategy::DestinationWins => Resolution::KeepLocal,
            ConflictStrategy::ManualReview => Resolution::ManualReview,
            ConflictStrategy::NewerWins => match (local.updated_at(), remote.updated_at()) {
                (Some(local_at), Some(remote_at)) if local_at > remote_at => Resolution::KeepLocal,
                (Some(_), None) => Resolution::KeepLocal,
                _ => Resolution::UseRemote(remote.clone()),
            },
            ConflictStrategy::FieldMerge => Resolution::Merged(merge_fields(local, remote)?),
        })
    }
}

/// Union of both records' fields; remote wins on overlap unless its value
/// is `null`. Nested objects merge recursively.
fn merge_fields<T>(local: &T, remote: &T) -> Result<T>
where
    T: SyncEntity + Serialize + DeserializeOwned,
{
    let conflict = |err: serde_json::Error| {
        CatalinkError::sync_conflict(remote.entity_id(), format!("field merge failed: {err}"))
    };
    let mut merged = serde_json::to_value(local).map_err(conflict)?;
    let overlay = serde_json::to_value(remote).map_err(conflict)?;
    merge_value(&mut merged, overlay);
    serde_json::from_value(merged).map_err(conflict)
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}
