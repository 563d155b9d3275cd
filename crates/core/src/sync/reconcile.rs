//! Drift detection between local and remote copies

use std::collections::BTreeMap;

use catalink_domain::{CatalinkError, Result, SyncEntity};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the entity's canonical JSON (object keys sorted)
pub fn content_checksum<T: Serialize>(entity: &T) -> Result<String> {
    // `Value` objects are BTreeMap-backed, so re-serialising sorts keys.
    let value = serde_json::to_value(entity)
        .map_err(|err| CatalinkError::validation(format!("entity is not serialisable: {err}")))?;
    let canonical = serde_json::to_string(&value)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Present remotely, absent locally
    pub missing_locally: Vec<String>,
    /// Present locally, absent remotely
    pub missing_remotely: Vec<String>,
    /// Present on both sides with different content
    pub drifted: Vec<String>,
    pub matched: usize,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.missing_locally.is_empty() && self.missing_remotely.is_empty() && self.drifted.is_empty()
    }
}

/// Compare full local and remote sets by id and checksum
///
/// Id lists in the report are sorted.
pub fn reconcile<T: SyncEntity + Serialize>(local: &[T], remote: &[T]) -> Result<ReconciliationReport> {
    let local_sums = checksums(local)?;
    let mut remote_sums = checksums(remote)?;
    let mut report = ReconciliationReport::default();

    for (id, local_sum) in local_sums {
        match remote_sums.remove(&id) {
            None => report.missing_remotely.push(id),
            Some(remote_sum) if remote_sum != local_sum => report.drifted.push(id),
            Some(_) => report.matched += 1,
        }
    }
    report.missing_locally = remote_sums.into_keys().collect();
    Ok(report)
}

fn checksums<T: SyncEntity + Serialize>(entities: &[T]) -> Result<BTreeMap<String, String>> {
    entities
        .iter()
        .map(|entity| Ok((entity.entity_id().to_string(), content_checksum(entity)?)))
        .collect()
}
