//! Webhook idempotency store with TTL-based retention

use std::time::Duration;

use async_trait::async_trait;
use catalink_core::IdempotencyStore;
use catalink_domain::constants::IDEMPOTENCY_RETENTION_SECS;
use catalink_domain::{IdempotencyState, Result};
use moka::sync::Cache;
use parking_lot::Mutex;

/// Default retention for idempotency keys (24 hours).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(IDEMPOTENCY_RETENTION_SECS);

/// In-process [`IdempotencyStore`].
///
/// Keys expire `retention` after their last state change. Claims are
/// serialised by a lock so two deliveries of one event cannot both win.
pub struct MokaIdempotencyStore {
    entries: Cache<String, IdempotencyState>,
    claim: Mutex<()>,
}

impl std::fmt::Debug for MokaIdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaIdempotencyStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for MokaIdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl MokaIdempotencyStore {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self { entries: Cache::builder().time_to_live(retention).build(), claim: Mutex::new(()) }
    }
}

#[async_trait]
impl IdempotencyStore for MokaIdempotencyStore {
    async fn try_begin(&self, key: &str) -> Result<Option<IdempotencyState>> {
        let _guard = self.claim.lock();
        match self.entries.get(key) {
            None | Some(IdempotencyState::Failed) => {
                self.entries.insert(key.to_string(), IdempotencyState::Processing);
                Ok(None)
            }
            Some(state) => Ok(Some(state)),
        }
    }

    async fn set_state(&self, key: &str, state: IdempotencyState) -> Result<()> {
        self.entries.insert(key.to_string(), state);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyState>> {
        Ok(self.entries.get(key))
    }
}
