//! Port interfaces for webhook processing

use async_trait::async_trait;
use catalink_domain::{IdempotencyState, Result};

/// Shared record of which events have been handled
///
/// Implementations own entry retention.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claim `key` for processing
    ///
    /// Returns `None` when the caller now owns the key (absent, or a
    /// previous attempt `Failed`), otherwise the state that blocked it.
    async fn try_begin(&self, key: &str) -> Result<Option<IdempotencyState>>;

    async fn set_state(&self, key: &str, state: IdempotencyState) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<IdempotencyState>>;
}
