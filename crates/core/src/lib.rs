//! # Catalink Core
//!
//! Transport-agnostic client logic.
//!
//! This crate contains:
//! - Port interfaces (transport, shared cache, change feeds, stores,
//!   idempotency store)
//! - Authentication, error mapping and retry policy
//! - The request executor every vendor call funnels through
//! - Batch execution, paginated fetch and delta synchronisation
//! - Webhook verification and de-duplication
//!
//! ## Architecture Principles
//! - Only depends on `catalink-common` and `catalink-domain`
//! - No HTTP, Redis or storage code
//! - All external dependencies via traits

pub mod api;
pub mod auth;
pub mod batch;
pub mod errors;
pub mod executor;
pub mod retry;
pub mod sync;
pub mod webhook;

// Re-export specific items to avoid ambiguity
pub use api::endpoint::{AuthScheme, Endpoint};
pub use api::ports::{ApiRequest, ApiResponse, HttpMethod, Transport, TransportError};
pub use auth::ports::SharedCache;
pub use auth::{AuthManager, CachedToken, TokenGrant};
pub use batch::{
    BatchOperations, BatchOptions, BatchResult, FailurePolicy, FetchOptions, FetchProgress,
    PaginatedFetcher,
};
pub use errors::ErrorMapper;
pub use executor::{HealthReport, RequestExecutor, RequestExecutorBuilder};
pub use retry::{KindPolicy, RetryOptions, RetryPolicyTable, RetryStrategy};
pub use sync::ports::{CatalogStore, ChangeFeed};
pub use sync::{
    ConflictResolver, DeltaReport, DeltaSync, DeltaSyncStream, ReconciliationReport, Resolution,
    StreamOutcome, StreamStatus, StreamSummary, SyncMode, SyncOrchestrator, SyncReport, SyncStream,
};
pub use webhook::ports::IdempotencyStore;
pub use webhook::{WebhookOutcome, WebhookProcessor};
