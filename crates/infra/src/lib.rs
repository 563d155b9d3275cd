//! # Catalink Infrastructure
//!
//! Adapters behind the core ports, plus the assembled client.
//!
//! This crate contains:
//! - The reqwest HTTP transport
//! - Shared token caches (Redis, in-process moka) and the webhook
//!   idempotency store
//! - An in-memory catalog store
//! - Configuration loading and tracing setup
//! - [`CatalogClient`], the public entry point
//!
//! ## Architecture
//! - Implements traits defined in `catalink-core`
//! - Contains all "impure" code (network, cache backends, files)

pub mod api;
pub mod cache;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod store;

// Re-export commonly used items
pub use api::{CatalogClient, CatalogClientBuilder, CategoryFeed, ProductFeed};
pub use cache::{InMemorySharedCache, MokaIdempotencyStore, RedisSharedCache};
pub use config::{load, load_from_env, load_from_file, LoadedConfig};
pub use errors::InfraError;
pub use http::{HttpTransport, HttpTransportBuilder};
pub use observability::{init_tracing, LogFormat};
pub use store::InMemoryCatalogStore;
