//! Bulk operations with partial-failure tolerance
//!
//! - [`BatchOperations`]: run one operation over many inputs in bounded
//!   concurrent chunks
//! - [`PaginatedFetcher`]: walk every page of a listing
//!
//! Neither raises on partial failure; both return a [`BatchResult`].

pub mod fetcher;
pub mod operations;
pub mod result;

pub use fetcher::{FetchOptions, FetchProgress, PaginatedFetcher};
pub use operations::{BatchOperations, BatchOptions, FailurePolicy};
pub use result::BatchResult;
