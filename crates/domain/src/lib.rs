//! # Catalink Domain
//!
//! Business domain types for the Catalink catalog/order client.
//!
//! This crate contains:
//! - The typed error taxonomy and `Result` alias
//! - Credentials and environment selection
//! - Catalog, order, sync and webhook records
//! - The filter query builder
//! - Client configuration structures and domain constants
//!
//! ## Architecture
//! - No dependencies on other Catalink crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod filter;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use filter::{FilterBuilder, FilterOp, FilterQuery, Predicate, SearchClause, SortDirection, SortKey};
pub use types::*;
