//! Catalog API client
//!
//! - [`client`]: construction and catalog reads
//! - [`commands`]: order lifecycle writes
//! - [`batch`]: bulk and paginated fetches
//! - [`feeds`]: change feeds for delta sync

pub mod batch;
pub mod client;
pub mod commands;
pub mod feeds;

pub use client::{CatalogClient, CatalogClientBuilder};
pub use feeds::{CategoryFeed, ProductFeed};
