//! Local catalog stores

pub mod memory;

pub use memory::InMemoryCatalogStore;
