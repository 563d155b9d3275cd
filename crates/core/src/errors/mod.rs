//! Raw failure classification

pub mod mapper;

pub use mapper::ErrorMapper;
