//! Conversions from adapter errors into transport and domain errors

pub mod conversions;

pub use conversions::{classify_reqwest, InfraError};
