//! Vendor API surface as seen by the core: endpoint identifiers and the
//! transport port.

pub mod endpoint;
pub mod ports;
