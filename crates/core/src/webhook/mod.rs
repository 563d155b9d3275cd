//! Inbound webhook verification and de-duplication

pub mod ports;
pub mod processor;
pub mod signature;

pub use processor::{WebhookOutcome, WebhookProcessor};
pub use signature::{compute_signature, verify_signature};
