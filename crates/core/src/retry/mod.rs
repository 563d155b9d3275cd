//! Per-error-kind retry policy on top of the generic retry executor

pub mod policy;
pub mod strategy;

pub use policy::{KindPolicy, RetryPolicyTable};
pub use strategy::{RetryOptions, RetryStrategy};
