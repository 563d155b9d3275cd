//! Shared fixtures for `catalink-core` integration tests

#![allow(dead_code)]

pub mod stores;
pub mod transport;

use catalink_domain::{ClientConfig, Credentials, Environment};

pub fn credentials() -> Credentials {
    Credentials::new("client-1", "secret-1", Environment::Sandbox)
}

/// Fast, deterministic config: no rate limiting, no jitter, 1ms backoff
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.rate_limit.enabled = false;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 4;
    config.retry.jitter = false;
    config
}
