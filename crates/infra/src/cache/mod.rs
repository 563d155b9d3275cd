//! Shared token caches and the webhook idempotency store

pub mod idempotency;
pub mod memory;
pub mod redis;

pub use idempotency::MokaIdempotencyStore;
pub use memory::InMemorySharedCache;
pub use self::redis::RedisSharedCache;
