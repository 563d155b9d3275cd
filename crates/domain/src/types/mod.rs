//! Domain types and models

pub mod catalog;
pub mod credentials;
pub mod order;
pub mod sync;
pub mod webhook;

pub use catalog::{Category, Page, Product};
pub use credentials::{Credentials, Environment};
pub use order::{CreateOrderRequest, OrderCreated, OrderKeys, PaymentResult, PriceSimulation};
pub use sync::{
    ChangeKind, ConflictOutcome, ConflictRecord, ConflictStrategy, SyncCheckpoint, SyncEntity,
};
pub use webhook::{IdempotencyState, WebhookEvent};
