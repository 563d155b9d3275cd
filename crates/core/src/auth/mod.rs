//! Request authentication
//!
//! Two schemes: a signed static header for read endpoints and a cached
//! bearer token for order endpoints.

pub mod manager;
pub mod ports;
pub mod signature;

pub use manager::{AuthManager, CachedToken, TokenGrant};
pub use signature::signed_authorization;
