//! Endpoint identifiers
//!
//! Every resilience instance (breaker, per-endpoint bucket) is keyed by an
//! [`Endpoint`]. Runtime-registered endpoints use [`Endpoint::Custom`].

use std::fmt;
use std::sync::Arc;

/// How a request to an endpoint is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthScheme {
    /// `Authorization: <client id>, <key>` computed from credentials
    Signed,
    /// `Authorization: Bearer <token>` from the token endpoint
    Bearer,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListProducts,
    GetProduct,
    ListCategories,
    CreateOrder,
    PayOrder,
    GetOrderKeys,
    SimulatePrice,
    FetchToken,
    HealthCheck,
    /// Runtime-registered read endpoint (signed, idempotent)
    Custom(Arc<str>),
}

impl Endpoint {
    pub const BUILT_IN: [Self; 9] = [
        Self::ListProducts,
        Self::GetProduct,
        Self::ListCategories,
        Self::CreateOrder,
        Self::PayOrder,
        Self::GetOrderKeys,
        Self::SimulatePrice,
        Self::FetchToken,
        Self::HealthCheck,
    ];

    pub fn custom(name: impl Into<Arc<str>>) -> Self {
        Self::Custom(name.into())
    }

    /// Resolve a wire name; unknown names become `Custom`
    pub fn from_name(name: &str) -> Self {
        Self::BUILT_IN
            .into_iter()
            .find(|endpoint| endpoint.as_str() == name)
            .unwrap_or_else(|| Self::Custom(Arc::from(name)))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ListProducts => "list_products",
            Self::GetProduct => "get_product",
            Self::ListCategories => "list_categories",
            Self::CreateOrder => "create_order",
            Self::PayOrder => "pay_order",
            Self::GetOrderKeys => "get_order_keys",
            Self::SimulatePrice => "simulate_price",
            Self::FetchToken => "fetch_token",
            Self::HealthCheck => "health_check",
            Self::Custom(name) => name,
        }
    }

    /// Read/export endpoints are signed, write/import endpoints use bearer
    /// tokens.
    pub const fn auth_scheme(&self) -> AuthScheme {
        match self {
            Self::CreateOrder | Self::PayOrder | Self::GetOrderKeys => AuthScheme::Bearer,
            Self::HealthCheck => AuthScheme::None,
            Self::ListProducts
            | Self::GetProduct
            | Self::ListCategories
            | Self::SimulatePrice
            | Self::FetchToken
            | Self::Custom(_) => AuthScheme::Signed,
        }
    }

    /// Whether repeating a request can have no additional effect
    pub const fn is_idempotent(&self) -> bool {
        !matches!(self, Self::CreateOrder | Self::PayOrder)
    }

    /// Path template; `{id}` is replaced by [`path`](Self::path)
    pub fn path_template(&self) -> &str {
        match self {
            Self::ListProducts => "/products",
            Self::GetProduct => "/products/{id}",
            Self::ListCategories => "/categories",
            Self::CreateOrder => "/orders",
            Self::PayOrder => "/orders/{id}/pay",
            Self::GetOrderKeys => "/orders/{id}/keys",
            Self::SimulatePrice => "/products/{id}/price-simulation",
            Self::FetchToken => "/oauth/token",
            Self::HealthCheck => "/health",
            Self::Custom(name) => name,
        }
    }

    /// Concrete path with `{id}` filled in
    ///
    /// The id is percent-encoded as a single path segment, so `/`, `?` and
    /// `#` inside an id cannot reach another resource. URL parsers still
    /// resolve `.` and `..` segments; callers reject those ids.
    pub fn path(&self, id: Option<&str>) -> String {
        let template = self.path_template();
        match id {
            Some(id) => template.replace("{id}", &urlencoding::encode(id)),
            None => template.to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
