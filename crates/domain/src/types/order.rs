//! Order lifecycle payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub price: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Key material released for a paid order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKeys {
    pub order_id: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Price breakdown for a proposed selling price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSimulation {
    pub final_price: f64,
    pub income: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
