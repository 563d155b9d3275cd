//! Order lifecycle commands
//!
//! Writes use bearer tokens. Without an idempotency key a write is retried
//! only after failures proving the vendor never processed it.

use catalink_core::{ApiRequest, Endpoint};
use catalink_domain::{
    CatalinkError, CreateOrderRequest, OrderCreated, OrderKeys, PaymentResult, Result,
};
use tracing::{info, instrument};

use super::client::{require_id, CatalogClient};

impl CatalogClient {
    /// Reserve `product_id` at no more than `max_price`
    #[instrument(skip(self, order), fields(product_id = %order.product_id))]
    pub async fn create_order(
        &self,
        order: &CreateOrderRequest,
        idempotency_key: Option<&str>,
    ) -> Result<OrderCreated> {
        require_id("product id", &order.product_id)?;
        if order.max_price.is_some_and(|price| !price.is_finite() || price <= 0.0) {
            return Err(CatalinkError::validation("max price must be positive"));
        }

        let endpoint = Endpoint::CreateOrder;
        let request = ApiRequest::post(endpoint.path(None)).json(order)?;
        let created: OrderCreated =
            self.executor().send_json(&endpoint, "create_order", request, idempotency_key).await?;
        info!(order_id = %created.order_id, price = created.price, "order created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn pay_order(
        &self,
        order_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<PaymentResult> {
        let order_id = require_id("order id", order_id)?;
        let endpoint = Endpoint::PayOrder;
        let request = ApiRequest::post(endpoint.path(Some(order_id)));
        let result: PaymentResult =
            self.executor().send_json(&endpoint, "pay_order", request, idempotency_key).await?;
        info!(order_id, success = result.success, "order payment submitted");
        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn get_order_keys(&self, order_id: &str) -> Result<OrderKeys> {
        let order_id = require_id("order id", order_id)?;
        let endpoint = Endpoint::GetOrderKeys;
        let request = ApiRequest::get(endpoint.path(Some(order_id)));
        self.executor().send_json(&endpoint, "get_order_keys", request, None).await
    }
}
