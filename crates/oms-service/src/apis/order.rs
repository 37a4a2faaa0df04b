//! Order endpoints.
//!
//! Validates request payloads, calls into the engine and shapes the result
//! into the API representation. Engine errors are mapped onto `APIError`,
//! which carries the HTTP status.

use oms_core::{OrderEngine, OrderServiceError};
use oms_types::{
	APIError, CreateOrderRequest, ListOrdersQuery, ListOrdersResponse, OrderResponse,
	PayOrderRequest, PayOrderResponse, PaymentNotification,
};
use tracing::warn;
use validator::Validate;

fn api_error(operation: &str, err: OrderServiceError) -> APIError {
	warn!("{} failed: {}", operation, err);
	APIError::from(err)
}

pub async fn create_order(
	engine: &OrderEngine,
	request: CreateOrderRequest,
) -> Result<OrderResponse, APIError> {
	request.validate().map_err(APIError::from_validation)?;
	let quantity = u32::try_from(request.quantity).map_err(|_| APIError::BadRequest {
		error_type: "VALIDATION_ERROR".to_string(),
		message: format!("quantity {} is out of range", request.quantity),
		details: None,
	})?;

	let order = engine
		.create_order(&request.customer_id, &request.product_id, quantity)
		.await
		.map_err(|e| api_error("Order creation", e))?;
	Ok(OrderResponse::from(&order))
}

pub async fn get_order(engine: &OrderEngine, order_id: &str) -> Result<OrderResponse, APIError> {
	let order = engine
		.get_order(order_id)
		.await
		.map_err(|e| api_error("Order retrieval", e))?;
	Ok(OrderResponse::from(&order))
}

pub async fn list_orders(
	engine: &OrderEngine,
	query: ListOrdersQuery,
) -> Result<ListOrdersResponse, APIError> {
	query.validate().map_err(APIError::from_validation)?;
	let orders = engine
		.list_orders(&query.customer_id)
		.await
		.map_err(|e| api_error("Order listing", e))?;
	Ok(ListOrdersResponse {
		orders: orders.iter().map(OrderResponse::from).collect(),
	})
}

pub async fn cancel_order(engine: &OrderEngine, order_id: &str) -> Result<OrderResponse, APIError> {
	let order = engine
		.cancel_order(order_id)
		.await
		.map_err(|e| api_error("Cancellation", e))?;
	Ok(OrderResponse::from(&order))
}

/// Pays an order. An unobserved processor outcome is not an error; the
/// response flags that the client should refresh later.
pub async fn pay_order(
	engine: &OrderEngine,
	order_id: &str,
	request: PayOrderRequest,
) -> Result<PayOrderResponse, APIError> {
	let report = engine
		.pay_order(order_id, request.amount)
		.await
		.map_err(|e| api_error("Payment", e))?;
	Ok(PayOrderResponse {
		order: OrderResponse::from(&report.order),
		outcome: report.outcome,
		reconciliation_required: report.reconciliation_required(),
	})
}

pub async fn refresh_order(engine: &OrderEngine, order_id: &str) -> Result<OrderResponse, APIError> {
	let order = engine
		.refresh_order(order_id)
		.await
		.map_err(|e| api_error("Refresh", e))?;
	Ok(OrderResponse::from(&order))
}

pub async fn confirm_delivery(
	engine: &OrderEngine,
	order_id: &str,
) -> Result<OrderResponse, APIError> {
	let order = engine
		.confirm_delivery(order_id)
		.await
		.map_err(|e| api_error("Delivery confirmation", e))?;
	Ok(OrderResponse::from(&order))
}

pub async fn apply_payment_notification(
	engine: &OrderEngine,
	notification: PaymentNotification,
) -> Result<OrderResponse, APIError> {
	notification.validate().map_err(APIError::from_validation)?;
	let order = engine
		.apply_payment_notification(&notification)
		.await
		.map_err(|e| api_error("Payment notification", e))?;
	Ok(OrderResponse::from(&order))
}
