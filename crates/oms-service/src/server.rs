//! HTTP server for the order service API.
//!
//! Routes every endpoint under `/api`, plus `/health`, onto the order
//! engine. Request bodies that fail to parse are answered with the same
//! structured error body as engine errors.

use axum::{
	extract::{
		rejection::{JsonRejection, QueryRejection},
		DefaultBodyLimit, Path, Query, State,
	},
	http::{HeaderName, HeaderValue, Method, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use oms_config::{ApiConfig, CorsConfig};
use oms_core::OrderEngine;
use oms_types::{
	APIError, CreateOrderRequest, ListOrdersQuery, ListOrdersResponse, OrderResponse,
	PayOrderRequest, PaymentNotification,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: OrderEngine,
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: OrderEngine,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order service API starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the API router with its middleware stack.
pub fn router(engine: OrderEngine, api_config: &ApiConfig) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_create_order).get(handle_list_orders))
				.route("/orders/{id}", get(handle_get_order))
				.route("/orders/{id}/cancel", post(handle_cancel_order))
				.route("/orders/{id}/pay", post(handle_pay_order))
				.route("/orders/{id}/refresh", post(handle_refresh_order))
				.route("/orders/{id}/deliver", post(handle_confirm_delivery))
				.route("/payments/notifications", post(handle_payment_notification)),
		)
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

/// Permissive CORS unless origins, methods and headers are configured.
fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origin = if cors.allowed_origins.iter().any(|o| o == "*") {
		AllowOrigin::from(Any)
	} else {
		AllowOrigin::list(parse_all(&cors.allowed_origins, |o| {
			HeaderValue::from_str(o).ok()
		}))
	};
	let methods = AllowMethods::list(parse_all(&cors.allowed_methods, |m| {
		Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok()
	}));
	let headers = AllowHeaders::list(parse_all(&cors.allowed_headers, |h| {
		HeaderName::from_bytes(h.as_bytes()).ok()
	}));

	CorsLayer::new()
		.allow_origin(origin)
		.allow_methods(methods)
		.allow_headers(headers)
}

fn parse_all<T>(values: &[String], parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
	values
		.iter()
		.filter_map(|value| {
			let parsed = parse(value);
			if parsed.is_none() {
				tracing::warn!("Ignoring invalid CORS entry '{}'", value);
			}
			parsed
		})
		.collect()
}

fn invalid_request(message: String) -> APIError {
	APIError::BadRequest {
		error_type: "INVALID_REQUEST".to_string(),
		message,
		details: None,
	}
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, APIError> {
	payload
		.map(|Json(body)| body)
		.map_err(|rejection| invalid_request(rejection.body_text()))
}

/// Handles POST /api/orders.
async fn handle_create_order(
	State(state): State<AppState>,
	payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), APIError> {
	let request = json_body(payload)?;
	let order = crate::apis::order::create_order(&state.engine, request).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /api/orders?customer_id=...
async fn handle_list_orders(
	State(state): State<AppState>,
	query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<ListOrdersResponse>, APIError> {
	let Query(query) = query.map_err(|rejection| invalid_request(rejection.body_text()))?;
	crate::apis::order::list_orders(&state.engine, query)
		.await
		.map(Json)
}

/// Handles GET /api/orders/{id}.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	crate::apis::order::get_order(&state.engine, &id)
		.await
		.map(Json)
}

/// Handles POST /api/orders/{id}/cancel.
async fn handle_cancel_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	crate::apis::order::cancel_order(&state.engine, &id)
		.await
		.map(Json)
}

/// Handles POST /api/orders/{id}/pay.
///
/// Answers 202 when the processor's outcome was not observed; the order is
/// then in Processing and the client should refresh it.
async fn handle_pay_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	payload: Result<Json<PayOrderRequest>, JsonRejection>,
) -> Result<Response, APIError> {
	let request = json_body(payload)?;
	let response = crate::apis::order::pay_order(&state.engine, &id, request).await?;
	let status = if response.reconciliation_required {
		StatusCode::ACCEPTED
	} else {
		StatusCode::OK
	};
	Ok((status, Json(response)).into_response())
}

/// Handles POST /api/orders/{id}/refresh.
async fn handle_refresh_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	crate::apis::order::refresh_order(&state.engine, &id)
		.await
		.map(Json)
}

/// Handles POST /api/orders/{id}/deliver.
async fn handle_confirm_delivery(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, APIError> {
	crate::apis::order::confirm_delivery(&state.engine, &id)
		.await
		.map(Json)
}

/// Handles POST /api/payments/notifications.
async fn handle_payment_notification(
	State(state): State<AppState>,
	payload: Result<Json<PaymentNotification>, JsonRejection>,
) -> Result<Json<OrderResponse>, APIError> {
	let notification = json_body(payload)?;
	crate::apis::order::apply_payment_notification(&state.engine, notification)
		.await
		.map(Json)
}

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "ok",
		"service": state.engine.config().service.id,
		"payment_processor": state.engine.payment().name(),
		"payment_circuit": format!("{:?}", state.engine.payment().circuit_state()),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use oms_config::builders::ConfigBuilder;
	use oms_payment::implementations::simulated::{ScriptedCharge, SimulatedConfig, SimulatedProcessor};
	use oms_payment::{CircuitBreaker, PaymentService};
	use oms_storage::implementations::memory::MemoryStorage;
	use oms_storage::StorageService;
	use serde_json::{json, Value};
	use std::sync::Arc;
	use std::time::Duration;
	use tower::ServiceExt;

	fn api_config() -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".to_string(),
			port: 3000,
			timeout_seconds: 30,
			max_request_size: 16 * 1024,
			cors: None,
		}
	}

	fn app(script: Vec<ScriptedCharge>) -> Router {
		let config = ConfigBuilder::new().build();
		let processor = Arc::new(SimulatedProcessor::with_script(
			SimulatedConfig {
				success_rate: 1.0,
				latency_ms: 0,
			},
			script,
		));
		let payment = Arc::new(PaymentService::new(
			"simulated".to_string(),
			processor,
			Duration::from_millis(config.payment.charge_timeout_ms),
			CircuitBreaker::new(5, Duration::from_secs(10)),
		));
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		router(OrderEngine::new(config, storage, payment), &api_config())
	}

	async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header("content-type", "application/json");
		let request = match body {
			Some(body) => request.body(Body::from(body.to_string())).unwrap(),
			None => request.body(Body::empty()).unwrap(),
		};
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, value)
	}

	async fn create(app: &Router, quantity: i64) -> String {
		let (status, body) = send(
			app,
			"POST",
			"/api/orders",
			Some(json!({"customer_id": "customer-1", "product_id": "widget", "quantity": quantity})),
		)
		.await;
		assert_eq!(status, StatusCode::CREATED);
		body["id"].as_str().unwrap().to_string()
	}

	fn timeline_names(body: &Value) -> Vec<&str> {
		body["timeline"]
			.as_array()
			.unwrap()
			.iter()
			.map(|entry| entry["name"].as_str().unwrap())
			.collect()
	}

	#[tokio::test]
	async fn test_create_and_pay_order() {
		let app = app(vec![ScriptedCharge::Succeed]);
		let id = create(&app, 3).await;

		let (status, order) = send(&app, "GET", &format!("/api/orders/{}", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(order["status"], "Created");
		assert_eq!(order["total_amount"], "30.00");

		let (status, paid) = send(
			&app,
			"POST",
			&format!("/api/orders/{}/pay", id),
			Some(json!({"amount": "30.00"})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(paid["outcome"], "succeeded");
		assert_eq!(paid["reconciliationRequired"], false);
		assert_eq!(paid["order"]["status"], "Confirmed");
		assert_eq!(
			timeline_names(&paid["order"]),
			vec!["Created", "Processing Payment", "Payment Completed"]
		);
		assert_eq!(
			paid["order"]["payment_id"],
			format!("{}-attempt-1", id).as_str()
		);
	}

	#[tokio::test]
	async fn test_unobserved_payment_is_accepted_then_refreshed() {
		let app = app(vec![ScriptedCharge::SucceedSilently]);
		let id = create(&app, 1).await;

		let (status, paid) = send(
			&app,
			"POST",
			&format!("/api/orders/{}/pay", id),
			Some(json!({"amount": "10.00"})),
		)
		.await;
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(paid["reconciliationRequired"], true);
		assert_eq!(paid["order"]["status"], "Processing");

		let (status, refreshed) =
			send(&app, "POST", &format!("/api/orders/{}/refresh", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(refreshed["status"], "Confirmed");
		assert_eq!(timeline_names(&refreshed), vec!["Created", "Payment Completed"]);
	}

	#[tokio::test]
	async fn test_invalid_transition_is_conflict() {
		let app = app(vec![ScriptedCharge::Succeed]);
		let id = create(&app, 1).await;
		send(
			&app,
			"POST",
			&format!("/api/orders/{}/pay", id),
			Some(json!({"amount": "10.00"})),
		)
		.await;

		let (status, body) = send(&app, "POST", &format!("/api/orders/{}/cancel", id), None).await;
		assert_eq!(status, StatusCode::CONFLICT);
		assert_eq!(body["error"], "INVALID_TRANSITION");
		assert_eq!(body["details"]["status"], "Confirmed");

		let (status, delivered) =
			send(&app, "POST", &format!("/api/orders/{}/deliver", id), None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(delivered["status"], "Delivered");
	}

	#[tokio::test]
	async fn test_amount_mismatch_is_bad_request() {
		let app = app(vec![]);
		let id = create(&app, 2).await;

		let (status, body) = send(
			&app,
			"POST",
			&format!("/api/orders/{}/pay", id),
			Some(json!({"amount": "19.99"})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");
	}

	#[tokio::test]
	async fn test_unknown_order_is_not_found() {
		let app = app(vec![]);
		let (status, body) = send(&app, "GET", "/api/orders/missing", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "ORDER_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_malformed_requests_are_rejected() {
		let app = app(vec![]);

		let (status, body) = send(
			&app,
			"POST",
			"/api/orders",
			Some(json!({"customer_id": "customer-1", "product_id": "widget", "quantity": 0})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "VALIDATION_ERROR");

		let (status, body) = send(
			&app,
			"POST",
			"/api/orders",
			Some(json!({"customer_id": "customer-1"})),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_REQUEST");

		let (status, _) = send(&app, "GET", "/api/orders", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn test_list_orders_for_customer() {
		let app = app(vec![]);
		create(&app, 1).await;
		create(&app, 2).await;

		let (status, body) = send(&app, "GET", "/api/orders?customer_id=customer-1", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["orders"].as_array().unwrap().len(), 2);

		let (status, body) = send(&app, "GET", "/api/orders?customer_id=nobody", None).await;
		assert_eq!(status, StatusCode::OK);
		assert!(body["orders"].as_array().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_payment_notification_is_confirmed_with_processor() {
		let app = app(vec![ScriptedCharge::DeclineSilently]);
		let id = create(&app, 1).await;
		let (status, paid) = send(
			&app,
			"POST",
			&format!("/api/orders/{}/pay", id),
			Some(json!({"amount": "10.00"})),
		)
		.await;
		assert_eq!(status, StatusCode::ACCEPTED);
		let key = paid["order"]["payment_id"].as_str().unwrap().to_string();

		let (status, order) = send(
			&app,
			"POST",
			"/api/payments/notifications",
			Some(json!({
				"notification_id": "n-1",
				"order_id": id,
				"idempotency_key": key,
				"status": "completed"
			})),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(order["status"], "Payment Failed");
		assert_ne!(order["status"], "Confirmed");
	}

	#[tokio::test]
	async fn test_health() {
		let app = app(vec![]);
		let (status, body) = send(&app, "GET", "/health", None).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "ok");
		assert_eq!(body["payment_circuit"], "Closed");
	}

	#[test]
	fn test_cors_layer_skips_invalid_entries() {
		let cors = CorsConfig {
			allowed_origins: vec!["https://shop.example".to_string(), "bad\norigin".to_string()],
			allowed_headers: vec!["content-type".to_string()],
			allowed_methods: vec!["get".to_string(), "post".to_string()],
		};
		let parsed = parse_all(&cors.allowed_origins, |o| HeaderValue::from_str(o).ok());
		assert_eq!(parsed.len(), 1);
		let _layer = cors_layer(Some(&cors));
	}
}
