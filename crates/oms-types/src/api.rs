//! API types for the order service HTTP API.
//!
//! Request bodies, response shapes and the structured error type returned by
//! every endpoint. Field names follow the order JSON consumed by the
//! storefront (`customer_id`, `total_amount`, `timeline`, ...).

use crate::{Order, OrderStatus, PaymentOutcome, Product, TimelineEvent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Request to place a new order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
	#[validate(length(min = 1, message = "customer_id must not be empty"))]
	pub customer_id: String,
	#[validate(length(min = 1, message = "product_id must not be empty"))]
	pub product_id: String,
	#[validate(range(min = 1, message = "quantity must be a positive integer"))]
	pub quantity: i64,
}

/// Request to pay for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayOrderRequest {
	/// Must equal the order's total amount.
	pub amount: Decimal,
}

/// Query parameters for listing orders.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListOrdersQuery {
	#[validate(length(min = 1, message = "customer_id must not be empty"))]
	pub customer_id: String,
}

/// Terminal status pushed by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
	Completed,
	Failed,
}

/// Payment status update pushed by the processor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentNotification {
	/// Unique id of this delivery, used to drop duplicates.
	#[validate(length(min = 1, message = "notification_id must not be empty"))]
	pub notification_id: String,
	#[validate(length(min = 1, message = "order_id must not be empty"))]
	pub order_id: String,
	/// Idempotency key of the attempt the update refers to.
	#[validate(length(min = 1, message = "idempotency_key must not be empty"))]
	pub idempotency_key: String,
	pub status: NotificationStatus,
}

/// Order representation returned by every order endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
	pub id: String,
	pub customer_id: String,
	pub product: Product,
	pub quantity: u32,
	pub total_amount: Decimal,
	pub status: OrderStatus,
	/// Idempotency key of the latest payment attempt.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payment_id: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	/// Timeline sorted by timestamp for display.
	pub timeline: Vec<TimelineEvent>,
}

impl From<&Order> for OrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			id: order.id.clone(),
			customer_id: order.customer_id.clone(),
			product: order.product.clone(),
			quantity: order.quantity,
			total_amount: order.total_amount,
			status: order.status,
			payment_id: order
				.payment
				.as_ref()
				.map(|attempt| attempt.idempotency_key.to_string()),
			created_at: order.created_at,
			updated_at: order.updated_at,
			timeline: order.timeline.view(),
		}
	}
}

/// Response to a pay request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayOrderResponse {
	pub order: OrderResponse,
	pub outcome: PaymentOutcome,
	/// Set when the outcome was not observed and the client should refresh.
	#[serde(rename = "reconciliationRequired")]
	pub reconciliation_required: bool,
}

/// Response listing a customer's orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOrdersResponse {
	pub orders: Vec<OrderResponse>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed or invalid input (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Unknown resource (404)
	NotFound { error_type: String, message: String },
	/// Request conflicts with the resource's current state (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Dependency unavailable, retry later (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::Conflict {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone(), None),
			APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, None, *retry_after),
		};
		ErrorResponse {
			error: error.clone(),
			message: message.clone(),
			details,
			retry_after,
		}
	}

	/// Builds a 400 from failed request validation.
	pub fn from_validation(errors: validator::ValidationErrors) -> Self {
		APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message: errors.to_string(),
			details: serde_json::to_value(&errors).ok(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
