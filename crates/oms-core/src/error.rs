//! Errors surfaced by order operations.

use crate::state::TransitionError;
use oms_storage::StorageError;
use oms_types::{APIError, LifecycleEvent, OrderStatus};
use thiserror::Error;

/// Errors returned by the order service operations.
#[derive(Debug, Error)]
pub enum OrderServiceError {
	/// The request is malformed or inconsistent with the order.
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Order not found: {0}")]
	NotFound(String),
	/// The order's status does not accept the requested event.
	#[error("Cannot apply '{event}' to an order in status '{from}'")]
	InvalidTransition {
		from: OrderStatus,
		event: LifecycleEvent,
	},
	/// The payment processor is refusing service; nothing was changed.
	#[error("Payment processor unavailable: {message}")]
	ProcessorUnavailable {
		message: String,
		retry_after_secs: Option<u64>,
	},
	/// The order kept changing underneath a read-modify-write cycle.
	#[error("Order {0} was modified concurrently")]
	PersistenceConflict(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<TransitionError> for OrderServiceError {
	fn from(err: TransitionError) -> Self {
		match err {
			TransitionError::InvalidTransition { from, event } => {
				Self::InvalidTransition { from, event }
			},
		}
	}
}

impl From<StorageError> for OrderServiceError {
	fn from(err: StorageError) -> Self {
		Self::Storage(err.to_string())
	}
}

impl From<OrderServiceError> for APIError {
	fn from(err: OrderServiceError) -> Self {
		let message = err.to_string();
		match err {
			OrderServiceError::Validation(_) => APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message,
				details: None,
			},
			OrderServiceError::NotFound(_) => APIError::NotFound {
				error_type: "ORDER_NOT_FOUND".to_string(),
				message,
			},
			OrderServiceError::InvalidTransition { from, event } => APIError::Conflict {
				error_type: "INVALID_TRANSITION".to_string(),
				message,
				details: Some(serde_json::json!({
					"status": from,
					"event": event,
				})),
			},
			OrderServiceError::ProcessorUnavailable {
				retry_after_secs, ..
			} => APIError::ServiceUnavailable {
				error_type: "PROCESSOR_UNAVAILABLE".to_string(),
				message,
				retry_after: retry_after_secs,
			},
			OrderServiceError::PersistenceConflict(_) => APIError::ServiceUnavailable {
				error_type: "PERSISTENCE_CONFLICT".to_string(),
				message,
				retry_after: Some(1),
			},
			OrderServiceError::Storage(_) => APIError::InternalServerError {
				error_type: "STORAGE_ERROR".to_string(),
				message,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_api_error_mapping() {
		let cases = [
			(OrderServiceError::Validation("bad".into()), 400),
			(OrderServiceError::NotFound("o-1".into()), 404),
			(
				OrderServiceError::InvalidTransition {
					from: OrderStatus::Processing,
					event: LifecycleEvent::CancelRequested,
				},
				409,
			),
			(
				OrderServiceError::ProcessorUnavailable {
					message: "open".into(),
					retry_after_secs: Some(7),
				},
				503,
			),
			(OrderServiceError::PersistenceConflict("o-1".into()), 503),
			(OrderServiceError::Storage("disk".into()), 500),
		];
		for (err, status) in cases {
			assert_eq!(APIError::from(err).status_code(), status);
		}
	}

	#[test]
	fn test_retry_hint_is_carried() {
		let api: APIError = OrderServiceError::ProcessorUnavailable {
			message: "open".into(),
			retry_after_secs: Some(7),
		}
		.into();
		let body = api.to_error_response();
		assert_eq!(body.error, "PROCESSOR_UNAVAILABLE");
		assert_eq!(body.retry_after, Some(7));
	}

	#[test]
	fn test_invalid_transition_details() {
		let api: APIError = OrderServiceError::InvalidTransition {
			from: OrderStatus::Cancelled,
			event: LifecycleEvent::PaymentInitiated,
		}
		.into();
		let details = api.to_error_response().details.unwrap();
		assert_eq!(details["status"], "Cancelled");
		assert_eq!(details["event"], "PaymentInitiated");
	}
}
