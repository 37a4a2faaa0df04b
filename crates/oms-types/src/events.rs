//! Event types for inter-service communication.
//!
//! Lifecycle changes are broadcast on the in-process event bus so background
//! tasks (scheduled refreshes, logging) can react without coupling to the
//! request path.

use crate::{IdempotencyKey, OrderStatus, PaymentOutcome};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all order service events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OmsEvent {
	/// Events about order lifecycle changes.
	Order(OrderEvent),
	/// Events from the payment coordinator.
	Payment(PaymentEvent),
}

/// Events related to order lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A new order was persisted.
	Created { order_id: String, customer_id: String },
	/// An order moved from one status to another.
	StatusChanged {
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
	},
}

/// Events related to payment attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEvent {
	/// A charge was dispatched to the processor.
	Initiated {
		order_id: String,
		idempotency_key: IdempotencyKey,
	},
	/// A charge reached a terminal outcome.
	Resolved {
		order_id: String,
		idempotency_key: IdempotencyKey,
		outcome: PaymentOutcome,
	},
	/// The outcome of a charge was not observed; the order needs a refresh.
	Indeterminate {
		order_id: String,
		idempotency_key: IdempotencyKey,
	},
}
