//! Order types for the order service.
//!
//! An order captures one product line item bought by one customer, the total
//! frozen at creation, its lifecycle status, the current payment attempt and
//! the timeline of everything that happened to it.

use crate::{IdempotencyKey, Timeline, TimelineEventName};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog product, also used as the immutable line-item snapshot on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
	pub id: String,
	pub name: String,
	pub price: Decimal,
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
	/// Order has been placed and awaits payment.
	Created,
	/// A payment attempt is in flight.
	Processing,
	/// Payment has been captured.
	Confirmed,
	/// Goods have been delivered.
	Delivered,
	/// Order was cancelled before payment.
	Cancelled,
	/// The latest payment attempt was declined; payment may be retried.
	#[serde(rename = "Payment Failed")]
	PaymentFailed,
}

impl OrderStatus {
	/// Timeline entry appended when an order enters this status.
	pub fn timeline_label(&self) -> TimelineEventName {
		match self {
			Self::Created => TimelineEventName::Created,
			Self::Processing => TimelineEventName::ProcessingPayment,
			Self::Confirmed => TimelineEventName::PaymentCompleted,
			Self::Delivered => TimelineEventName::Delivered,
			Self::Cancelled => TimelineEventName::Cancelled,
			Self::PaymentFailed => TimelineEventName::PaymentFailed,
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Created => write!(f, "Created"),
			Self::Processing => write!(f, "Processing"),
			Self::Confirmed => write!(f, "Confirmed"),
			Self::Delivered => write!(f, "Delivered"),
			Self::Cancelled => write!(f, "Cancelled"),
			Self::PaymentFailed => write!(f, "Payment Failed"),
		}
	}
}

/// Events that drive the order state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
	CancelRequested,
	PaymentInitiated,
	PaymentSucceeded,
	PaymentFailed,
	DeliveryConfirmed,
}

impl fmt::Display for LifecycleEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::CancelRequested => write!(f, "cancel requested"),
			Self::PaymentInitiated => write!(f, "payment initiated"),
			Self::PaymentSucceeded => write!(f, "payment succeeded"),
			Self::PaymentFailed => write!(f, "payment failed"),
			Self::DeliveryConfirmed => write!(f, "delivery confirmed"),
		}
	}
}

/// Settlement state of a single payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
	Pending,
	Succeeded,
	Failed,
}

/// The payment attempt currently associated with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
	pub idempotency_key: IdempotencyKey,
	/// Attempt number, starting at 1.
	pub epoch: u32,
	pub amount: Decimal,
	pub outcome: AttemptOutcome,
	pub started_at: DateTime<Utc>,
}

/// A purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub id: String,
	pub customer_id: String,
	pub product: Product,
	pub quantity: u32,
	/// Unit price times quantity, computed once at creation.
	pub total_amount: Decimal,
	pub status: OrderStatus,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub payment: Option<PaymentAttempt>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub timeline: Timeline,
	/// Storage revision this copy was read at.
	#[serde(skip)]
	pub revision: u64,
}

impl Order {
	/// The attempt awaiting an outcome, if any.
	pub fn in_flight_attempt(&self) -> Option<&PaymentAttempt> {
		self.payment
			.as_ref()
			.filter(|attempt| attempt.outcome == AttemptOutcome::Pending)
	}

	/// Epoch the next payment attempt will use.
	pub fn next_payment_epoch(&self) -> u32 {
		self.payment.as_ref().map_or(1, |attempt| attempt.epoch + 1)
	}

	/// Moves `updated_at` forward to `at`, never backwards.
	pub fn touch(&mut self, at: DateTime<Utc>) {
		self.updated_at = crate::later_of(self.updated_at, at);
	}
}
