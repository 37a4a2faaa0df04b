//! Payment processor types.
//!
//! Defines the idempotency key that identifies one payment attempt towards the
//! processor and the outcome vocabularies used when charging and when
//! re-querying a charge whose result was not observed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Idempotency key for one payment attempt of one order.
///
/// Derived deterministically from the order id and the attempt epoch, so a
/// resubmission of the same attempt always presents the same key and the
/// processor deduplicates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
	/// Key for attempt number `epoch` (starting at 1) of `order_id`.
	pub fn for_attempt(order_id: &str, epoch: u32) -> Self {
		Self(format!("{}-attempt-{}", order_id, epoch))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for IdempotencyKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for IdempotencyKey {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Result of dispatching a charge to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeOutcome {
	/// The processor captured the payment.
	Succeeded,
	/// The processor declined the payment.
	Failed { reason: String },
	/// The outcome was not observed (timeout, lost response, transport error).
	Indeterminate { reason: String },
}

impl ChargeOutcome {
	pub fn is_indeterminate(&self) -> bool {
		matches!(self, Self::Indeterminate { .. })
	}
}

/// Status reported by the processor when re-querying an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Succeeded,
	Failed,
	/// The processor knows the key but has not settled it yet.
	Pending,
	/// The processor has never seen the key.
	Unknown,
}

/// Outcome of a payment operation as reported to callers of the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
	Succeeded,
	Failed,
	Indeterminate,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_idempotency_key_is_deterministic_per_epoch() {
		let first = IdempotencyKey::for_attempt("order-1", 1);
		assert_eq!(first.as_str(), "order-1-attempt-1");
		assert_eq!(first, IdempotencyKey::for_attempt("order-1", 1));
		assert_ne!(first, IdempotencyKey::for_attempt("order-1", 2));
		assert_ne!(first, IdempotencyKey::for_attempt("order-2", 1));
	}
}
