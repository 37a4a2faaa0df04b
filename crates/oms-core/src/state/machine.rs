//! Order lifecycle state machine.
//!
//! Orders move Created -> Processing -> Confirmed -> Delivered on the happy
//! path. A declined payment parks the order in PaymentFailed, from where it
//! can be paid again or cancelled. Every accepted transition appends the
//! timeline entry of the status it enters.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use oms_types::{LifecycleEvent, Order, OrderStatus, TimelineEvent};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
	#[error("Invalid transition from {from} on {event}")]
	InvalidTransition {
		from: OrderStatus,
		event: LifecycleEvent,
	},
}

// Pairs absent from the table are rejected
static TRANSITIONS: Lazy<HashMap<(OrderStatus, LifecycleEvent), OrderStatus>> = Lazy::new(|| {
	use LifecycleEvent::*;

	HashMap::from([
		((OrderStatus::Created, CancelRequested), OrderStatus::Cancelled),
		((OrderStatus::Created, PaymentInitiated), OrderStatus::Processing),
		((OrderStatus::Processing, PaymentSucceeded), OrderStatus::Confirmed),
		((OrderStatus::Processing, PaymentFailed), OrderStatus::PaymentFailed),
		((OrderStatus::PaymentFailed, PaymentInitiated), OrderStatus::Processing),
		((OrderStatus::PaymentFailed, CancelRequested), OrderStatus::Cancelled),
		((OrderStatus::Confirmed, DeliveryConfirmed), OrderStatus::Delivered),
	])
});

/// Pure transition function over order statuses.
pub struct OrderStateMachine;

impl OrderStateMachine {
	/// Status reached from `from` on `event`.
	pub fn next_status(
		from: OrderStatus,
		event: LifecycleEvent,
	) -> Result<OrderStatus, TransitionError> {
		TRANSITIONS
			.get(&(from, event))
			.copied()
			.ok_or(TransitionError::InvalidTransition { from, event })
	}

	/// Applies `event` to `order`, appending the new status's timeline entry.
	///
	/// Returns the previous status. On error the order is untouched.
	pub fn apply(
		order: &mut Order,
		event: LifecycleEvent,
		at: DateTime<Utc>,
	) -> Result<OrderStatus, TransitionError> {
		let next = Self::next_status(order.status, event)?;
		order
			.timeline
			.append(TimelineEvent::new(next.timeline_label(), at));
		Ok(Self::enter(order, next, at))
	}

	/// Like [`apply`](Self::apply), but the timeline entry supersedes the
	/// latest dangling `Processing Payment` marker instead of following it.
	pub fn apply_superseding(
		order: &mut Order,
		event: LifecycleEvent,
		at: DateTime<Utc>,
	) -> Result<OrderStatus, TransitionError> {
		let next = Self::next_status(order.status, event)?;
		order
			.timeline
			.replace_latest_processing_with(TimelineEvent::new(next.timeline_label(), at));
		Ok(Self::enter(order, next, at))
	}

	fn enter(order: &mut Order, next: OrderStatus, at: DateTime<Utc>) -> OrderStatus {
		let previous = order.status;
		order.status = next;
		order.touch(at);
		previous
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use oms_types::{Product, Timeline, TimelineEventName};
	use rust_decimal::Decimal;

	const ALL_STATUSES: [OrderStatus; 6] = [
		OrderStatus::Created,
		OrderStatus::Processing,
		OrderStatus::Confirmed,
		OrderStatus::Delivered,
		OrderStatus::Cancelled,
		OrderStatus::PaymentFailed,
	];

	const ALL_EVENTS: [LifecycleEvent; 5] = [
		LifecycleEvent::CancelRequested,
		LifecycleEvent::PaymentInitiated,
		LifecycleEvent::PaymentSucceeded,
		LifecycleEvent::PaymentFailed,
		LifecycleEvent::DeliveryConfirmed,
	];

	fn order() -> Order {
		let now = Utc::now();
		let mut timeline = Timeline::new();
		timeline.append(TimelineEvent::new(TimelineEventName::Created, now));
		Order {
			id: "order-1".to_string(),
			customer_id: "customer-1".to_string(),
			product: Product {
				id: "widget".to_string(),
				name: "Widget".to_string(),
				price: Decimal::TEN,
			},
			quantity: 1,
			total_amount: Decimal::TEN,
			status: OrderStatus::Created,
			payment: None,
			created_at: now,
			updated_at: now,
			timeline,
			revision: 0,
		}
	}

	#[test]
	fn test_terminal_statuses_accept_nothing_payment_related() {
		for event in ALL_EVENTS {
			assert!(OrderStateMachine::next_status(OrderStatus::Cancelled, event).is_err());
			assert!(OrderStateMachine::next_status(OrderStatus::Delivered, event).is_err());
		}
		for event in [
			LifecycleEvent::CancelRequested,
			LifecycleEvent::PaymentInitiated,
			LifecycleEvent::PaymentSucceeded,
			LifecycleEvent::PaymentFailed,
		] {
			assert!(OrderStateMachine::next_status(OrderStatus::Confirmed, event).is_err());
		}
	}

	#[test]
	fn test_cancellation_rules() {
		let allowed: Vec<OrderStatus> = ALL_STATUSES
			.into_iter()
			.filter(|s| OrderStateMachine::next_status(*s, LifecycleEvent::CancelRequested).is_ok())
			.collect();
		assert_eq!(allowed, vec![OrderStatus::Created, OrderStatus::PaymentFailed]);
	}

	#[test]
	fn test_table_size() {
		let accepted = ALL_STATUSES
			.into_iter()
			.flat_map(|s| ALL_EVENTS.into_iter().map(move |e| (s, e)))
			.filter(|(s, e)| OrderStateMachine::next_status(*s, *e).is_ok())
			.count();
		assert_eq!(accepted, 7);
	}

	#[test]
	fn test_apply_appends_label_and_touches() {
		let mut order = order();
		let at = order.updated_at + chrono::Duration::seconds(5);

		let previous =
			OrderStateMachine::apply(&mut order, LifecycleEvent::PaymentInitiated, at).unwrap();

		assert_eq!(previous, OrderStatus::Created);
		assert_eq!(order.status, OrderStatus::Processing);
		assert_eq!(order.updated_at, at);
		assert_eq!(
			order.timeline.names(),
			vec![TimelineEventName::Created, TimelineEventName::ProcessingPayment]
		);
	}

	#[test]
	fn test_rejected_event_leaves_order_untouched() {
		let mut order = order();
		let before = order.clone();

		let err = OrderStateMachine::apply(&mut order, LifecycleEvent::PaymentSucceeded, Utc::now())
			.unwrap_err();

		assert_eq!(
			err,
			TransitionError::InvalidTransition {
				from: OrderStatus::Created,
				event: LifecycleEvent::PaymentSucceeded
			}
		);
		assert_eq!(order, before);
	}

	#[test]
	fn test_superseding_replaces_processing_marker() {
		let mut order = order();
		let now = Utc::now();
		OrderStateMachine::apply(&mut order, LifecycleEvent::PaymentInitiated, now).unwrap();
		OrderStateMachine::apply_superseding(&mut order, LifecycleEvent::PaymentSucceeded, now)
			.unwrap();

		assert_eq!(order.status, OrderStatus::Confirmed);
		assert_eq!(
			order.timeline.names(),
			vec![TimelineEventName::Created, TimelineEventName::PaymentCompleted]
		);
	}

	#[test]
	fn test_updated_at_never_moves_backwards() {
		let mut order = order();
		let earlier = order.updated_at - chrono::Duration::seconds(30);
		OrderStateMachine::apply(&mut order, LifecycleEvent::CancelRequested, earlier).unwrap();
		assert!(order.updated_at > earlier);
	}
}
