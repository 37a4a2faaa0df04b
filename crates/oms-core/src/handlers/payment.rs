//! Payment coordinator.
//!
//! Drives a payment attempt from initiation to a terminal outcome. The order
//! is moved to Processing and persisted before the processor is contacted, so
//! a crash mid-charge leaves an order that recovery can resolve. Outcomes
//! that were not observed are never guessed: the order stays in Processing
//! until a status query or a re-dispatch under the same idempotency key
//! settles it.

use crate::engine::event_bus::EventBus;
use crate::error::OrderServiceError;
use crate::state::{OrderRepository, OrderStateMachine};
use chrono::Utc;
use oms_payment::{PaymentError, PaymentService};
use oms_types::{
	truncate_id, AttemptOutcome, ChargeOutcome, IdempotencyKey, LifecycleEvent, OmsEvent, Order,
	OrderEvent, OrderStatus, PaymentAttempt, PaymentEvent, PaymentOutcome, PaymentStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;

/// What a payment request achieved.
#[derive(Debug, Clone)]
pub struct PaymentReport {
	pub order: Order,
	pub outcome: PaymentOutcome,
}

impl PaymentReport {
	/// Whether the caller has to refresh the order to learn the outcome.
	pub fn reconciliation_required(&self) -> bool {
		self.outcome == PaymentOutcome::Indeterminate
	}
}

/// How a terminal timeline entry is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
	/// Follows the `Processing Payment` entry of the same request.
	Append,
	/// Takes the place of the dangling `Processing Payment` entry.
	Supersede,
}

pub struct PaymentCoordinator {
	payment: Arc<PaymentService>,
	repository: Arc<OrderRepository>,
	event_bus: EventBus,
}

impl PaymentCoordinator {
	pub fn new(
		payment: Arc<PaymentService>,
		repository: Arc<OrderRepository>,
		event_bus: EventBus,
	) -> Self {
		Self {
			payment,
			repository,
			event_bus,
		}
	}

	fn unavailable(&self, err: PaymentError) -> OrderServiceError {
		OrderServiceError::ProcessorUnavailable {
			message: err.to_string(),
			retry_after_secs: self.payment.retry_after(),
		}
	}

	/// Starts a new payment attempt for `amount` and charges it.
	///
	/// The caller must hold the order's lock.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn initiate(
		&self,
		order_id: &str,
		amount: Decimal,
	) -> Result<PaymentReport, OrderServiceError> {
		self.payment
			.ensure_available()
			.map_err(|e| self.unavailable(e))?;

		let started = self
			.repository
			.modify(order_id, |order| {
				OrderStateMachine::next_status(order.status, LifecycleEvent::PaymentInitiated)?;
				if amount != order.total_amount {
					return Err(OrderServiceError::Validation(format!(
						"payment amount {} does not match order total {}",
						amount, order.total_amount
					)));
				}

				let now = Utc::now();
				let epoch = order.next_payment_epoch();
				OrderStateMachine::apply(order, LifecycleEvent::PaymentInitiated, now)?;
				order.payment = Some(PaymentAttempt {
					idempotency_key: IdempotencyKey::for_attempt(&order.id, epoch),
					epoch,
					amount,
					outcome: AttemptOutcome::Pending,
					started_at: now,
				});
				Ok(true)
			})
			.await?;

		let order = started.order;
		let key = order
			.in_flight_attempt()
			.map(|attempt| attempt.idempotency_key.clone())
			.ok_or_else(|| OrderServiceError::Storage("payment attempt was not persisted".into()))?;

		self.publish_status(&order.id, started.previous, order.status);
		self.event_bus
			.publish(OmsEvent::Payment(PaymentEvent::Initiated {
				order_id: order.id.clone(),
				idempotency_key: key.clone(),
			}))
			.ok();
		tracing::info!(idempotency_key = %key, amount = %amount, "Payment initiated");

		match self.payment.charge(&key, &order.id, amount).await {
			ChargeOutcome::Succeeded => self.settle(&order.id, &key, true, Placement::Append).await,
			ChargeOutcome::Failed { reason } => {
				tracing::info!(idempotency_key = %key, %reason, "Payment declined");
				self.settle(&order.id, &key, false, Placement::Append).await
			},
			ChargeOutcome::Indeterminate { .. } => Ok(self.indeterminate(order, key)),
		}
	}

	/// Re-queries the processor for the in-flight attempt and applies the
	/// outcome. A no-op unless the order is in Processing.
	///
	/// The caller must hold the order's lock.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn resolve(&self, order_id: &str) -> Result<PaymentReport, OrderServiceError> {
		let order = self.repository.get(order_id).await?;
		if order.status != OrderStatus::Processing {
			return Ok(settled_report(order));
		}
		let Some(attempt) = order.in_flight_attempt().cloned() else {
			tracing::warn!("Order is processing without an in-flight payment attempt");
			return Ok(PaymentReport {
				order,
				outcome: PaymentOutcome::Indeterminate,
			});
		};
		let key = attempt.idempotency_key;

		let status = self
			.payment
			.query_status(&key)
			.await
			.map_err(|e| self.unavailable(e))?;
		tracing::debug!(idempotency_key = %key, ?status, "Processor reported payment status");

		match status {
			PaymentStatus::Succeeded => self.settle(&order.id, &key, true, Placement::Supersede).await,
			PaymentStatus::Failed => self.settle(&order.id, &key, false, Placement::Supersede).await,
			PaymentStatus::Pending => Ok(PaymentReport {
				order,
				outcome: PaymentOutcome::Indeterminate,
			}),
			PaymentStatus::Unknown => {
				// The charge never arrived; resend it under the same key
				tracing::info!(idempotency_key = %key, "Processor has no record of the charge, re-dispatching");
				match self.payment.charge(&key, &order.id, attempt.amount).await {
					ChargeOutcome::Succeeded => {
						self.settle(&order.id, &key, true, Placement::Supersede).await
					},
					ChargeOutcome::Failed { .. } => {
						self.settle(&order.id, &key, false, Placement::Supersede).await
					},
					ChargeOutcome::Indeterminate { .. } => Ok(PaymentReport {
						order,
						outcome: PaymentOutcome::Indeterminate,
					}),
				}
			},
		}
	}

	fn indeterminate(&self, order: Order, key: IdempotencyKey) -> PaymentReport {
		self.event_bus
			.publish(OmsEvent::Payment(PaymentEvent::Indeterminate {
				order_id: order.id.clone(),
				idempotency_key: key,
			}))
			.ok();
		PaymentReport {
			order,
			outcome: PaymentOutcome::Indeterminate,
		}
	}

	/// Moves a processing order to its terminal payment status.
	async fn settle(
		&self,
		order_id: &str,
		key: &IdempotencyKey,
		succeeded: bool,
		placement: Placement,
	) -> Result<PaymentReport, OrderServiceError> {
		let event = if succeeded {
			LifecycleEvent::PaymentSucceeded
		} else {
			LifecycleEvent::PaymentFailed
		};

		let settled = self
			.repository
			.modify(order_id, |order| {
				let matches_in_flight = order.status == OrderStatus::Processing
					&& order
						.in_flight_attempt()
						.is_some_and(|attempt| attempt.idempotency_key == *key);
				if !matches_in_flight {
					return Ok(false);
				}

				let now = Utc::now();
				match placement {
					Placement::Append => OrderStateMachine::apply(order, event, now)?,
					Placement::Supersede => OrderStateMachine::apply_superseding(order, event, now)?,
				};
				if let Some(attempt) = order.payment.as_mut() {
					attempt.outcome = if succeeded {
						AttemptOutcome::Succeeded
					} else {
						AttemptOutcome::Failed
					};
				}
				Ok(true)
			})
			.await?;

		if !settled.changed {
			tracing::debug!(
				idempotency_key = %key,
				status = %settled.order.status,
				"Payment outcome does not match the in-flight attempt, ignoring"
			);
			return Ok(settled_report(settled.order));
		}

		let outcome = if succeeded {
			PaymentOutcome::Succeeded
		} else {
			PaymentOutcome::Failed
		};
		self.publish_status(&settled.order.id, settled.previous, settled.order.status);
		self.event_bus
			.publish(OmsEvent::Payment(PaymentEvent::Resolved {
				order_id: settled.order.id.clone(),
				idempotency_key: key.clone(),
				outcome,
			}))
			.ok();
		tracing::info!(
			idempotency_key = %key,
			status = %settled.order.status,
			"Payment resolved"
		);

		Ok(PaymentReport {
			order: settled.order,
			outcome,
		})
	}

	fn publish_status(&self, order_id: &str, from: OrderStatus, to: OrderStatus) {
		self.event_bus
			.publish(OmsEvent::Order(OrderEvent::StatusChanged {
				order_id: order_id.to_string(),
				from,
				to,
			}))
			.ok();
	}
}

/// Report for an order whose payment needs no further work from us.
fn settled_report(order: Order) -> PaymentReport {
	let outcome = match order.payment.as_ref().map(|attempt| attempt.outcome) {
		Some(AttemptOutcome::Succeeded) => PaymentOutcome::Succeeded,
		Some(AttemptOutcome::Pending) => PaymentOutcome::Indeterminate,
		Some(AttemptOutcome::Failed) | None => PaymentOutcome::Failed,
	};
	PaymentReport { order, outcome }
}
