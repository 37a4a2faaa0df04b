//! Client-facing order operations.
//!
//! Every operation that changes an order runs under that order's lock, so
//! concurrent requests on one order are applied one after the other and each
//! sees the state the previous one left behind.

use super::OrderEngine;
use crate::error::OrderServiceError;
use crate::handlers::PaymentReport;
use crate::state::OrderStateMachine;
use chrono::Utc;
use oms_types::{
	truncate_id, IdempotencyKey, LifecycleEvent, OmsEvent, Order, OrderEvent,
	OrderStatus, PaymentNotification, StorageKey, Timeline, TimelineEvent, TimelineEventName,
};
use oms_storage::StorageError;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::instrument;

impl OrderEngine {
	/// Places a new order for `quantity` units of a catalog product.
	///
	/// The unit price is snapshotted and the total computed once; later
	/// catalog changes do not affect the order.
	#[instrument(skip_all, fields(customer_id = %customer_id, product_id = %product_id))]
	pub async fn create_order(
		&self,
		customer_id: &str,
		product_id: &str,
		quantity: u32,
	) -> Result<Order, OrderServiceError> {
		if customer_id.trim().is_empty() {
			return Err(OrderServiceError::Validation(
				"customer_id must not be empty".to_string(),
			));
		}
		if quantity == 0 {
			return Err(OrderServiceError::Validation(
				"quantity must be a positive integer".to_string(),
			));
		}
		let product = self.catalog.resolve(product_id).ok_or_else(|| {
			OrderServiceError::Validation(format!("unknown product '{}'", product_id))
		})?;

		let now = Utc::now();
		let mut timeline = Timeline::new();
		timeline.append(TimelineEvent::new(TimelineEventName::Created, now));

		let order = Order {
			id: uuid::Uuid::new_v4().to_string(),
			customer_id: customer_id.to_string(),
			total_amount: product.price * Decimal::from(quantity),
			product,
			quantity,
			status: OrderStatus::Created,
			payment: None,
			created_at: now,
			updated_at: now,
			timeline,
			revision: 0,
		};
		let order = self.repository.create(&order).await?;

		self.event_bus
			.publish(OmsEvent::Order(OrderEvent::Created {
				order_id: order.id.clone(),
				customer_id: order.customer_id.clone(),
			}))
			.ok();
		tracing::info!(
			order_id = %truncate_id(&order.id),
			total = %order.total_amount,
			"Order created"
		);
		Ok(order)
	}

	/// Cancels an order that has not been paid.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.transition(order_id, LifecycleEvent::CancelRequested).await
	}

	/// Records delivery of a confirmed order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn confirm_delivery(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.transition(order_id, LifecycleEvent::DeliveryConfirmed).await
	}

	/// Pays an order. `amount` must equal the order total.
	///
	/// When the processor's answer is not observed the order is returned in
	/// Processing with an indeterminate outcome and a refresh is scheduled.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn pay_order(
		&self,
		order_id: &str,
		amount: Decimal,
	) -> Result<PaymentReport, OrderServiceError> {
		let _guard = self.locks.acquire(order_id).await;
		self.payments.initiate(order_id, amount).await
	}

	/// Resolves a processing order's payment. A no-op for any other status.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn refresh_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		let _guard = self.locks.acquire(order_id).await;
		Ok(self.payments.resolve(order_id).await?.order)
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.repository.get(order_id).await
	}

	/// Orders placed by a customer, oldest first.
	pub async fn list_orders(&self, customer_id: &str) -> Result<Vec<Order>, OrderServiceError> {
		if customer_id.trim().is_empty() {
			return Err(OrderServiceError::Validation(
				"customer_id must not be empty".to_string(),
			));
		}
		self.repository.list_by_customer(customer_id).await
	}

	/// Handles a payment update pushed by the processor.
	///
	/// The pushed status is not trusted: a notification for the in-flight
	/// attempt only prompts a status query under the attempt's idempotency
	/// key, and the processor's answer is applied. Notifications for other
	/// attempts are ignored. Ids are deduplicated for the configured retention
	/// period; a repeated notification returns the current order unchanged.
	#[instrument(skip_all, fields(
		order_id = %truncate_id(&notification.order_id),
		notification_id = %notification.notification_id
	))]
	pub async fn apply_payment_notification(
		&self,
		notification: &PaymentNotification,
	) -> Result<Order, OrderServiceError> {
		let _guard = self.locks.acquire(&notification.order_id).await;

		let order = self.repository.get(&notification.order_id).await?;
		let notifications = StorageKey::Notifications.as_str();
		if self
			.storage
			.exists(notifications, &notification.notification_id)
			.await?
		{
			tracing::debug!("Duplicate payment notification, ignoring");
			return Ok(order);
		}

		let key = IdempotencyKey::from(notification.idempotency_key.clone());
		let in_flight = order.status == OrderStatus::Processing
			&& order
				.in_flight_attempt()
				.is_some_and(|attempt| attempt.idempotency_key == key);
		let order = if in_flight {
			tracing::info!(
				idempotency_key = %key,
				reported = ?notification.status,
				"Payment notification received, confirming with processor"
			);
			self.payments.resolve(&order.id).await?.order
		} else {
			tracing::debug!(
				idempotency_key = %key,
				status = %order.status,
				"Notification does not match the in-flight attempt, ignoring"
			);
			order
		};

		let ttl = Duration::from_secs(self.config.service.notification_ttl_seconds);
		match self
			.storage
			.create(notifications, &notification.notification_id, notification, Some(ttl))
			.await
		{
			Ok(_) | Err(StorageError::Conflict { .. }) => {},
			Err(e) => {
				tracing::warn!("Failed to record payment notification: {}", e);
			},
		}
		Ok(order)
	}

	/// Applies a lifecycle event that needs no payment interaction.
	async fn transition(
		&self,
		order_id: &str,
		event: LifecycleEvent,
	) -> Result<Order, OrderServiceError> {
		let _guard = self.locks.acquire(order_id).await;

		let modified = self
			.repository
			.modify(order_id, |order| {
				OrderStateMachine::apply(order, event, Utc::now())?;
				Ok(true)
			})
			.await?;

		let order = modified.order;
		self.event_bus
			.publish(OmsEvent::Order(OrderEvent::StatusChanged {
				order_id: order.id.clone(),
				from: modified.previous,
				to: order.status,
			}))
			.ok();
		tracing::info!(from = %modified.previous, to = %order.status, "Order status changed");
		Ok(order)
	}
}
