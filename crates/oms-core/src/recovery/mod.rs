//! Recovery of orders whose payment outcome is still open.
//!
//! An order stays in Processing when the service stopped mid-charge or the
//! processor's answer was lost. At startup, and periodically afterwards,
//! every such order is re-resolved against the processor under its original
//! idempotency key.

use crate::error::OrderServiceError;
use crate::handlers::PaymentCoordinator;
use crate::state::{OrderLocks, OrderRepository};
use oms_types::{truncate_id, OrderStatus};
use std::sync::Arc;
use tracing::instrument;

/// Report of a recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
	/// Orders found in Processing.
	pub checked: usize,
	/// Orders that reached a terminal payment status.
	pub resolved: usize,
	/// Orders whose outcome is still unknown.
	pub still_processing: usize,
	/// Orders that could not be resolved because of an error.
	pub failed: usize,
}

pub struct RecoveryService {
	repository: Arc<OrderRepository>,
	payments: Arc<PaymentCoordinator>,
	locks: Arc<OrderLocks>,
}

impl RecoveryService {
	pub fn new(
		repository: Arc<OrderRepository>,
		payments: Arc<PaymentCoordinator>,
		locks: Arc<OrderLocks>,
	) -> Self {
		Self {
			repository,
			payments,
			locks,
		}
	}

	/// Startup pass over orders left in Processing by a previous run.
	#[instrument(skip_all)]
	pub async fn recover_state(&self) -> Result<RecoveryReport, OrderServiceError> {
		tracing::info!("Starting state recovery from storage");
		self.reconcile_processing().await
	}

	/// Resolves every order currently in Processing.
	///
	/// Failures on individual orders are counted and logged; the pass
	/// continues with the remaining orders.
	pub async fn reconcile_processing(&self) -> Result<RecoveryReport, OrderServiceError> {
		let orders = self.repository.list_by_status(OrderStatus::Processing).await?;
		let mut report = RecoveryReport {
			checked: orders.len(),
			..Default::default()
		};

		for order in orders {
			let _guard = self.locks.acquire(&order.id).await;
			match self.payments.resolve(&order.id).await {
				Ok(payment) if payment.order.status == OrderStatus::Processing => {
					report.still_processing += 1;
				},
				Ok(payment) => {
					tracing::info!(
						order_id = %truncate_id(&order.id),
						status = %payment.order.status,
						"Recovered order"
					);
					report.resolved += 1;
				},
				Err(e) => {
					tracing::warn!(order_id = %truncate_id(&order.id), error = %e, "Failed to recover order");
					report.failed += 1;
				},
			}
		}

		if report.checked > 0 {
			tracing::debug!(?report, "Reconciliation pass finished");
		}
		Ok(report)
	}
}
