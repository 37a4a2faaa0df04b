//! Order persistence on top of the storage service.
//!
//! Every write is conditional on the revision the order was read at, so a
//! writer working from a stale copy gets `PersistenceConflict` instead of
//! overwriting someone else's change.

use crate::error::OrderServiceError;
use oms_storage::{QueryFilter, StorageError, StorageService, Versioned};
use oms_types::{truncate_id, Order, OrderStatus, StorageKey};
use std::sync::Arc;

/// Result of a read-modify-write cycle.
#[derive(Debug, Clone)]
pub struct Modified {
	/// Status before the modification.
	pub previous: OrderStatus,
	/// The order as persisted (or as read, if nothing changed).
	pub order: Order,
	/// Whether anything was written.
	pub changed: bool,
}

pub struct OrderRepository {
	storage: Arc<StorageService>,
}

fn with_revision(versioned: Versioned<Order>) -> Order {
	let mut order = versioned.value;
	order.revision = versioned.revision;
	order
}

impl OrderRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Persists a new order. Fails if the id is already taken.
	pub async fn create(&self, order: &Order) -> Result<Order, OrderServiceError> {
		let revision = self
			.storage
			.create(StorageKey::Orders.as_str(), &order.id, order, None)
			.await
			.map_err(|e| match e {
				StorageError::Conflict { .. } => OrderServiceError::PersistenceConflict(order.id.clone()),
				other => other.into(),
			})?;
		let mut stored = order.clone();
		stored.revision = revision;
		Ok(stored)
	}

	pub async fn get(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		self.storage
			.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
			.await
			.map(with_revision)
			.map_err(|e| match e {
				StorageError::NotFound => OrderServiceError::NotFound(order_id.to_string()),
				other => other.into(),
			})
	}

	/// Writes `order` if storage still holds the revision it was read at.
	pub async fn update(&self, order: &Order) -> Result<Order, OrderServiceError> {
		let revision = self
			.storage
			.update_versioned(StorageKey::Orders.as_str(), &order.id, order, order.revision)
			.await
			.map_err(|e| match e {
				StorageError::Conflict { .. } => OrderServiceError::PersistenceConflict(order.id.clone()),
				StorageError::NotFound => OrderServiceError::NotFound(order.id.clone()),
				other => other.into(),
			})?;
		let mut stored = order.clone();
		stored.revision = revision;
		Ok(stored)
	}

	/// Loads an order, lets `apply` change it and persists the result.
	///
	/// `apply` returns whether it changed anything; unchanged orders are not
	/// written. On a revision conflict the order is reloaded and `apply` runs
	/// once more against the fresh copy. A second conflict is returned.
	pub async fn modify<F>(&self, order_id: &str, mut apply: F) -> Result<Modified, OrderServiceError>
	where
		F: FnMut(&mut Order) -> Result<bool, OrderServiceError>,
	{
		let mut retried = false;
		loop {
			let mut order = self.get(order_id).await?;
			let previous = order.status;
			if !apply(&mut order)? {
				return Ok(Modified {
					previous,
					order,
					changed: false,
				});
			}
			match self.update(&order).await {
				Ok(order) => {
					return Ok(Modified {
						previous,
						order,
						changed: true,
					})
				},
				Err(OrderServiceError::PersistenceConflict(_)) if !retried => {
					tracing::warn!(
						order_id = %truncate_id(order_id),
						"Order changed concurrently, reloading and retrying once"
					);
					retried = true;
				},
				Err(e) => return Err(e),
			}
		}
	}

	/// Orders of one customer, oldest first.
	pub async fn list_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, OrderServiceError> {
		let mut orders = self
			.query(QueryFilter::Equals(
				"customer_id".to_string(),
				serde_json::Value::String(customer_id.to_string()),
			))
			.await?;
		orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
		Ok(orders)
	}

	pub async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderServiceError> {
		let status = serde_json::to_value(status)
			.map_err(|e| OrderServiceError::Storage(e.to_string()))?;
		self.query(QueryFilter::Equals("status".to_string(), status)).await
	}

	async fn query(&self, filter: QueryFilter) -> Result<Vec<Order>, OrderServiceError> {
		Ok(self
			.storage
			.query::<Order>(StorageKey::Orders.as_str(), filter)
			.await?
			.into_iter()
			.map(with_revision)
			.collect())
	}
}
