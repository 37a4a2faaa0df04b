//! Per-order serialization.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per order id.
///
/// Operations on the same order run one at a time; different orders proceed
/// in parallel. Callers never hold two order locks at once. An entry lives
/// only while some caller holds or waits for it.
#[derive(Default)]
pub struct OrderLocks {
	locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one order; releases the map entry when it is the last user.
pub struct OrderLockGuard<'a> {
	guard: Option<OwnedMutexGuard<()>>,
	order_id: String,
	locks: &'a OrderLocks,
}

impl Drop for OrderLockGuard<'_> {
	fn drop(&mut self) {
		drop(self.guard.take());
		// Waiters hold a clone of the mutex, so the count is 1 only when idle
		self.locks
			.locks
			.remove_if(&self.order_id, |_, lock| Arc::strong_count(lock) == 1);
	}
}

impl OrderLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits for exclusive access to `order_id`.
	pub async fn acquire(&self, order_id: &str) -> OrderLockGuard<'_> {
		let lock = self
			.locks
			.entry(order_id.to_string())
			.or_default()
			.value()
			.clone();
		OrderLockGuard {
			guard: Some(lock.lock_owned().await),
			order_id: order_id.to_string(),
			locks: self,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_same_order_is_serialized() {
		let locks = Arc::new(OrderLocks::new());
		let guard = locks.acquire("order-1").await;

		let waiter = {
			let locks = locks.clone();
			tokio::spawn(async move {
				let _guard = locks.acquire("order-1").await;
			})
		};
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert!(!waiter.is_finished());

		drop(guard);
		waiter.await.unwrap();
	}

	#[tokio::test]
	async fn test_different_orders_do_not_block() {
		let locks = OrderLocks::new();
		let _first = locks.acquire("order-1").await;
		let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("order-2")).await;
		assert!(second.is_ok());
	}

	#[tokio::test]
	async fn test_released_locks_leave_no_entries() {
		let locks = OrderLocks::new();
		for i in 0..1_000 {
			let _guard = locks.acquire(&format!("order-{}", i)).await;
		}
		assert!(locks.locks.is_empty());
	}

	#[tokio::test]
	async fn test_entry_kept_while_a_waiter_is_queued() {
		let locks = Arc::new(OrderLocks::new());
		let guard = locks.acquire("order-1").await;

		let waiter = {
			let locks = locks.clone();
			tokio::spawn(async move {
				let _guard = locks.acquire("order-1").await;
			})
		};
		tokio::time::sleep(Duration::from_millis(20)).await;

		drop(guard);
		assert_eq!(locks.locks.len(), 1);

		waiter.await.unwrap();
		assert!(locks.locks.is_empty());
	}
}
