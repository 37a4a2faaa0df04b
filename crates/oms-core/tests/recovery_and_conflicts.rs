mod common;

use async_trait::async_trait;
use common::*;
use oms_config::builders::ConfigBuilder;
use oms_core::OrderServiceError;
use oms_payment::implementations::simulated::ScriptedCharge;
use oms_storage::implementations::memory::MemoryStorage;
use oms_storage::{StorageError, StorageInterface, StorageService, StoredValue};
use oms_types::{
	ConfigSchema, NotificationStatus, OrderStatus, PaymentNotification, PaymentOutcome,
	TimelineEventName::*,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory storage that simulates another writer slipping in before
/// conditional updates.
struct InterferingStorage {
	inner: MemoryStorage,
	interferences: Arc<AtomicUsize>,
}

#[async_trait]
impl StorageInterface for InterferingStorage {
	async fn get_bytes(&self, key: &str) -> Result<StoredValue, StorageError> {
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		self.inner.set_bytes(key, value, ttl).await
	}

	async fn compare_and_set(
		&self,
		key: &str,
		value: Vec<u8>,
		expected_revision: u64,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		let interfere = expected_revision != 0
			&& self
				.interferences
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok();
		if interfere {
			let current = self.inner.get_bytes(key).await?;
			self.inner.set_bytes(key, current.value, None).await?;
		}
		self.inner
			.compare_and_set(key, value, expected_revision, ttl)
			.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.inner.exists(key).await
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		self.inner.list_keys(namespace).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

fn interfering_storage() -> (Arc<StorageService>, Arc<AtomicUsize>) {
	let interferences = Arc::new(AtomicUsize::new(0));
	let storage = Arc::new(StorageService::new(Box::new(InterferingStorage {
		inner: MemoryStorage::new(),
		interferences: interferences.clone(),
	})));
	(storage, interferences)
}

/// Memory storage whose notification namespace rejects every write.
struct NotificationOutageStorage {
	inner: MemoryStorage,
	rejected: Arc<AtomicUsize>,
}

impl NotificationOutageStorage {
	fn reject(&self, key: &str) -> Option<StorageError> {
		key.starts_with("notifications:").then(|| {
			self.rejected.fetch_add(1, Ordering::SeqCst);
			StorageError::Backend("notification store offline".to_string())
		})
	}
}

#[async_trait]
impl StorageInterface for NotificationOutageStorage {
	async fn get_bytes(&self, key: &str) -> Result<StoredValue, StorageError> {
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		if let Some(e) = self.reject(key) {
			return Err(e);
		}
		self.inner.set_bytes(key, value, ttl).await
	}

	async fn compare_and_set(
		&self,
		key: &str,
		value: Vec<u8>,
		expected_revision: u64,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		if let Some(e) = self.reject(key) {
			return Err(e);
		}
		self.inner
			.compare_and_set(key, value, expected_revision, ttl)
			.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.inner.exists(key).await
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		self.inner.list_keys(namespace).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}

#[tokio::test]
async fn test_single_conflict_is_retried() {
	let (storage, interferences) = interfering_storage();
	let engine = engine_with(config(), storage, scripted([]));
	let order = engine.create_order("customer-1", "widget", 1).await.unwrap();

	interferences.store(1, Ordering::SeqCst);
	let cancelled = engine.cancel_order(&order.id).await.unwrap();

	assert_eq!(cancelled.status, OrderStatus::Cancelled);
	assert_eq!(names(&cancelled), vec![Created, Cancelled]);
	assert_eq!(interferences.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_repeated_conflict_is_surfaced() {
	let (storage, interferences) = interfering_storage();
	let engine = engine_with(config(), storage, scripted([]));
	let order = engine.create_order("customer-1", "widget", 1).await.unwrap();

	interferences.store(2, Ordering::SeqCst);
	let err = engine.cancel_order(&order.id).await.unwrap_err();
	assert!(matches!(err, OrderServiceError::PersistenceConflict(_)));

	let order = engine.get_order(&order.id).await.unwrap();
	assert_eq!(order.status, OrderStatus::Created);
	assert_eq!(names(&order), vec![Created]);
}

#[tokio::test]
async fn test_startup_recovery_resolves_processing_orders() {
	let storage = memory_storage();
	let processor = scripted([ScriptedCharge::LeavePending, ScriptedCharge::LeavePending]);

	let before_restart = engine_with(config(), storage.clone(), processor.clone());
	let settled = before_restart.create_order("customer-1", "widget", 1).await.unwrap();
	let pending = before_restart.create_order("customer-2", "widget", 2).await.unwrap();
	let settled_key = before_restart
		.pay_order(&settled.id, widget_price())
		.await
		.unwrap()
		.order
		.payment
		.unwrap()
		.idempotency_key;
	before_restart
		.pay_order(&pending.id, dec(2000, 2))
		.await
		.unwrap();
	drop(before_restart);

	// the processor captured one charge while the service was down
	assert!(processor.settle(&settled_key, true).await);

	let after_restart = engine_with(config(), storage, processor);
	after_restart.initialize().await.unwrap();

	let settled = after_restart.get_order(&settled.id).await.unwrap();
	assert_eq!(settled.status, OrderStatus::Confirmed);
	assert_eq!(names(&settled), vec![Created, PaymentCompleted]);

	let pending = after_restart.get_order(&pending.id).await.unwrap();
	assert_eq!(pending.status, OrderStatus::Processing);
}

#[tokio::test]
async fn test_indeterminate_payment_is_refreshed_in_background() {
	let config = ConfigBuilder::new().refresh_delay_seconds(0).build();
	let engine = engine_with(config, memory_storage(), scripted([ScriptedCharge::SucceedSilently]));

	let runner = {
		let engine = engine.clone();
		tokio::spawn(async move { engine.run().await })
	};
	// let the engine subscribe to the event bus
	tokio::time::sleep(Duration::from_millis(50)).await;

	let order = engine.create_order("customer-1", "widget", 1).await.unwrap();
	let report = engine.pay_order(&order.id, widget_price()).await.unwrap();
	assert_eq!(report.outcome, PaymentOutcome::Indeterminate);

	let order = wait_for_status(&engine, &order.id, OrderStatus::Confirmed).await;
	assert_eq!(names(&order), vec![Created, PaymentCompleted]);

	runner.abort();
}

#[tokio::test]
async fn test_settled_order_returned_when_notification_record_fails() {
	let rejected = Arc::new(AtomicUsize::new(0));
	let storage = Arc::new(StorageService::new(Box::new(NotificationOutageStorage {
		inner: MemoryStorage::new(),
		rejected: rejected.clone(),
	})));
	let engine = engine_with(config(), storage, scripted([ScriptedCharge::SucceedSilently]));
	let order = engine.create_order("customer-1", "widget", 1).await.unwrap();
	let report = engine.pay_order(&order.id, widget_price()).await.unwrap();
	let key = report.order.payment.clone().unwrap().idempotency_key;

	let notification = PaymentNotification {
		notification_id: "n-1".to_string(),
		order_id: order.id.clone(),
		idempotency_key: key.as_str().to_string(),
		status: NotificationStatus::Completed,
	};
	let settled = engine.apply_payment_notification(&notification).await.unwrap();
	assert_eq!(settled.status, OrderStatus::Confirmed);
	assert_eq!(names(&settled), vec![Created, PaymentCompleted]);
	assert_eq!(rejected.load(Ordering::SeqCst), 1);

	// the unrecorded notification can be delivered again without effect
	let again = engine.apply_payment_notification(&notification).await.unwrap();
	assert_eq!(again, settled);
	assert_eq!(engine.get_order(&order.id).await.unwrap(), settled);
}
