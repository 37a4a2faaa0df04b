//! Core engine of the order service.
//!
//! Owns the services every order operation needs and runs the background
//! loop: delayed refreshes for payments whose outcome was not observed, the
//! periodic reconciliation sweep over processing orders and storage cleanup.

pub mod event_bus;
pub mod lifecycle;
pub mod orders;

use crate::catalog::Catalog;
use crate::handlers::PaymentCoordinator;
use crate::recovery::RecoveryService;
use crate::state::{OrderLocks, OrderRepository};
use oms_config::Config;
use oms_payment::PaymentService;
use oms_storage::StorageService;
use oms_types::{truncate_id, OmsEvent, PaymentEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast::error::RecvError, Semaphore};

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Capacity of the event bus channel.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Main engine coordinating orders, payments and background reconciliation.
#[derive(Clone)]
pub struct OrderEngine {
	pub(crate) config: Config,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) repository: Arc<OrderRepository>,
	pub(crate) catalog: Arc<Catalog>,
	pub(crate) payment: Arc<PaymentService>,
	pub(crate) payments: Arc<PaymentCoordinator>,
	pub(crate) locks: Arc<OrderLocks>,
	pub(crate) recovery: Arc<RecoveryService>,
	pub(crate) event_bus: event_bus::EventBus,
}

impl OrderEngine {
	/// Creates an engine over the given storage and payment services.
	pub fn new(config: Config, storage: Arc<StorageService>, payment: Arc<PaymentService>) -> Self {
		let event_bus = event_bus::EventBus::new(EVENT_BUS_CAPACITY);
		let repository = Arc::new(OrderRepository::new(storage.clone()));
		let catalog = Arc::new(Catalog::from_config(&config.catalog));
		let locks = Arc::new(OrderLocks::new());
		let payments = Arc::new(PaymentCoordinator::new(
			payment.clone(),
			repository.clone(),
			event_bus.clone(),
		));
		let recovery = Arc::new(RecoveryService::new(
			repository.clone(),
			payments.clone(),
			locks.clone(),
		));

		Self {
			config,
			storage,
			repository,
			catalog,
			payment,
			payments,
			locks,
			recovery,
			event_bus,
		}
	}

	/// Main execution loop. Returns on Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut event_receiver = self.event_bus.subscribe();

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		let semaphore = Arc::new(Semaphore::new(self.config.service.max_concurrent_tasks));
		let refresh_delay = Duration::from_secs(self.config.service.refresh_delay_seconds);

		let mut sweep = tokio::time::interval(Duration::from_secs(
			self.config.service.reconcile_interval_seconds,
		));
		sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
		// Startup recovery already covered the first sweep
		sweep.tick().await;

		loop {
			tokio::select! {
				event = event_receiver.recv() => {
					match event {
						Ok(OmsEvent::Payment(PaymentEvent::Indeterminate { order_id, .. })) => {
							self.spawn_handler(&semaphore, move |engine| async move {
								tokio::time::sleep(refresh_delay).await;
								engine
									.refresh_order(&order_id)
									.await
									.map(|order| {
										tracing::debug!(
											order_id = %truncate_id(&order.id),
											status = %order.status,
											"Scheduled refresh finished"
										);
									})
									.map_err(|e| EngineError::Service(format!("Failed to refresh order: {}", e)))
							})
							.await;
						},
						Ok(_) => {},
						Err(RecvError::Lagged(skipped)) => {
							tracing::warn!(skipped, "Event loop lagged behind the event bus");
						},
						Err(RecvError::Closed) => break,
					}
				}

				_ = sweep.tick() => {
					self.spawn_handler(&semaphore, |engine| async move {
						engine
							.recovery
							.reconcile_processing()
							.await
							.map(|_| ())
							.map_err(|e| EngineError::Service(format!("Reconciliation sweep failed: {}", e)))
					})
					.await;
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		cleanup_handle.abort();
		Ok(())
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Returns a reference to the product catalog.
	pub fn catalog(&self) -> &Arc<Catalog> {
		&self.catalog
	}

	/// Returns a reference to the payment service.
	pub fn payment(&self) -> &Arc<PaymentService> {
		&self.payment
	}

	/// Spawns a background task once a semaphore permit is available.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(OrderEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit;
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			},
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			},
		}
	}
}
