#![allow(dead_code)]

use oms_config::{builders::ConfigBuilder, Config};
use oms_core::OrderEngine;
use oms_payment::implementations::simulated::{ScriptedCharge, SimulatedConfig, SimulatedProcessor};
use oms_payment::{CircuitBreaker, PaymentInterface, PaymentService};
use oms_storage::implementations::memory::MemoryStorage;
use oms_storage::StorageService;
use oms_types::{Order, OrderStatus, TimelineEventName};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

pub fn config() -> Config {
	ConfigBuilder::new().build()
}

pub fn scripted(steps: impl IntoIterator<Item = ScriptedCharge>) -> Arc<SimulatedProcessor> {
	Arc::new(SimulatedProcessor::with_script(
		SimulatedConfig {
			success_rate: 1.0,
			latency_ms: 0,
		},
		steps,
	))
}

pub fn payment_service(config: &Config, processor: Arc<dyn PaymentInterface>) -> Arc<PaymentService> {
	Arc::new(PaymentService::new(
		config.payment.primary.clone(),
		processor,
		Duration::from_millis(config.payment.charge_timeout_ms),
		CircuitBreaker::new(
			config.payment.circuit_breaker.failure_threshold,
			Duration::from_secs(config.payment.circuit_breaker.cooldown_seconds),
		),
	))
}

pub fn engine_with(config: Config, storage: Arc<StorageService>, processor: Arc<dyn PaymentInterface>) -> OrderEngine {
	let payment = payment_service(&config, processor);
	OrderEngine::new(config, storage, payment)
}

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

pub fn engine(processor: Arc<dyn PaymentInterface>) -> OrderEngine {
	engine_with(config(), memory_storage(), processor)
}

/// Price of the default catalog product.
pub fn widget_price() -> Decimal {
	Decimal::new(1000, 2)
}

pub fn dec(units: i64, scale: u32) -> Decimal {
	Decimal::new(units, scale)
}

/// The timeline's last entry in append order matches the order's status.
pub fn assert_terminal_label(order: &Order) {
	let latest = order.timeline.latest().expect("timeline is never empty");
	assert_eq!(latest.name, order.status.timeline_label());
}

pub fn names(order: &Order) -> Vec<TimelineEventName> {
	order.timeline.names()
}

pub async fn wait_for_status(engine: &OrderEngine, order_id: &str, status: OrderStatus) -> Order {
	for _ in 0..200 {
		let order = engine.get_order(order_id).await.unwrap();
		if order.status == status {
			return order;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("order {} never reached {}", order_id, status);
}
