//! Configuration builder for tests and local development.
//!
//! Produces a `Config` that passes validation out of the box: memory storage,
//! the simulated processor always succeeding, and a single `widget` product
//! priced at 10.00.

use crate::{
	ApiConfig, CatalogConfig, CircuitBreakerConfig, Config, PaymentConfig, ProductConfig,
	ServiceConfig, StorageConfig,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	reconcile_interval_seconds: u64,
	refresh_delay_seconds: u64,
	max_concurrent_tasks: usize,
	notification_ttl_seconds: u64,
	storage_primary: String,
	storage_implementation: toml::Value,
	storage_cleanup_interval_seconds: u64,
	payment_primary: String,
	payment_implementation: toml::Value,
	charge_timeout_ms: u64,
	circuit_breaker: CircuitBreakerConfig,
	products: HashMap<String, ProductConfig>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let mut simulated = toml::map::Map::new();
		simulated.insert("success_rate".to_string(), toml::Value::Float(1.0));

		let mut products = HashMap::new();
		products.insert(
			"widget".to_string(),
			ProductConfig {
				name: "Widget".to_string(),
				price: Decimal::new(1000, 2),
			},
		);

		Self {
			service_id: "oms-test".to_string(),
			reconcile_interval_seconds: 30,
			refresh_delay_seconds: 0,
			max_concurrent_tasks: 10,
			notification_ttl_seconds: 3600,
			storage_primary: "memory".to_string(),
			storage_implementation: empty_table(),
			storage_cleanup_interval_seconds: 60,
			payment_primary: "simulated".to_string(),
			payment_implementation: toml::Value::Table(simulated),
			charge_timeout_ms: 1000,
			circuit_breaker: CircuitBreakerConfig::default(),
			products,
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn reconcile_interval_seconds(mut self, seconds: u64) -> Self {
		self.reconcile_interval_seconds = seconds;
		self
	}

	pub fn refresh_delay_seconds(mut self, seconds: u64) -> Self {
		self.refresh_delay_seconds = seconds;
		self
	}

	pub fn max_concurrent_tasks(mut self, tasks: usize) -> Self {
		self.max_concurrent_tasks = tasks;
		self
	}

	pub fn notification_ttl_seconds(mut self, seconds: u64) -> Self {
		self.notification_ttl_seconds = seconds;
		self
	}

	/// Sets the primary storage implementation and its table.
	pub fn storage(mut self, primary: impl Into<String>, implementation: toml::Value) -> Self {
		self.storage_primary = primary.into();
		self.storage_implementation = implementation;
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	/// Sets the primary payment implementation and its table.
	pub fn payment(mut self, primary: impl Into<String>, implementation: toml::Value) -> Self {
		self.payment_primary = primary.into();
		self.payment_implementation = implementation;
		self
	}

	pub fn charge_timeout_ms(mut self, timeout: u64) -> Self {
		self.charge_timeout_ms = timeout;
		self
	}

	pub fn circuit_breaker(mut self, failure_threshold: u32, cooldown_seconds: u64) -> Self {
		self.circuit_breaker = CircuitBreakerConfig {
			failure_threshold,
			cooldown_seconds,
		};
		self
	}

	/// Adds or replaces a catalog product.
	pub fn product(mut self, id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
		self.products.insert(
			id.into(),
			ProductConfig {
				name: name.into(),
				price,
			},
		);
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
				reconcile_interval_seconds: self.reconcile_interval_seconds,
				refresh_delay_seconds: self.refresh_delay_seconds,
				max_concurrent_tasks: self.max_concurrent_tasks,
				notification_ttl_seconds: self.notification_ttl_seconds,
			},
			storage: StorageConfig {
				implementations: HashMap::from([(
					self.storage_primary.clone(),
					self.storage_implementation,
				)]),
				primary: self.storage_primary,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			payment: PaymentConfig {
				implementations: HashMap::from([(
					self.payment_primary.clone(),
					self.payment_implementation,
				)]),
				primary: self.payment_primary,
				charge_timeout_ms: self.charge_timeout_ms,
				circuit_breaker: self.circuit_breaker,
			},
			catalog: CatalogConfig {
				products: self.products,
			},
			api: self.api,
		}
	}
}
