//! Builder for constructing order engines.
//!
//! Composes an `OrderEngine` from the storage backend and payment processor
//! named as primary in the configuration, using the factory functions each
//! implementation registers.

use crate::engine::OrderEngine;
use oms_config::Config;
use oms_payment::{CircuitBreaker, PaymentError, PaymentInterface, PaymentService};
use oms_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct OmsFactories<SF, PF> {
	pub storage_factories: HashMap<String, SF>,
	pub payment_factories: HashMap<String, PF>,
}

/// Builder for constructing an OrderEngine with pluggable implementations.
pub struct OmsBuilder {
	config: Config,
}

impl OmsBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine from the configured primary implementations.
	pub fn build<SF, PF>(self, factories: OmsFactories<SF, PF>) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError>,
	{
		let storage_backend = create_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let processor = create_primary(
			"payment",
			&self.config.payment.primary,
			&self.config.payment.implementations,
			&factories.payment_factories,
		)?;

		let storage = Arc::new(StorageService::new(storage_backend));
		let breaker = CircuitBreaker::new(
			self.config.payment.circuit_breaker.failure_threshold,
			Duration::from_secs(self.config.payment.circuit_breaker.cooldown_seconds),
		);
		let payment = Arc::new(PaymentService::new(
			self.config.payment.primary.clone(),
			Arc::from(processor),
			Duration::from_millis(self.config.payment.charge_timeout_ms),
			breaker,
		));

		Ok(OrderEngine::new(self.config, storage, payment))
	}
}

/// Instantiates every configured implementation and returns the primary one.
fn create_primary<T: ?Sized, F, E>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
	E: std::fmt::Display,
{
	let mut created = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				created.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if created.is_empty() {
		return Err(BuilderError::Config(format!(
			"No valid {} implementations available",
			component
		)));
	}

	created.remove(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"primary {} implementation '{}' is not configured",
			component, primary
		))
	})
}
