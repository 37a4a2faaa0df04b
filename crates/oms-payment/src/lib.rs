//! Payment module for the order service.
//!
//! Defines the interface to external payment processors and the
//! `PaymentService` that the order service talks to. The service bounds every
//! processor call with a timeout, turns anything it could not observe into an
//! indeterminate outcome, and trips a circuit breaker when the processor keeps
//! failing.

use async_trait::async_trait;
use oms_types::{
	truncate_id, ChargeOutcome, ConfigSchema, IdempotencyKey, ImplementationRegistry, PaymentStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitState};

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod simulated;
}

/// Errors that can occur when talking to a payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
	/// The processor refused service or the circuit is open.
	#[error("Processor unavailable: {0}")]
	Unavailable(String),
	/// The request could not be delivered or the response was lost.
	#[error("Network error: {0}")]
	Network(String),
	/// The processor answered with something we do not understand.
	#[error("Invalid processor response: {0}")]
	InvalidResponse(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for payment processors.
///
/// Processors must deduplicate charges by idempotency key: charging the same
/// key twice never captures twice, and the second call reports the first
/// call's result.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PaymentInterface: Send + Sync {
	/// Returns the configuration schema for this processor.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Charges `amount` for `order_id` under the given idempotency key.
	async fn charge(
		&self,
		key: &IdempotencyKey,
		order_id: &str,
		amount: Decimal,
	) -> Result<ChargeOutcome, PaymentError>;

	/// Reports what the processor knows about a charge.
	async fn query_status(&self, key: &IdempotencyKey) -> Result<PaymentStatus, PaymentError>;
}

/// Type alias for payment processor factory functions.
pub type PaymentFactory = fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError>;

/// Registry trait for payment processor implementations.
pub trait PaymentRegistry: ImplementationRegistry<Factory = PaymentFactory> {}

/// Get all registered payment processor implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PaymentFactory)> {
	use implementations::{http, simulated};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(simulated::Registry::NAME, simulated::Registry::factory()),
	]
}

/// Service wrapping the primary payment processor.
pub struct PaymentService {
	name: String,
	processor: Arc<dyn PaymentInterface>,
	charge_timeout: Duration,
	breaker: CircuitBreaker,
}

impl PaymentService {
	pub fn new(
		name: impl Into<String>,
		processor: Arc<dyn PaymentInterface>,
		charge_timeout: Duration,
		breaker: CircuitBreaker,
	) -> Self {
		Self {
			name: name.into(),
			processor,
			charge_timeout,
			breaker,
		}
	}

	/// Name of the processor implementation in use.
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn circuit_state(&self) -> CircuitState {
		self.breaker.state()
	}

	/// Fails with `Unavailable` while the circuit is open.
	pub fn ensure_available(&self) -> Result<(), PaymentError> {
		self.breaker.check().map_err(|retry_after| {
			PaymentError::Unavailable(format!(
				"circuit open for processor '{}', retry in {}s",
				self.name,
				retry_after.as_secs().max(1)
			))
		})
	}

	/// Seconds until the circuit lets requests through again, if it is open.
	pub fn retry_after(&self) -> Option<u64> {
		self.breaker
			.check()
			.err()
			.map(|remaining| remaining.as_secs().max(1))
	}

	/// Dispatches a charge and reports what was observed.
	///
	/// Never fails: a timeout or transport error means the charge may or may
	/// not have been captured, which is reported as `Indeterminate`.
	pub async fn charge(
		&self,
		key: &IdempotencyKey,
		order_id: &str,
		amount: Decimal,
	) -> ChargeOutcome {
		let result = tokio::time::timeout(
			self.charge_timeout,
			self.processor.charge(key, order_id, amount),
		)
		.await;

		let outcome = match result {
			Ok(Ok(outcome)) => outcome,
			Ok(Err(e)) => ChargeOutcome::Indeterminate {
				reason: e.to_string(),
			},
			Err(_) => ChargeOutcome::Indeterminate {
				reason: format!(
					"no response within {}ms",
					self.charge_timeout.as_millis()
				),
			},
		};

		match &outcome {
			ChargeOutcome::Indeterminate { reason } => {
				tracing::warn!(
					order_id = %truncate_id(order_id),
					idempotency_key = %key,
					%reason,
					"Charge outcome not observed"
				);
				self.breaker.record_failure();
			},
			_ => self.breaker.record_success(),
		}

		outcome
	}

	/// Queries the processor for the status of an earlier charge.
	pub async fn query_status(&self, key: &IdempotencyKey) -> Result<PaymentStatus, PaymentError> {
		self.ensure_available()?;

		let result = tokio::time::timeout(self.charge_timeout, self.processor.query_status(key))
			.await
			.unwrap_or_else(|_| {
				Err(PaymentError::Network(format!(
					"status query timed out after {}ms",
					self.charge_timeout.as_millis()
				)))
			});

		match &result {
			Ok(_) => self.breaker.record_success(),
			Err(e) => {
				tracing::warn!(idempotency_key = %key, error = %e, "Payment status query failed");
				self.breaker.record_failure();
			},
		}
		result
	}
}
