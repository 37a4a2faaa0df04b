//! Simulated payment processor for development and testing.
//!
//! Approves a configurable share of charges at random and keeps an in-memory
//! ledger keyed by idempotency key, so a repeated charge returns the recorded
//! result instead of capturing again. Tests can queue scripted behaviours to
//! reproduce lost responses and late settlement deterministically.

use crate::{PaymentError, PaymentFactory, PaymentInterface, PaymentRegistry};
use async_trait::async_trait;
use oms_types::{
	truncate_id, ChargeOutcome, ConfigSchema, Field, FieldType, IdempotencyKey,
	ImplementationRegistry, PaymentStatus, Schema, ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;

/// Configuration for the simulated processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
	/// Probability in `[0, 1]` that an unscripted charge is approved.
	#[serde(default = "default_success_rate")]
	pub success_rate: f64,
	/// Artificial delay before the processor answers.
	#[serde(default)]
	pub latency_ms: u64,
}

fn default_success_rate() -> f64 {
	0.8
}

impl Default for SimulatedConfig {
	fn default() -> Self {
		Self {
			success_rate: default_success_rate(),
			latency_ms: 0,
		}
	}
}

/// Scripted behaviour for the next charge of a new idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedCharge {
	/// Capture and report success.
	Succeed,
	/// Decline and report failure.
	Decline,
	/// Capture, but the response is lost.
	SucceedSilently,
	/// Decline, but the response is lost.
	DeclineSilently,
	/// Accept the charge without settling it; it stays pending.
	LeavePending,
	/// The request never reaches the ledger.
	Drop,
}

#[derive(Debug, Clone)]
struct Transaction {
	order_id: String,
	amount: Decimal,
	status: PaymentStatus,
}

/// In-memory payment processor.
pub struct SimulatedProcessor {
	config: SimulatedConfig,
	ledger: RwLock<HashMap<String, Transaction>>,
	script: Mutex<VecDeque<ScriptedCharge>>,
	charge_requests: AtomicUsize,
}

impl SimulatedProcessor {
	pub fn new(config: SimulatedConfig) -> Self {
		Self {
			config,
			ledger: RwLock::new(HashMap::new()),
			script: Mutex::new(VecDeque::new()),
			charge_requests: AtomicUsize::new(0),
		}
	}

	/// Creates a processor that plays `script` before falling back to chance.
	pub fn with_script(config: SimulatedConfig, script: impl IntoIterator<Item = ScriptedCharge>) -> Self {
		let processor = Self::new(config);
		processor.script_queue().extend(script);
		processor
	}

	fn script_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedCharge>> {
		self.script.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn push_script(&self, step: ScriptedCharge) {
		self.script_queue().push_back(step);
	}

	/// Settles a pending transaction. Returns false if the key is unknown.
	pub async fn settle(&self, key: &IdempotencyKey, succeeded: bool) -> bool {
		let mut ledger = self.ledger.write().await;
		match ledger.get_mut(key.as_str()) {
			Some(tx) => {
				tx.status = if succeeded {
					PaymentStatus::Succeeded
				} else {
					PaymentStatus::Failed
				};
				true
			},
			None => false,
		}
	}

	/// Number of charge requests received, including duplicates.
	pub fn charge_requests(&self) -> usize {
		self.charge_requests.load(Ordering::SeqCst)
	}

	/// Number of distinct transactions in the ledger.
	pub async fn transaction_count(&self) -> usize {
		self.ledger.read().await.len()
	}

	fn next_step(&self) -> ScriptedCharge {
		if let Some(step) = self.script_queue().pop_front() {
			return step;
		}
		if rand::random::<f64>() < self.config.success_rate {
			ScriptedCharge::Succeed
		} else {
			ScriptedCharge::Decline
		}
	}
}

fn outcome_for(status: PaymentStatus) -> ChargeOutcome {
	match status {
		PaymentStatus::Succeeded => ChargeOutcome::Succeeded,
		PaymentStatus::Failed => ChargeOutcome::Failed {
			reason: "payment declined".to_string(),
		},
		PaymentStatus::Pending | PaymentStatus::Unknown => ChargeOutcome::Indeterminate {
			reason: "payment not settled yet".to_string(),
		},
	}
}

#[async_trait]
impl PaymentInterface for SimulatedProcessor {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedProcessorSchema)
	}

	async fn charge(
		&self,
		key: &IdempotencyKey,
		order_id: &str,
		amount: Decimal,
	) -> Result<ChargeOutcome, PaymentError> {
		self.charge_requests.fetch_add(1, Ordering::SeqCst);

		let (outcome, silent) = {
			let mut ledger = self.ledger.write().await;
			if let Some(existing) = ledger.get(key.as_str()) {
				tracing::debug!(
					idempotency_key = %key,
					order_id = %truncate_id(&existing.order_id),
					amount = %existing.amount,
					"Duplicate charge, returning recorded result"
				);
				(outcome_for(existing.status), false)
			} else {
				let step = self.next_step();
				let status = match step {
					ScriptedCharge::Succeed | ScriptedCharge::SucceedSilently => {
						Some(PaymentStatus::Succeeded)
					},
					ScriptedCharge::Decline | ScriptedCharge::DeclineSilently => {
						Some(PaymentStatus::Failed)
					},
					ScriptedCharge::LeavePending => Some(PaymentStatus::Pending),
					ScriptedCharge::Drop => None,
				};
				if let Some(status) = status {
					ledger.insert(
						key.as_str().to_string(),
						Transaction {
							order_id: order_id.to_string(),
							amount,
							status,
						},
					);
				}
				let silent = matches!(
					step,
					ScriptedCharge::SucceedSilently | ScriptedCharge::DeclineSilently | ScriptedCharge::Drop
				);
				(outcome_for(status.unwrap_or(PaymentStatus::Unknown)), silent)
			}
		};

		if self.config.latency_ms > 0 {
			tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
		}

		if silent {
			return Err(PaymentError::Network("response lost".to_string()));
		}
		Ok(outcome)
	}

	async fn query_status(&self, key: &IdempotencyKey) -> Result<PaymentStatus, PaymentError> {
		let ledger = self.ledger.read().await;
		Ok(ledger
			.get(key.as_str())
			.map_or(PaymentStatus::Unknown, |tx| tx.status))
	}
}

/// Configuration schema for the simulated processor.
pub struct SimulatedProcessorSchema;

impl ConfigSchema for SimulatedProcessorSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"success_rate",
					FieldType::Float {
						min: Some(0.0),
						max: Some(1.0),
					},
				),
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the simulated processor.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = PaymentFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn PaymentInterface>, PaymentError> {
			SimulatedProcessorSchema
				.validate(config)
				.map_err(|e| PaymentError::Configuration(e.to_string()))?;
			let simulated: SimulatedConfig = config
				.clone()
				.try_into()
				.map_err(|e| PaymentError::Configuration(format!("Invalid simulated config: {}", e)))?;
			Ok(Box::new(SimulatedProcessor::new(simulated)))
		}
	}
}

impl PaymentRegistry for Registry {}
