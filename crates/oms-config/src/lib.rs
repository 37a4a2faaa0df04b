//! Configuration module for the order service.
//!
//! Loads the service configuration from TOML, substituting `${VAR}` and
//! `${VAR:-default}` environment references before parsing, and validates the
//! result so the rest of the system can rely on sane values.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["storage.toml", "catalog.toml"]` to include other files
//! - Each top-level section must be unique across all files

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use oms_types::Product;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The Display impl embeds the whole input; the message is enough
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Settings for this service instance and its background tasks.
	pub service: ServiceConfig,
	/// Order store backends.
	pub storage: StorageConfig,
	/// Payment processor backends and the protections around them.
	pub payment: PaymentConfig,
	/// Products that can be ordered.
	#[serde(default)]
	pub catalog: CatalogConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
	/// Interval between sweeps that refresh orders stuck in `Processing`.
	#[serde(default = "default_reconcile_interval_seconds")]
	pub reconcile_interval_seconds: u64,
	/// Delay before refreshing an order whose payment outcome was not observed.
	#[serde(default = "default_refresh_delay_seconds")]
	pub refresh_delay_seconds: u64,
	/// Upper bound on concurrently running background tasks.
	#[serde(default = "default_max_concurrent_tasks")]
	pub max_concurrent_tasks: usize,
	/// How long processed payment notification ids are remembered.
	#[serde(default = "default_notification_ttl_seconds")]
	pub notification_ttl_seconds: u64,
}

fn default_reconcile_interval_seconds() -> u64 {
	30
}

fn default_refresh_delay_seconds() -> u64 {
	2
}

fn default_max_concurrent_tasks() -> usize {
	100
}

fn default_notification_ttl_seconds() -> u64 {
	86400
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for the payment processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	/// Which implementation charges are sent to.
	pub primary: String,
	/// Map of processor implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Time allowed for a charge before its outcome is treated as unknown.
	#[serde(default = "default_charge_timeout_ms")]
	pub charge_timeout_ms: u64,
	#[serde(default)]
	pub circuit_breaker: CircuitBreakerConfig,
}

fn default_charge_timeout_ms() -> u64 {
	5000
}

/// Circuit breaker settings for the payment processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
	/// Consecutive processor failures that open the circuit.
	#[serde(default = "default_failure_threshold")]
	pub failure_threshold: u32,
	/// Seconds the circuit stays open before a trial request is allowed.
	#[serde(default = "default_cooldown_seconds")]
	pub cooldown_seconds: u64,
}

impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: default_failure_threshold(),
			cooldown_seconds: default_cooldown_seconds(),
		}
	}
}

fn default_failure_threshold() -> u32 {
	5
}

fn default_cooldown_seconds() -> u64 {
	10
}

/// Product catalog.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
	/// Products keyed by product id.
	#[serde(default)]
	pub products: HashMap<String, ProductConfig>,
}

impl CatalogConfig {
	/// Catalog entries as domain products.
	pub fn products(&self) -> Vec<Product> {
		self.products
			.iter()
			.map(|(id, product)| Product {
				id: id.clone(),
				name: product.name.clone(),
				price: product.price,
			})
			.collect()
	}
}

/// A single catalog entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductConfig {
	pub name: String,
	/// Unit price; write it as a string (`"10.00"`) to keep it exact.
	pub price: Decimal,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	pub cors: Option<CorsConfig>,
}

/// CORS configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
	pub allowed_headers: Vec<String>,
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Replaces `${VAR}` and `${VAR:-default}` references with environment values.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures<'_>| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	if let Some(var_name) = missing {
		return Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		)));
	}

	Ok(resolved.into_owned())
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ConfigError> {
	if condition {
		Ok(())
	} else {
		Err(ConfigError::Validation(message.into()))
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		require(!self.service.id.is_empty(), "Service ID cannot be empty")?;
		require(
			(1..=86400).contains(&self.service.reconcile_interval_seconds),
			"reconcile_interval_seconds must be between 1 and 86400",
		)?;
		require(
			self.service.refresh_delay_seconds <= 3600,
			"refresh_delay_seconds cannot exceed 3600",
		)?;
		require(
			self.service.max_concurrent_tasks > 0,
			"max_concurrent_tasks must be greater than 0",
		)?;

		self.validate_storage()?;
		self.validate_payment()?;
		self.validate_catalog()?;

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			require(api.port != 0, "API port cannot be 0")?;
			require(
				api.timeout_seconds > 0,
				"API timeout_seconds must be greater than 0",
			)?;
		}

		Ok(())
	}

	fn validate_storage(&self) -> Result<(), ConfigError> {
		let storage = &self.storage;
		require(
			!storage.implementations.is_empty(),
			"At least one storage implementation must be configured",
		)?;
		require(
			storage.implementations.contains_key(&storage.primary),
			format!(
				"Primary storage '{}' not found in implementations",
				storage.primary
			),
		)?;
		require(
			(1..=86400).contains(&storage.cleanup_interval_seconds),
			"Storage cleanup_interval_seconds must be between 1 and 86400",
		)
	}

	fn validate_payment(&self) -> Result<(), ConfigError> {
		let payment = &self.payment;
		require(
			!payment.implementations.is_empty(),
			"At least one payment implementation must be configured",
		)?;
		require(
			payment.implementations.contains_key(&payment.primary),
			format!(
				"Primary payment processor '{}' not found in implementations",
				payment.primary
			),
		)?;
		require(
			(1..=60_000).contains(&payment.charge_timeout_ms),
			"charge_timeout_ms must be between 1 and 60000",
		)?;
		require(
			payment.circuit_breaker.failure_threshold > 0,
			"circuit_breaker.failure_threshold must be at least 1",
		)?;
		require(
			payment.circuit_breaker.cooldown_seconds > 0,
			"circuit_breaker.cooldown_seconds must be at least 1",
		)
	}

	fn validate_catalog(&self) -> Result<(), ConfigError> {
		require(
			!self.catalog.products.is_empty(),
			"Catalog must contain at least one product",
		)?;
		for (id, product) in &self.catalog.products {
			require(
				!product.name.trim().is_empty(),
				format!("Product '{}' must have a name", id),
			)?;
			require(
				product.price > Decimal::ZERO,
				format!("Product '{}' must have a positive price", id),
			)?;
		}
		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE_CONFIG: &str = r#"
[service]
id = "oms-test"

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[payment]
primary = "simulated"
[payment.implementations.simulated]
success_rate = 0.8

[catalog.products.widget]
name = "Widget"
price = "10.00"
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("OMS_TEST_HOST", "localhost");
		std::env::set_var("OMS_TEST_PORT", "5432");

		let input = "host = \"${OMS_TEST_HOST}:${OMS_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("OMS_TEST_HOST");
		std::env::remove_var("OMS_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${OMS_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${OMS_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("OMS_MISSING_VAR"));
	}

	#[test]
	fn test_parses_defaults() {
		let config: Config = BASE_CONFIG.parse().unwrap();

		assert_eq!(config.service.id, "oms-test");
		assert_eq!(config.service.reconcile_interval_seconds, 30);
		assert_eq!(config.payment.charge_timeout_ms, 5000);
		assert_eq!(config.payment.circuit_breaker.failure_threshold, 5);
		assert_eq!(config.payment.circuit_breaker.cooldown_seconds, 10);
		assert!(config.api.is_none());

		let products = config.catalog.products();
		assert_eq!(products.len(), 1);
		assert_eq!(products[0].price, Decimal::new(1000, 2));
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("OMS_TEST_SERVICE_ID", "oms-from-env");

		let config_str = BASE_CONFIG.replace("\"oms-test\"", "\"${OMS_TEST_SERVICE_ID}\"");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.service.id, "oms-from-env");

		std::env::remove_var("OMS_TEST_SERVICE_ID");
	}

	#[test]
	fn test_unknown_primary_payment_rejected() {
		let config_str = BASE_CONFIG.replace("primary = \"simulated\"", "primary = \"stripe\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("stripe"));
	}

	#[test]
	fn test_non_positive_price_rejected() {
		let config_str = BASE_CONFIG.replace("price = \"10.00\"", "price = \"0\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("positive price"));
	}

	#[test]
	fn test_empty_catalog_rejected() {
		let config_str = BASE_CONFIG.replace(
			"[catalog.products.widget]\nname = \"Widget\"\nprice = \"10.00\"\n",
			"",
		);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("at least one product"));
	}

	#[test]
	fn test_zero_charge_timeout_rejected() {
		let config_str =
			BASE_CONFIG.replace("[payment]\n", "[payment]\ncharge_timeout_ms = 0\n");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("charge_timeout_ms"));
	}
}
