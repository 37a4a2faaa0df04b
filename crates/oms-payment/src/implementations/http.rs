//! HTTP payment processor client.
//!
//! Talks to a remote processor exposing `POST {base_url}/payments` and
//! `GET {base_url}/payments/{key}`. The idempotency key travels both in the
//! `Idempotency-Key` header and in the request body.

use crate::{PaymentError, PaymentFactory, PaymentInterface, PaymentRegistry};
use async_trait::async_trait;
use oms_types::{
	ChargeOutcome, ConfigSchema, Field, FieldType, IdempotencyKey, ImplementationRegistry,
	PaymentStatus, Schema, ValidationError,
};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
struct HttpProcessorConfig {
	base_url: String,
	#[serde(default)]
	timeout_ms: Option<u64>,
	#[serde(default)]
	api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
	idempotency_key: &'a str,
	order_id: &'a str,
	amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct ProcessorReply {
	status: String,
	#[serde(default)]
	reason: Option<String>,
}

/// Maps the processor's status vocabulary onto ours.
fn map_status(status: &str) -> Result<PaymentStatus, PaymentError> {
	match status.to_ascii_lowercase().as_str() {
		"completed" | "succeeded" => Ok(PaymentStatus::Succeeded),
		"failed" | "declined" => Ok(PaymentStatus::Failed),
		"pending" | "processing" => Ok(PaymentStatus::Pending),
		other => Err(PaymentError::InvalidResponse(format!(
			"unknown payment status '{}'",
			other
		))),
	}
}

/// Payment processor reached over HTTP.
pub struct HttpProcessor {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl HttpProcessor {
	pub fn new(
		base_url: impl Into<String>,
		timeout: Duration,
		api_key: Option<String>,
	) -> Result<Self, PaymentError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| PaymentError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key,
		})
	}

	fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match &self.api_key {
			Some(key) => request.bearer_auth(key),
			None => request,
		}
	}
}

async fn read_reply(response: reqwest::Response) -> Result<ProcessorReply, PaymentError> {
	response
		.json::<ProcessorReply>()
		.await
		.map_err(|e| PaymentError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl PaymentInterface for HttpProcessor {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpProcessorSchema)
	}

	async fn charge(
		&self,
		key: &IdempotencyKey,
		order_id: &str,
		amount: Decimal,
	) -> Result<ChargeOutcome, PaymentError> {
		let request = self
			.client
			.post(format!("{}/payments", self.base_url))
			.header("Idempotency-Key", key.as_str())
			.json(&ChargeRequest {
				idempotency_key: key.as_str(),
				order_id,
				amount,
			});

		let response = self
			.authorize(request)
			.send()
			.await
			.map_err(|e| PaymentError::Network(e.to_string()))?;

		let status = response.status();
		if status.is_success() {
			let reply = read_reply(response).await?;
			return Ok(match map_status(&reply.status)? {
				PaymentStatus::Succeeded => ChargeOutcome::Succeeded,
				PaymentStatus::Failed => ChargeOutcome::Failed {
					reason: reply.reason.unwrap_or_else(|| "payment declined".to_string()),
				},
				PaymentStatus::Pending | PaymentStatus::Unknown => ChargeOutcome::Indeterminate {
					reason: format!("processor reported '{}'", reply.status),
				},
			});
		}

		match status {
			// Same key still being processed on the other side
			StatusCode::CONFLICT => Ok(ChargeOutcome::Indeterminate {
				reason: "charge with this key is in progress".to_string(),
			}),
			// The charge may or may not have been taken; the key settles it later
			StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
				Ok(ChargeOutcome::Indeterminate {
					reason: format!("processor deferred charge ({})", status.as_u16()),
				})
			},
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PaymentError::Unavailable(
				format!("processor refused credentials ({})", status.as_u16()),
			)),
			s if s.is_client_error() => {
				let reason = response.text().await.unwrap_or_default();
				Ok(ChargeOutcome::Failed {
					reason: format!("processor rejected charge ({}): {}", s.as_u16(), reason),
				})
			},
			s => Err(PaymentError::Unavailable(format!(
				"processor answered {}",
				s.as_u16()
			))),
		}
	}

	async fn query_status(&self, key: &IdempotencyKey) -> Result<PaymentStatus, PaymentError> {
		let request = self
			.client
			.get(format!("{}/payments/{}", self.base_url, key.as_str()));

		let response = self
			.authorize(request)
			.send()
			.await
			.map_err(|e| PaymentError::Network(e.to_string()))?;

		match response.status() {
			StatusCode::NOT_FOUND => Ok(PaymentStatus::Unknown),
			s if s.is_success() => map_status(&read_reply(response).await?.status),
			s => Err(PaymentError::Unavailable(format!(
				"status query answered {}",
				s.as_u16()
			))),
		}
	}
}

/// Configuration schema for the HTTP processor.
pub struct HttpProcessorSchema;

impl ConfigSchema for HttpProcessorSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
					_ => Err("base_url must start with http:// or https://".to_string()),
				}
			})],
			vec![
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(1),
						max: Some(60_000),
					},
				),
				Field::new("api_key", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the HTTP processor.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = PaymentFactory;

	fn factory() -> Self::Factory {
		|config: &toml::Value| -> Result<Box<dyn PaymentInterface>, PaymentError> {
			HttpProcessorSchema
				.validate(config)
				.map_err(|e| PaymentError::Configuration(e.to_string()))?;
			let http: HttpProcessorConfig = config
				.clone()
				.try_into()
				.map_err(|e| PaymentError::Configuration(format!("Invalid http config: {}", e)))?;
			let timeout = Duration::from_millis(http.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
			Ok(Box::new(HttpProcessor::new(http.base_url, timeout, http.api_key)?))
		}
	}
}

impl PaymentRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		extract::Path,
		http::{HeaderMap, StatusCode as AxumStatus},
		routing::{get, post},
		Json, Router,
	};
	use serde_json::{json, Value};

	async fn spawn_processor() -> String {
		let app = Router::new()
			.route(
				"/payments",
				post(|headers: HeaderMap, Json(body): Json<Value>| async move {
					let header = headers
						.get("Idempotency-Key")
						.and_then(|v| v.to_str().ok())
						.unwrap_or_default()
						.to_string();
					if header != body["idempotency_key"] {
						return (AxumStatus::BAD_REQUEST, Json(json!({"status": "failed"})));
					}
					match body["order_id"].as_str() {
						Some("declined") => (
							AxumStatus::OK,
							Json(json!({"status": "declined", "reason": "insufficient funds"})),
						),
						Some("busy") => (AxumStatus::CONFLICT, Json(json!({}))),
						Some("throttled") => (AxumStatus::TOO_MANY_REQUESTS, Json(json!({}))),
						Some("slow") => (AxumStatus::REQUEST_TIMEOUT, Json(json!({}))),
						Some("unauthorized") => (AxumStatus::UNAUTHORIZED, Json(json!({}))),
						Some("forbidden") => (AxumStatus::FORBIDDEN, Json(json!({}))),
						Some("invalid") => (
							AxumStatus::UNPROCESSABLE_ENTITY,
							Json(json!({"error": "card expired"})),
						),
						Some("broken") => (AxumStatus::BAD_GATEWAY, Json(json!({}))),
						_ => (AxumStatus::OK, Json(json!({"status": "completed"}))),
					}
				}),
			)
			.route(
				"/payments/{key}",
				get(|Path(key): Path<String>| async move {
					if key.starts_with("ghost") {
						(AxumStatus::NOT_FOUND, Json(json!({})))
					} else {
						(AxumStatus::OK, Json(json!({"status": "pending"})))
					}
				}),
			);

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/", addr)
	}

	fn processor(base_url: String) -> HttpProcessor {
		HttpProcessor::new(base_url, Duration::from_secs(5), None).unwrap()
	}

	async fn charge(processor: &HttpProcessor, order: &str) -> Result<ChargeOutcome, PaymentError> {
		processor
			.charge(&IdempotencyKey::for_attempt(order, 1), order, Decimal::TEN)
			.await
	}

	#[tokio::test]
	async fn test_charge_outcomes() {
		let processor = processor(spawn_processor().await);

		let ok = processor
			.charge(&IdempotencyKey::for_attempt("good", 1), "good", Decimal::TEN)
			.await
			.unwrap();
		assert_eq!(ok, ChargeOutcome::Succeeded);

		let declined = processor
			.charge(&IdempotencyKey::for_attempt("declined", 1), "declined", Decimal::TEN)
			.await
			.unwrap();
		assert_eq!(
			declined,
			ChargeOutcome::Failed {
				reason: "insufficient funds".to_string()
			}
		);

		let busy = processor
			.charge(&IdempotencyKey::for_attempt("busy", 1), "busy", Decimal::TEN)
			.await
			.unwrap();
		assert!(busy.is_indeterminate());

		let broken = processor
			.charge(&IdempotencyKey::for_attempt("broken", 1), "broken", Decimal::TEN)
			.await;
		assert!(matches!(broken, Err(PaymentError::Unavailable(_))));
	}

	#[tokio::test]
	async fn test_client_errors_that_are_not_declines() {
		let processor = processor(spawn_processor().await);

		for order in ["throttled", "slow"] {
			let outcome = charge(&processor, order).await.unwrap();
			assert!(outcome.is_indeterminate(), "{} -> {:?}", order, outcome);
		}
		for order in ["unauthorized", "forbidden"] {
			let result = charge(&processor, order).await;
			assert!(
				matches!(result, Err(PaymentError::Unavailable(_))),
				"{} -> {:?}",
				order,
				result
			);
		}

		let invalid = charge(&processor, "invalid").await.unwrap();
		assert!(
			matches!(&invalid, ChargeOutcome::Failed { reason } if reason.contains("422")),
			"{:?}",
			invalid
		);
	}

	#[tokio::test]
	async fn test_query_status() {
		let processor = processor(spawn_processor().await);

		let pending = processor
			.query_status(&IdempotencyKey::for_attempt("order", 1))
			.await
			.unwrap();
		assert_eq!(pending, PaymentStatus::Pending);

		let unknown = processor
			.query_status(&IdempotencyKey::for_attempt("ghost", 1))
			.await
			.unwrap();
		assert_eq!(unknown, PaymentStatus::Unknown);
	}

	#[tokio::test]
	async fn test_unreachable_processor_is_network_error() {
		let processor = processor("http://127.0.0.1:1".to_string());
		let result = processor
			.charge(&IdempotencyKey::for_attempt("x", 1), "x", Decimal::ONE)
			.await;
		assert!(matches!(result, Err(PaymentError::Network(_))));
	}

	#[test]
	fn test_status_mapping() {
		assert_eq!(map_status("COMPLETED").unwrap(), PaymentStatus::Succeeded);
		assert_eq!(map_status("declined").unwrap(), PaymentStatus::Failed);
		assert_eq!(map_status("processing").unwrap(), PaymentStatus::Pending);
		assert!(matches!(
			map_status("refunded"),
			Err(PaymentError::InvalidResponse(_))
		));
	}

	#[test]
	fn test_schema_requires_http_url() {
		let missing: toml::Value = toml::from_str("timeout_ms = 100").unwrap();
		assert!(HttpProcessorSchema.validate(&missing).is_err());

		let bad: toml::Value = toml::from_str("base_url = \"ftp://pay\"").unwrap();
		assert!(HttpProcessorSchema.validate(&bad).is_err());

		let good: toml::Value =
			toml::from_str("base_url = \"https://pay.example.com\"\ntimeout_ms = 2000").unwrap();
		assert!(HttpProcessorSchema.validate(&good).is_ok());
	}
}
