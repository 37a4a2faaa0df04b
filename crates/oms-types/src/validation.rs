//! Configuration validation for pluggable implementations.
//!
//! Storage backends and payment processors receive their settings as raw TOML
//! tables. Each implementation describes the table it expects with a
//! [`Schema`]; the schema checks presence, types, numeric bounds and custom
//! rules before the implementation is constructed.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Prefixes the field path with the name of the enclosing table.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			Self::MissingField(f) => Self::MissingField(format!("{}.{}", parent, f)),
			Self::InvalidValue { field, message } => Self::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			Self::TypeMismatch {
				field,
				expected,
				actual,
			} => Self::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
		}
	}
}

/// Represents the type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	/// A string value.
	String,
	/// An integer value with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// A float value with optional inclusive bounds; integers are accepted.
	Float { min: Option<f64>, max: Option<f64> },
	/// A monetary amount written as a decimal string, e.g. `"10.00"`.
	Decimal,
	/// A nested table with its own schema.
	Table(Schema),
}

/// Custom validator run after the type check succeeds.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a configuration schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Validation schema for one TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Required fields must be present; optional fields are checked only when
	/// present. Nested tables are validated recursively and report dotted
	/// field paths.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| type_mismatch("root", "table", config))?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn type_mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn out_of_range(field: &str, message: String) -> ValidationError {
	ValidationError::InvalidValue {
		field: field.to_string(),
		message,
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(type_mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| type_mismatch(field_name, "integer", value))?;
			if let Some(min_val) = min.filter(|m| int_val < *m) {
				return Err(out_of_range(
					field_name,
					format!("Value {} is less than minimum {}", int_val, min_val),
				));
			}
			if let Some(max_val) = max.filter(|m| int_val > *m) {
				return Err(out_of_range(
					field_name,
					format!("Value {} is greater than maximum {}", int_val, max_val),
				));
			}
		},
		FieldType::Float { min, max } => {
			let float_val = value
				.as_float()
				.or_else(|| value.as_integer().map(|i| i as f64))
				.ok_or_else(|| type_mismatch(field_name, "float", value))?;
			if let Some(min_val) = min.filter(|m| float_val < *m) {
				return Err(out_of_range(
					field_name,
					format!("Value {} is less than minimum {}", float_val, min_val),
				));
			}
			if let Some(max_val) = max.filter(|m| float_val > *m) {
				return Err(out_of_range(
					field_name,
					format!("Value {} is greater than maximum {}", float_val, max_val),
				));
			}
		},
		FieldType::Decimal => {
			let text = value
				.as_str()
				.ok_or_else(|| type_mismatch(field_name, "decimal string", value))?;
			text.parse::<Decimal>().map_err(|e| {
				out_of_range(field_name, format!("'{}' is not a decimal: {}", text, e))
			})?;
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested_in(field_name))?;
		},
	}

	Ok(())
}

/// Trait implemented by each pluggable implementation to validate its table.
#[async_trait]
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn processor_schema() -> Schema {
		Schema::new(
			vec![Field::new(
				"success_rate",
				FieldType::Float {
					min: Some(0.0),
					max: Some(1.0),
				},
			)],
			vec![
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new("limit", FieldType::Decimal),
				Field::new(
					"retry",
					FieldType::Table(Schema::new(
						vec![Field::new("attempts", FieldType::Integer {
							min: Some(1),
							max: Some(5),
						})],
						vec![],
					)),
				),
			],
		)
	}

	#[test]
	fn test_accepts_integer_for_float_field() {
		let config: toml::Value = toml::from_str("success_rate = 1").unwrap();
		assert!(processor_schema().validate(&config).is_ok());
	}

	#[test]
	fn test_rejects_out_of_range_float() {
		let config: toml::Value = toml::from_str("success_rate = 1.5").unwrap();
		let err = processor_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "success_rate"));
	}

	#[test]
	fn test_rejects_malformed_decimal() {
		let config: toml::Value =
			toml::from_str("success_rate = 0.5\nlimit = \"ten\"").unwrap();
		let err = processor_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "limit"));
	}

	#[test]
	fn test_nested_errors_report_dotted_path() {
		let config: toml::Value =
			toml::from_str("success_rate = 0.5\n[retry]\nattempts = 9").unwrap();
		let err = processor_schema().validate(&config).unwrap_err();
		assert!(
			matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "retry.attempts")
		);
	}

	#[test]
	fn test_missing_required_field() {
		let config: toml::Value = toml::from_str("latency_ms = 10").unwrap();
		let err = processor_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(ref f) if f == "success_rate"));
	}

	#[test]
	fn test_type_mismatch() {
		let config: toml::Value = toml::from_str("success_rate = \"high\"").unwrap();
		let err = processor_schema().validate(&config).unwrap_err();
		assert!(matches!(err, ValidationError::TypeMismatch { .. }));
	}
}
