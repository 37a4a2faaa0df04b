//! Storage module for the order service.
//!
//! Provides a byte-level backend abstraction with per-key revisions, so
//! callers can perform optimistic read-modify-write cycles, and a typed
//! `StorageService` on top of it that stores JSON documents under
//! `namespace:id` keys.

use async_trait::async_trait;
use oms_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// A conditional write found a different revision than expected.
	#[error("Revision conflict: expected {expected}, found {actual}")]
	Conflict { expected: u64, actual: u64 },
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Raw bytes stored under a key together with their revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
	pub value: Vec<u8>,
	/// Increases on every write of the key; never 0 for a stored value.
	pub revision: u64,
}

/// A decoded document and the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
	pub value: T,
	pub revision: u64,
}

/// Trait defining the low-level interface for storage backends.
///
/// Every successful write returns the new revision of the key. Expired
/// entries behave exactly like absent ones.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves the bytes and revision stored under `key`.
	async fn get_bytes(&self, key: &str) -> Result<StoredValue, StorageError>;

	/// Stores `value` unconditionally, with an optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError>;

	/// Stores `value` only if the current revision equals `expected_revision`.
	///
	/// An expected revision of 0 means the key must not exist yet. Fails with
	/// `Conflict` on a revision mismatch and with `NotFound` when a non-zero
	/// revision is expected for a missing key.
	async fn compare_and_set(
		&self,
		key: &str,
		value: Vec<u8>,
		expected_revision: u64,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists the ids of all live entries in `namespace`.
	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for this storage implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries, returning how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Selects which documents a namespace query returns.
#[derive(Debug, Clone)]
pub enum QueryFilter {
	/// Every document in the namespace.
	All,
	/// Documents whose top-level `field` equals the value.
	Equals(String, serde_json::Value),
}

impl QueryFilter {
	fn matches(&self, document: &serde_json::Value) -> bool {
		match self {
			QueryFilter::All => true,
			QueryFilter::Equals(field, expected) => document.get(field) == Some(expected),
		}
	}
}

/// High-level storage service that stores typed JSON documents.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn storage_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a document only if nothing is stored under the id yet.
	pub async fn create<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		self.backend
			.compare_and_set(&storage_key(namespace, id), encode(data)?, 0, ttl)
			.await
	}

	/// Retrieves a document together with its current revision.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let stored = self.backend.get_bytes(&storage_key(namespace, id)).await?;
		Ok(Versioned {
			value: decode(&stored.value)?,
			revision: stored.revision,
		})
	}

	/// Replaces a document if it is still at `expected_revision`.
	pub async fn update_versioned<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		expected_revision: u64,
	) -> Result<u64, StorageError> {
		if expected_revision == 0 {
			return Err(StorageError::NotFound);
		}
		self.backend
			.compare_and_set(&storage_key(namespace, id), encode(data)?, expected_revision, None)
			.await
	}

	/// Checks whether a document exists.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&storage_key(namespace, id)).await
	}

	/// Returns every document in `namespace` matching `filter`.
	///
	/// Entries that disappear or expire between listing and reading are
	/// skipped.
	pub async fn query<T: DeserializeOwned>(
		&self,
		namespace: &str,
		filter: QueryFilter,
	) -> Result<Vec<Versioned<T>>, StorageError> {
		let mut results = Vec::new();
		for id in self.backend.list_keys(namespace).await? {
			let stored = match self.backend.get_bytes(&storage_key(namespace, &id)).await {
				Ok(stored) => stored,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let document: serde_json::Value = decode(&stored.value)?;
			if !filter.matches(&document) {
				continue;
			}
			let value = serde_json::from_value(document)
				.map_err(|e| StorageError::Serialization(e.to_string()))?;
			results.push(Versioned {
				value,
				revision: stored.revision,
			});
		}
		Ok(results)
	}

	/// Removes expired entries from the backend.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
