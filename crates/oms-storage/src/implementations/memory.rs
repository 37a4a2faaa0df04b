//! In-memory storage backend.
//!
//! Keeps every entry in a map behind an async read-write lock. Revisions come
//! from a single counter so a key that is deleted and written again never
//! reuses an old revision. Nothing survives a restart.

use crate::{StorageError, StorageInterface, StorageRegistry, StoredValue};
use async_trait::async_trait;
use oms_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	revision: u64,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|deadline| now < deadline)
	}
}

#[derive(Debug, Default)]
struct MemoryState {
	entries: HashMap<String, Entry>,
	last_revision: u64,
}

impl MemoryState {
	fn live(&self, key: &str) -> Option<&Entry> {
		let now = Instant::now();
		self.entries.get(key).filter(|entry| entry.is_live(now))
	}

	fn write(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> u64 {
		self.last_revision += 1;
		let revision = self.last_revision;
		self.entries.insert(
			key.to_string(),
			Entry {
				value,
				revision,
				expires_at: ttl
					.filter(|ttl| !ttl.is_zero())
					.map(|ttl| Instant::now() + ttl),
			},
		);
		revision
	}
}

/// In-memory storage implementation.
pub struct MemoryStorage {
	state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(MemoryState::default())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<StoredValue, StorageError> {
		let state = self.state.read().await;
		state
			.live(key)
			.map(|entry| StoredValue {
				value: entry.value.clone(),
				revision: entry.revision,
			})
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		let mut state = self.state.write().await;
		Ok(state.write(key, value, ttl))
	}

	async fn compare_and_set(
		&self,
		key: &str,
		value: Vec<u8>,
		expected_revision: u64,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		let mut state = self.state.write().await;
		let actual = state.live(key).map_or(0, |entry| entry.revision);
		if actual != expected_revision {
			return Err(if actual == 0 {
				StorageError::NotFound
			} else {
				StorageError::Conflict {
					expected: expected_revision,
					actual,
				}
			});
		}
		Ok(state.write(key, value, ttl))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut state = self.state.write().await;
		state.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let state = self.state.read().await;
		Ok(state.live(key).is_some())
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", namespace);
		let now = Instant::now();
		let state = self.state.read().await;
		Ok(state
			.entries
			.iter()
			.filter(|(_, entry)| entry.is_live(now))
			.filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut state = self.state.write().await;
		let before = state.entries.len();
		state.entries.retain(|_, entry| entry.is_live(now));
		Ok(before - state.entries.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No settings
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
