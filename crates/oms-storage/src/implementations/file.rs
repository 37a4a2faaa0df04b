//! File-based storage backend.
//!
//! Each entry lives in `<storage_path>/<namespace>/<id>.bin`: a fixed 64-byte
//! header carrying the expiry and revision, followed by the document bytes.
//! Writes go to a temporary file that is renamed into place, and all writes
//! are serialized by one lock so conditional writes are atomic within the
//! process.

use crate::{StorageError, StorageInterface, StorageRegistry, StoredValue};
use async_trait::async_trait;
use oms_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey,
	ValidationError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "OMSF"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-21]: Revision (u64, little-endian)
/// - [22-63]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	expires_at: u64,
	revision: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"OMSF";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(ttl: Option<Duration>, revision: u64) -> Self {
		let expires_at = match ttl.filter(|ttl| !ttl.is_zero()) {
			Some(ttl) => current_timestamp().saturating_add(ttl.as_secs().max(1)),
			None => 0,
		};
		Self {
			expires_at,
			revision,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes[14..22].copy_from_slice(&self.revision.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let read_u64 = |range: std::ops::Range<usize>| {
			let mut buf = [0u8; 8];
			buf.copy_from_slice(&bytes[range]);
			u64::from_le_bytes(buf)
		};

		Ok(Self {
			expires_at: read_u64(6..14),
			revision: read_u64(14..22),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default TTLs per storage namespace, read from `ttl_<namespace>` settings.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter_map(|key| {
				config
					.get(format!("ttl_{}", key.as_str()))
					.and_then(|v| v.as_integer())
					.map(|secs| (key, Duration::from_secs(secs.max(0) as u64)))
			})
			.collect();
		Self { ttls }
	}

	fn ttl_for(&self, namespace: &str) -> Option<Duration> {
		namespace
			.parse::<StorageKey>()
			.ok()
			.and_then(|key| self.ttls.get(&key).copied())
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
	write_lock: Mutex<()>,
}

/// Makes a key component safe to use as a path segment.
fn sanitize(component: &str) -> String {
	let cleaned = component.replace(['/', '\\', ':'], "_");
	if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
		format!("_{}", cleaned)
	} else {
		cleaned
	}
}

fn split_key(key: &str) -> (&str, &str) {
	key.split_once(':').unwrap_or(("default", key))
}

fn backend_error(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
			write_lock: Mutex::new(()),
		}
	}

	fn namespace_dir(&self, namespace: &str) -> PathBuf {
		self.base_path.join(sanitize(namespace))
	}

	fn file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = split_key(key);
		self.namespace_dir(namespace)
			.join(format!("{}.bin", sanitize(id)))
	}

	/// Reads the header and payload of a live entry.
	async fn read_entry(&self, path: &Path) -> Result<Option<(FileHeader, Vec<u8>)>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(backend_error(e)),
		};
		let header = FileHeader::deserialize(&data)?;
		if header.is_expired() {
			return Ok(None);
		}
		Ok(Some((header, data[FileHeader::SIZE..].to_vec())))
	}

	/// Writes an entry atomically. Caller must hold `write_lock`.
	async fn write_entry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
		revision: u64,
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend_error)?;
		}

		let ttl = ttl.or_else(|| self.ttl_config.ttl_for(split_key(key).0));
		let header = FileHeader::new(ttl, revision);

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data).await.map_err(backend_error)?;
		fs::rename(&temp_path, &path).await.map_err(backend_error)
	}

	/// Revision stored on disk, 0 when absent or expired.
	async fn current_revision(&self, key: &str) -> Result<u64, StorageError> {
		Ok(self
			.read_entry(&self.file_path(key))
			.await?
			.map_or(0, |(header, _)| header.revision))
	}

	async fn bin_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
		let mut entries = match fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend_error(e)),
		};
		let mut files = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend_error)? {
			let path = entry.path();
			if path.extension() == Some(std::ffi::OsStr::new("bin")) {
				files.push(path);
			}
		}
		Ok(files)
	}

	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut removed = 0;

		let mut namespaces = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(backend_error(e)),
		};

		while let Some(namespace) = namespaces.next_entry().await.map_err(backend_error)? {
			if !namespace.path().is_dir() {
				continue;
			}
			for path in self.bin_files(&namespace.path()).await? {
				let data = match fs::read(&path).await {
					Ok(data) => data,
					Err(e) => {
						tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
						continue;
					},
				};
				let Ok(header) = FileHeader::deserialize(&data) else {
					tracing::debug!("Skipping file {:?}: no valid header", path);
					continue;
				};
				if !header.is_expired() {
					continue;
				}
				match fs::remove_file(&path).await {
					Ok(()) => removed += 1,
					Err(e) => tracing::warn!("Failed to remove expired file {:?}: {}", path, e),
				}
			}
		}

		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<StoredValue, StorageError> {
		match self.read_entry(&self.file_path(key)).await? {
			Some((header, value)) => Ok(StoredValue {
				value,
				revision: header.revision,
			}),
			None => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		let _guard = self.write_lock.lock().await;
		let revision = self.current_revision(key).await? + 1;
		self.write_entry(key, &value, ttl, revision).await?;
		Ok(revision)
	}

	async fn compare_and_set(
		&self,
		key: &str,
		value: Vec<u8>,
		expected_revision: u64,
		ttl: Option<Duration>,
	) -> Result<u64, StorageError> {
		let _guard = self.write_lock.lock().await;
		let actual = self.current_revision(key).await?;
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
		let revision = actual + 1;
		self.write_entry(key, &value, ttl, revision).await?;
		Ok(revision)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_error(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read_entry(&self.file_path(key)).await?.is_some())
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let mut ids = Vec::new();
		for path in self.bin_files(&self.namespace_dir(namespace)).await? {
			if self.read_entry(&path).await?.is_none() {
				continue;
			}
			if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
				ids.push(stem.to_string());
			}
		}
		Ok(ids)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];
		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_orders`: default TTL in seconds for orders (default: 0, never expire)
/// - `ttl_notifications`: default TTL in seconds for notification ids
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
