//! Multi-file configuration loading.
//!
//! A main file may pull in other files through `include`. Every top-level
//! section must come from exactly one file, so a split configuration can never
//! silently override itself.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file together with its includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against
	base_path: PathBuf,
	/// Canonical paths already read, to catch include cycles
	loaded_files: HashSet<PathBuf>,
	/// Which file defined each top-level section
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads, merges and validates the configuration rooted at `config_path`.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;
		let mut merged = self.read_toml(&config_path).await?;

		let includes = match merged.as_table_mut() {
			Some(table) => match table.remove("include") {
				Some(value) => parse_includes(&value)?,
				None => Vec::new(),
			},
			None => Vec::new(),
		};

		self.record_sections(&merged, &config_path)?;

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let included = self.read_toml(&include_path).await?;
			if included.get("include").is_some() {
				return Err(ConfigError::Validation(format!(
					"Nested includes are not supported ({})",
					include_path.display()
				)));
			}
			self.record_sections(&included, &include_path)?;

			if let (Some(target), Some(source)) = (merged.as_table_mut(), included.as_table()) {
				for (key, value) in source {
					target.insert(key.clone(), value.clone());
				}
			}
		}

		let combined = toml::to_string(&merged).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		combined.parse()
	}

	/// Reads a file, substitutes environment references and parses it.
	async fn read_toml(&mut self, path: &Path) -> Result<toml::Value, ConfigError> {
		let canonical_path = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.loaded_files.insert(canonical_path.clone()) {
			return Err(ConfigError::Validation(format!(
				"Include cycle or repeated include: {} was already loaded",
				canonical_path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	/// Registers the top-level sections of `document`, rejecting duplicates.
	fn record_sections(&mut self, document: &toml::Value, source: &Path) -> Result<(), ConfigError> {
		let Some(table) = document.as_table() else {
			return Ok(());
		};
		for key in table.keys().filter(|key| key.as_str() != "include") {
			if let Some(existing) = self.section_sources.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					existing.display(),
					source.display()
				)));
			}
			self.section_sources
				.insert(key.clone(), source.to_path_buf());
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}

		Ok(resolved)
	}
}

/// Accepts `include = "file.toml"` or `include = ["a.toml", "b.toml"]`.
fn parse_includes(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	if let Some(path) = value.as_str() {
		return Ok(vec![PathBuf::from(path)]);
	}

	let items = value.as_array().ok_or_else(|| {
		ConfigError::Validation("Include must be a string or array of strings".into())
	})?;

	items
		.iter()
		.map(|item| {
			item.as_str().map(PathBuf::from).ok_or_else(|| {
				ConfigError::Validation("Include array must contain only strings".into())
			})
		})
		.collect()
}
