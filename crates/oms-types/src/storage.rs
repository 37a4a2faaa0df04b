//! Storage-related types for the order service.

use std::str::FromStr;

/// Storage namespaces for the collections the service persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Orders, retained indefinitely.
	Orders,
	/// Processed payment notification ids, kept for deduplication.
	Notifications,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Notifications => "notifications",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::Notifications].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"notifications" => Ok(Self::Notifications),
			_ => Err(()),
		}
	}
}
