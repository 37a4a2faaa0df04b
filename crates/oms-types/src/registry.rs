//! Registry trait for self-registering implementations.
//!
//! Storage backends and payment processors register themselves under the
//! name used to select them in configuration, together with the factory
//! that builds them.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage, payment) provides a `Registry` struct per
/// implementation so the service binary can discover every backend without
/// hard-coding constructors.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// for example "memory" for `storage.implementations.memory` or
	/// "simulated" for `payment.implementations.simulated`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
