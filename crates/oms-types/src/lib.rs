//! Common types module for the order management system.
//!
//! This module defines the core data types shared by every component of the
//! order service: orders and their lifecycle vocabulary, the timeline ledger,
//! payment outcomes, storage namespaces, configuration validation and the
//! HTTP API request and response shapes.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Event types for inter-service communication.
pub mod events;
/// Order types including status, lifecycle events and payment attempts.
pub mod order;
/// Payment processor types: idempotency keys and charge outcomes.
pub mod payment;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Timeline ledger recording an order's lifecycle history.
pub mod timeline;
/// Utility functions for formatting and time handling.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use events::*;
pub use order::*;
pub use payment::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use timeline::*;
pub use utils::{current_timestamp, later_of, truncate_id};
pub use validation::*;
