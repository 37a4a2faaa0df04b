//! API implementations for the order service HTTP endpoints.

pub mod order;
