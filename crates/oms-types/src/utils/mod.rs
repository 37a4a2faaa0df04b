//! Utility functions shared across the order service.

pub mod formatting;
pub mod time;

pub use formatting::truncate_id;
pub use time::{current_timestamp, later_of};
