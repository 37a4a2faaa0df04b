//! Time helpers.

use chrono::{DateTime, Utc};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
	Utc::now().timestamp().max(0) as u64
}

/// The later of two instants, used to keep `updated_at` monotonic.
pub fn later_of(current: DateTime<Utc>, candidate: DateTime<Utc>) -> DateTime<Utc> {
	if candidate > current {
		candidate
	} else {
		current
	}
}
