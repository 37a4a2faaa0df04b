//! String formatting helpers for log output.

/// Shortens an identifier for log output.
///
/// Order ids are UUIDs; the first eight characters are enough to tell
/// orders apart in logs while keeping lines readable.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}
