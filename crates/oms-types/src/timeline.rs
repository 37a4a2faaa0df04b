//! Timeline ledger for orders.
//!
//! Every order carries an ordered record of the lifecycle events it went
//! through. Entries are appended in the order transitions were accepted; that
//! append order drives status derivation, while `view` provides the
//! timestamp-sorted projection clients display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when recording timeline entries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
	/// The event name is not part of the timeline vocabulary.
	#[error("Unknown timeline event: {0}")]
	UnknownEvent(String),
}

/// Fixed vocabulary of timeline event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimelineEventName {
	#[serde(rename = "Created")]
	Created,
	#[serde(rename = "Confirmed")]
	Confirmed,
	#[serde(rename = "Processing Payment")]
	ProcessingPayment,
	#[serde(rename = "Payment Completed")]
	PaymentCompleted,
	#[serde(rename = "Payment Failed")]
	PaymentFailed,
	#[serde(rename = "Delivered")]
	Delivered,
	#[serde(rename = "Cancelled")]
	Cancelled,
}

impl TimelineEventName {
	/// Returns the display label used on the wire and in the ledger.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Created => "Created",
			Self::Confirmed => "Confirmed",
			Self::ProcessingPayment => "Processing Payment",
			Self::PaymentCompleted => "Payment Completed",
			Self::PaymentFailed => "Payment Failed",
			Self::Delivered => "Delivered",
			Self::Cancelled => "Cancelled",
		}
	}
}

impl fmt::Display for TimelineEventName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for TimelineEventName {
	type Err = TimelineError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"Created" => Ok(Self::Created),
			"Confirmed" => Ok(Self::Confirmed),
			"Processing Payment" => Ok(Self::ProcessingPayment),
			"Payment Completed" => Ok(Self::PaymentCompleted),
			"Payment Failed" => Ok(Self::PaymentFailed),
			"Delivered" => Ok(Self::Delivered),
			"Cancelled" => Ok(Self::Cancelled),
			other => Err(TimelineError::UnknownEvent(other.to_string())),
		}
	}
}

/// A single named, timestamped entry in an order's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
	pub name: TimelineEventName,
	pub timestamp: DateTime<Utc>,
}

impl TimelineEvent {
	pub fn new(name: TimelineEventName, timestamp: DateTime<Utc>) -> Self {
		Self { name, timestamp }
	}
}

/// Append-ordered ledger of timeline entries for one order.
///
/// The only non-append mutation is [`Timeline::replace_latest_processing_with`],
/// used when a payment attempt whose outcome was unknown is finally resolved:
/// the dangling `Processing Payment` marker is swapped for the terminal entry
/// so the history never shows the same attempt twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
	events: Vec<TimelineEvent>,
}

impl Timeline {
	/// Creates an empty timeline.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an entry to the end of the ledger.
	pub fn append(&mut self, event: TimelineEvent) {
		self.events.push(event);
	}

	/// Adds an entry by its display name.
	///
	/// Names outside the vocabulary are rejected and the ledger is unchanged.
	pub fn append_named(&mut self, name: &str, at: DateTime<Utc>) -> Result<(), TimelineError> {
		let name = name.parse::<TimelineEventName>()?;
		self.append(TimelineEvent::new(name, at));
		Ok(())
	}

	/// Replaces the most recent `Processing Payment` entry with `event`.
	///
	/// All other entries keep their relative order. When no such entry exists
	/// the event is appended instead. Returns whether a replacement happened.
	pub fn replace_latest_processing_with(&mut self, event: TimelineEvent) -> bool {
		match self
			.events
			.iter()
			.rposition(|e| e.name == TimelineEventName::ProcessingPayment)
		{
			Some(index) => {
				self.events[index] = event;
				true
			},
			None => {
				self.events.push(event);
				false
			},
		}
	}

	/// Entries sorted by timestamp ascending, equal timestamps keeping append order.
	pub fn view(&self) -> Vec<TimelineEvent> {
		let mut sorted = self.events.clone();
		sorted.sort_by_key(|e| e.timestamp);
		sorted
	}

	/// The most recently appended entry.
	pub fn latest(&self) -> Option<&TimelineEvent> {
		self.events.last()
	}

	/// Number of entries with the given name.
	pub fn count(&self, name: TimelineEventName) -> usize {
		self.events.iter().filter(|e| e.name == name).count()
	}

	/// Entries in append order.
	pub fn entries(&self) -> &[TimelineEvent] {
		&self.events
	}

	/// Entry names in append order.
	pub fn names(&self) -> Vec<TimelineEventName> {
		self.events.iter().map(|e| e.name).collect()
	}

	pub fn len(&self) -> usize {
		self.events.len()
	}

	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}
}
