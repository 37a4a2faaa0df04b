//! Circuit breaker guarding the payment processor.
//!
//! After `failure_threshold` consecutive processor failures the circuit opens
//! and new payments are refused until `cooldown` has passed. The circuit then
//! turns half-open: requests go through again, the next success closes it and
//! the next failure opens it for another cooldown.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Observable state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
	consecutive_failures: u32,
	opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
	failure_threshold: u32,
	cooldown: Duration,
	inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
	pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
		Self {
			failure_threshold: failure_threshold.max(1),
			cooldown,
			inner: Mutex::new(BreakerInner {
				consecutive_failures: 0,
				opened_at: None,
			}),
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
		// State stays consistent even if a holder panicked
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Cooldown left for a circuit opened at `opened_at`, if any.
	fn remaining(&self, opened_at: Instant) -> Option<Duration> {
		self.cooldown
			.checked_sub(opened_at.elapsed())
			.filter(|left| !left.is_zero())
	}

	pub fn state(&self) -> CircuitState {
		match self.lock().opened_at {
			None => CircuitState::Closed,
			Some(opened_at) => match self.remaining(opened_at) {
				Some(_) => CircuitState::Open,
				None => CircuitState::HalfOpen,
			},
		}
	}

	/// Ok when requests may be sent; otherwise the time left until they may.
	pub fn check(&self) -> Result<(), Duration> {
		match self.lock().opened_at.and_then(|opened_at| self.remaining(opened_at)) {
			Some(left) => Err(left),
			None => Ok(()),
		}
	}

	pub fn record_success(&self) {
		let mut inner = self.lock();
		inner.consecutive_failures = 0;
		inner.opened_at = None;
	}

	pub fn record_failure(&self) {
		let mut inner = self.lock();
		inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

		let half_open = inner
			.opened_at
			.is_some_and(|opened_at| self.remaining(opened_at).is_none());
		if half_open || inner.consecutive_failures >= self.failure_threshold {
			if inner.opened_at.is_none() || half_open {
				tracing::warn!(
					consecutive_failures = inner.consecutive_failures,
					cooldown_secs = self.cooldown.as_secs(),
					"Payment processor circuit opened"
				);
			}
			inner.opened_at = Some(Instant::now());
		}
	}
}
