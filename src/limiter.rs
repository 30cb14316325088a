//! Per-client fixed-window rate limiting for token redemption.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	clock::Clock,
	obs::{self, Operation, OperationSpan, Outcome},
	store::CounterStore,
};

/// Quota and window length enforced per client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPolicy {
	/// Length of one window.
	pub window: Duration,
	/// Requests admitted per window.
	pub quota: u32,
}
impl WindowPolicy {
	/// Default window length (60 seconds).
	pub const DEFAULT_WINDOW: Duration = Duration::seconds(60);
	/// Default number of requests admitted per window.
	pub const DEFAULT_QUOTA: u32 = 10;

	/// Creates a policy admitting `quota` requests per `window`.
	pub fn new(window: Duration, quota: u32) -> Self {
		Self { window, quota }
	}

	/// Advances `slot` by one request observed at `now`.
	///
	/// - No window, or `now` past the reset instant: start a fresh window with `count = 1`.
	/// - Live window under quota: increment.
	/// - Live window at quota: reject without counting the request.
	pub fn step(&self, slot: &mut Option<WindowCounter>, now: OffsetDateTime) -> Admission {
		match slot {
			Some(counter) if !counter.has_elapsed_at(now) =>
				if counter.count < self.quota {
					counter.count += 1;

					Admission::Admitted
				} else {
					Admission::Rejected(RetryDirective::until(counter.reset_at, now))
				},
			_ => {
				*slot = Some(WindowCounter { count: 1, reset_at: now + self.window });

				Admission::Admitted
			},
		}
	}
}
impl Default for WindowPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_WINDOW, Self::DEFAULT_QUOTA)
	}
}

/// Requests seen from one client in its current window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowCounter {
	/// Requests admitted in the current window.
	pub count: u32,
	/// Last instant that still belongs to the current window.
	pub reset_at: OffsetDateTime,
}
impl WindowCounter {
	/// Returns `true` once `now` is past the reset instant.
	pub fn has_elapsed_at(&self, now: OffsetDateTime) -> bool {
		now > self.reset_at
	}
}

/// Result of [`RateLimiter::admit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
	/// The request may proceed.
	Admitted,
	/// The client exhausted its quota for the current window.
	Rejected(RetryDirective),
}
impl Admission {
	/// Returns `true` for [`Admission::Admitted`].
	pub fn is_admitted(&self) -> bool {
		matches!(self, Self::Admitted)
	}
}

/// Advises callers when to retry after an [`Admission::Rejected`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant the current window resets.
	pub earliest_retry_at: OffsetDateTime,
	/// Time left in the current window.
	pub retry_after: Duration,
}
impl RetryDirective {
	/// Builds a directive pointing at `reset_at`, observed at `now`.
	pub fn until(reset_at: OffsetDateTime, now: OffsetDateTime) -> Self {
		let remaining = reset_at - now;

		Self {
			earliest_retry_at: reset_at,
			retry_after: if remaining.is_negative() { Duration::ZERO } else { remaining },
		}
	}

	/// Whole seconds to wait, rounded up and never below one.
	pub fn retry_after_secs(&self) -> u64 {
		let whole = self.retry_after.whole_seconds().max(0) as u64;
		let partial = u64::from(self.retry_after.subsec_nanoseconds() > 0);

		(whole + partial).max(1)
	}
}

/// Fixed-window limiter keyed by [`ClientId`].
///
/// Windows start at a client's first request and do not slide: a client may spend its whole
/// quota at the end of one window and again at the start of the next, so up to twice the quota
/// can pass within one window length straddling a reset.
#[derive(Clone, Debug)]
pub struct RateLimiter {
	store: Arc<dyn CounterStore>,
	clock: Arc<dyn Clock>,
	policy: WindowPolicy,
}
impl RateLimiter {
	/// Creates a limiter over the provided window store.
	pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, policy: WindowPolicy) -> Self {
		Self { store, clock, policy }
	}

	/// Counts one request from `client` and decides whether it may proceed.
	pub fn admit(&self, client: &ClientId) -> Admission {
		const OP: Operation = Operation::Admit;

		let _span = OperationSpan::new(OP, "admit").entered();
		let now = self.clock.now();
		let policy = self.policy;
		let admission = self.store.apply(client, &mut |slot| policy.step(slot, now));

		match &admission {
			Admission::Admitted => obs::record_outcome(OP, Outcome::Success),
			Admission::Rejected(directive) => {
				obs::record_outcome(OP, Outcome::Rejected);
				#[cfg(feature = "tracing")]
				tracing::warn!(
					client = %client,
					retry_after_secs = directive.retry_after_secs(),
					"rate limit exceeded"
				);
				#[cfg(not(feature = "tracing"))]
				let _ = directive;
			},
		}

		admission
	}

	/// Drops windows that have already reset. A dropped window and a missing one admit
	/// identically, so sweeping never changes admission results.
	pub fn sweep(&self) -> usize {
		let _span = OperationSpan::new(Operation::Sweep, "rate_limit_windows").entered();

		self.store.purge_elapsed(self.clock.now())
	}

	/// Number of client windows currently tracked.
	pub fn len(&self) -> usize {
		self.store.len()
	}

	/// Returns `true` when no client windows are tracked.
	pub fn is_empty(&self) -> bool {
		self.store.is_empty()
	}

	/// Policy enforced by this limiter.
	pub fn policy(&self) -> WindowPolicy {
		self.policy
	}
}
