//! Optional observability helpers for vault, limiter, and gateway operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_exchange.op` with the `op`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `token_exchange_operation_total` counter for every
//!   outcome, labeled by `op` + `outcome`.
//! - Enable `server` to get [`init_subscriber`] for binaries.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Token issuance by the vault.
	Mint,
	/// Token lookup by the vault.
	Resolve,
	/// Rate-limit admission check.
	Admit,
	/// `/api-key` configuration check.
	CheckApiKey,
	/// `/exchange-token` redemption.
	Exchange,
	/// Periodic eviction pass.
	Sweep,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::Mint => "mint",
			Operation::Resolve => "resolve",
			Operation::Admit => "admit",
			Operation::CheckApiKey => "check_api_key",
			Operation::Exchange => "exchange",
			Operation::Sweep => "sweep",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// The operation did what the caller asked.
	Success,
	/// A lookup found nothing valid.
	Miss,
	/// The request was refused (quota, missing input).
	Rejected,
	/// An unexpected fault.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Success => "success",
			Outcome::Miss => "miss",
			Outcome::Rejected => "rejected",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
