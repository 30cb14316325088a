//! Injectable in-memory state for the vault and the rate limiter.
//!
//! Both stores expose atomic per-key primitives instead of raw map access: the expiry check in
//! [`TokenStore::fetch_live`] and the window step in [`CounterStore::apply`] run under the lock
//! that guards the key, so concurrent callers always observe a fully valid or fully evicted
//! record. Keys are spread over independently locked shards.

pub mod memory;
pub mod shard;

pub use memory::{MemoryCounterStore, MemoryTokenStore};
pub use shard::ShardedMap;

// self
use crate::{
	_prelude::*,
	auth::{ClientId, TokenRecord},
	limiter::{Admission, WindowCounter},
};

/// Window step applied by [`CounterStore::apply`]; receives the client's slot (`None` when the
/// client has no live window) and may create, update, or clear it.
pub type CounterStep<'a> = dyn FnMut(&mut Option<WindowCounter>) -> Admission + 'a;

/// Storage contract for minted session tokens.
pub trait TokenStore
where
	Self: Debug + Send + Sync,
{
	/// Stores a new record unless its token is already outstanding.
	fn insert_new(&self, record: TokenRecord) -> InsertOutcome;

	/// Returns the record for `token` if it is still valid at `now`.
	///
	/// An expired record is removed in the same critical section and reported as `None`, exactly
	/// like a token that never existed.
	fn fetch_live(&self, token: &str, now: OffsetDateTime) -> Option<TokenRecord>;

	/// Removes every record that has expired at `now`, returning how many were dropped.
	fn purge_expired(&self, now: OffsetDateTime) -> usize;

	/// Number of records currently held, expired or not.
	fn len(&self) -> usize;

	/// Returns `true` when no records are held.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Storage contract for per-client rate-limit windows.
pub trait CounterStore
where
	Self: Debug + Send + Sync,
{
	/// Runs `step` over the client's window slot atomically with respect to other calls for the
	/// same client.
	fn apply(&self, client: &ClientId, step: &mut CounterStep<'_>) -> Admission;

	/// Removes windows whose reset instant is strictly before `now`, returning how many were
	/// dropped.
	fn purge_elapsed(&self, now: OffsetDateTime) -> usize;

	/// Number of client windows currently held.
	fn len(&self) -> usize;

	/// Returns `true` when no windows are held.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Result of [`TokenStore::insert_new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
	/// The record was stored.
	Inserted,
	/// A record with the same token already exists; nothing was written.
	Collision,
}
