//! Thread-safe in-memory [`TokenStore`] and [`CounterStore`] implementations.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, SessionToken, TokenRecord},
	limiter::{Admission, WindowCounter},
	store::{CounterStep, CounterStore, InsertOutcome, ShardedMap, TokenStore},
};

/// Process-lifetime token storage. Clones share the same records.
#[derive(Clone, Debug, Default)]
pub struct MemoryTokenStore(Arc<ShardedMap<SessionToken, TokenRecord>>);
impl MemoryTokenStore {
	/// Creates a store spread over `shards` independently locked shards.
	pub fn with_shards(shards: usize) -> Self {
		Self(Arc::new(ShardedMap::with_shards(shards)))
	}
}
impl TokenStore for MemoryTokenStore {
	fn insert_new(&self, record: TokenRecord) -> InsertOutcome {
		if self.0.insert_absent(record.token.clone(), record) {
			InsertOutcome::Inserted
		} else {
			InsertOutcome::Collision
		}
	}

	fn fetch_live(&self, token: &str, now: OffsetDateTime) -> Option<TokenRecord> {
		self.0.get_or_evict(token, |record| record.is_active_at(now))
	}

	fn purge_expired(&self, now: OffsetDateTime) -> usize {
		self.0.retain(|_, record| record.is_active_at(now))
	}

	fn len(&self) -> usize {
		self.0.len()
	}
}

/// Process-lifetime rate-limit window storage. Clones share the same windows.
#[derive(Clone, Debug, Default)]
pub struct MemoryCounterStore(Arc<ShardedMap<ClientId, WindowCounter>>);
impl MemoryCounterStore {
	/// Creates a store spread over `shards` independently locked shards.
	pub fn with_shards(shards: usize) -> Self {
		Self(Arc::new(ShardedMap::with_shards(shards)))
	}
}
impl CounterStore for MemoryCounterStore {
	fn apply(&self, client: &ClientId, step: &mut CounterStep<'_>) -> Admission {
		self.0.update(client, |slot| step(slot))
	}

	fn purge_elapsed(&self, now: OffsetDateTime) -> usize {
		self.0.retain(|_, counter| !counter.has_elapsed_at(now))
	}

	fn len(&self) -> usize {
		self.0.len()
	}
}
