//! Lock-sharded hash map used by the in-memory stores.

// std
use std::hash::{BuildHasher, RandomState};
// self
use crate::_prelude::*;

const DEFAULT_SHARDS: usize = 16;

/// Hash map split into independently locked shards.
///
/// Every operation touching a key holds only that key's shard lock for its whole duration, which
/// makes each call atomic per key while letting unrelated keys proceed in parallel.
pub struct ShardedMap<K, V> {
	shards: Box<[Mutex<HashMap<K, V>>]>,
	hasher: RandomState,
}
impl<K, V> ShardedMap<K, V>
where
	K: Eq + Hash,
{
	/// Creates a map with `shards` shards (at least one).
	pub fn with_shards(shards: usize) -> Self {
		let shards = (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect();

		Self { shards, hasher: RandomState::new() }
	}

	/// Inserts `value` unless `key` is already present. Returns `true` on insert.
	pub fn insert_absent(&self, key: K, value: V) -> bool {
		let mut guard = self.shard(&key).lock();

		if guard.contains_key(&key) {
			return false;
		}

		guard.insert(key, value);

		true
	}

	/// Looks up `key` and either returns a clone of its value (when `keep` approves it) or
	/// removes it, all under one lock acquisition.
	pub fn get_or_evict<Q>(&self, key: &Q, keep: impl FnOnce(&V) -> bool) -> Option<V>
	where
		K: Borrow<Q>,
		Q: ?Sized + Eq + Hash,
		V: Clone,
	{
		let mut guard = self.shard(key).lock();
		let verdict = guard.get(key).map(keep)?;

		if verdict {
			guard.get(key).cloned()
		} else {
			guard.remove(key);

			None
		}
	}

	/// Runs `f` over the slot for `key`; whatever `f` leaves in the slot is written back.
	pub fn update<Q, R>(&self, key: &Q, f: impl FnOnce(&mut Option<V>) -> R) -> R
	where
		K: Borrow<Q>,
		Q: ?Sized + Eq + Hash + ToOwned<Owned = K>,
	{
		let mut guard = self.shard(key).lock();
		let mut slot = guard.remove(key);
		let result = f(&mut slot);

		if let Some(value) = slot {
			guard.insert(key.to_owned(), value);
		}

		result
	}

	/// Keeps only the entries `keep` approves, one shard at a time. Returns the number removed.
	pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
		self.shards
			.iter()
			.map(|shard| {
				let mut guard = shard.lock();
				let before = guard.len();

				guard.retain(|k, v| keep(k, v));

				before - guard.len()
			})
			.sum()
	}

	/// Total number of entries across all shards.
	pub fn len(&self) -> usize {
		self.shards.iter().map(|shard| shard.lock().len()).sum()
	}

	/// Returns `true` when every shard is empty.
	pub fn is_empty(&self) -> bool {
		self.shards.iter().all(|shard| shard.lock().is_empty())
	}

	fn shard<Q>(&self, key: &Q) -> &Mutex<HashMap<K, V>>
	where
		Q: ?Sized + Hash,
	{
		let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;

		&self.shards[index]
	}
}
impl<K, V> Default for ShardedMap<K, V>
where
	K: Eq + Hash,
{
	fn default() -> Self {
		Self::with_shards(DEFAULT_SHARDS)
	}
}
impl<K, V> Debug for ShardedMap<K, V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ShardedMap").field("shards", &self.shards.len()).finish()
	}
}
