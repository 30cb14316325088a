//! Token vault: mints session tokens bound to the API key and resolves them while valid.
//!
//! Expiry is enforced lazily on every [`TokenVault::resolve`] and proactively by
//! [`TokenVault::sweep`]; there is no per-token timer. Both paths take the same per-key lock in
//! the [`TokenStore`], so a lookup never observes a half-evicted record.

// self
use crate::{
	_prelude::*,
	auth::{ApiKey, SessionToken, TokenRecord},
	clock::Clock,
	obs::{self, Operation, OperationSpan, Outcome},
	store::{InsertOutcome, TokenStore},
};

/// Owner of every outstanding session token.
#[derive(Clone, Debug)]
pub struct TokenVault {
	store: Arc<dyn TokenStore>,
	clock: Arc<dyn Clock>,
	ttl: Duration,
}
impl TokenVault {
	/// Default token lifetime (one hour).
	pub const DEFAULT_TTL: Duration = Duration::hours(1);
	/// Generation attempts before [`TokenVault::mint`] gives up on collisions.
	pub const MAX_MINT_ATTEMPTS: u32 = 4;

	/// Creates a vault over the provided store; tokens live for `ttl`.
	pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
		Self { store, clock, ttl }
	}

	/// Mints a fresh token bound to `secret`, valid for the configured TTL.
	///
	/// Never hands out a token that is still outstanding: a collision triggers a new draw.
	pub fn mint(&self, secret: &ApiKey) -> Result<SessionToken> {
		const OP: Operation = Operation::Mint;

		let _span = OperationSpan::new(OP, "mint").entered();
		let result = self.mint_inner(secret);

		match &result {
			Ok(_) => obs::record_outcome(OP, Outcome::Success),
			Err(_) => obs::record_outcome(OP, Outcome::Failure),
		}

		result
	}

	fn mint_inner(&self, secret: &ApiKey) -> Result<SessionToken> {
		for _ in 0..Self::MAX_MINT_ATTEMPTS {
			let token = SessionToken::generate()?;
			let record = TokenRecord::new(token.clone(), secret.clone(), self.clock.now(), self.ttl);

			if self.store.insert_new(record) == InsertOutcome::Inserted {
				#[cfg(feature = "tracing")]
				tracing::debug!(
					token = %token,
					ttl_secs = self.ttl.whole_seconds(),
					"session token minted"
				);

				return Ok(token);
			}
		}

		Err(Error::TokenCollision { attempts: Self::MAX_MINT_ATTEMPTS })
	}

	/// Resolves a presented token to its secret.
	///
	/// Unknown, malformed, and expired tokens all yield `None`; an expired record found during
	/// the lookup is evicted. Resolution neither extends nor consumes the token.
	pub fn resolve(&self, token: &str) -> Option<ApiKey> {
		const OP: Operation = Operation::Resolve;

		let _span = OperationSpan::new(OP, "resolve").entered();
		let now = self.clock.now();

		match self.store.fetch_live(token, now) {
			Some(record) => {
				obs::record_outcome(OP, Outcome::Success);
				#[cfg(feature = "tracing")]
				tracing::debug!(
					token = %record.token,
					remaining_secs = record.remaining_at(now).whole_seconds(),
					"session token resolved"
				);

				Some(record.secret)
			},
			None => {
				obs::record_outcome(OP, Outcome::Miss);
				#[cfg(feature = "tracing")]
				tracing::debug!(
					token = %crate::auth::fingerprint(token),
					"session token not resolvable"
				);

				None
			},
		}
	}

	/// Evicts every expired record, returning how many were removed.
	pub fn sweep(&self) -> usize {
		let _span = OperationSpan::new(Operation::Sweep, "session_tokens").entered();

		self.store.purge_expired(self.clock.now())
	}

	/// Number of records held (including expired ones not yet swept).
	pub fn len(&self) -> usize {
		self.store.len()
	}

	/// Returns `true` when the vault holds no records.
	pub fn is_empty(&self) -> bool {
		self.store.is_empty()
	}

	/// Lifetime given to newly minted tokens.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{clock::ManualClock, store::MemoryTokenStore};

	#[derive(Debug, Default)]
	struct AlwaysTaken;
	impl TokenStore for AlwaysTaken {
		fn insert_new(&self, _: TokenRecord) -> InsertOutcome {
			InsertOutcome::Collision
		}

		fn fetch_live(&self, _: &str, _: OffsetDateTime) -> Option<TokenRecord> {
			None
		}

		fn purge_expired(&self, _: OffsetDateTime) -> usize {
			0
		}

		fn len(&self) -> usize {
			0
		}
	}

	fn clock() -> ManualClock {
		ManualClock::new(time::macros::datetime!(2025-01-01 00:00 UTC))
	}

	#[test]
	fn mint_gives_up_after_repeated_collisions() {
		let vault =
			TokenVault::new(Arc::new(AlwaysTaken), Arc::new(clock()), TokenVault::DEFAULT_TTL);
		let err = vault
			.mint(&ApiKey::new("key"))
			.expect_err("Minting must fail when every draw collides.");

		assert!(matches!(err, Error::TokenCollision { attempts: TokenVault::MAX_MINT_ATTEMPTS }));
	}

	#[test]
	fn resolve_is_repeatable_until_expiry() {
		let clock = clock();
		let vault = TokenVault::new(
			Arc::new(MemoryTokenStore::default()),
			Arc::new(clock.clone()),
			Duration::seconds(10),
		);
		let token = vault.mint(&ApiKey::new("key")).expect("Minting should succeed.");

		for _ in 0..3 {
			let secret = vault.resolve(token.expose()).expect("Valid tokens should resolve.");

			assert_eq!(secret.expose(), "key");
		}

		clock.advance(Duration::seconds(11));

		assert!(vault.resolve(token.expose()).is_none());
		assert!(vault.is_empty(), "The expired record must be evicted by the lookup.");
	}

	#[test]
	fn sweep_drops_expired_records_only() {
		let clock = clock();
		let vault = TokenVault::new(
			Arc::new(MemoryTokenStore::default()),
			Arc::new(clock.clone()),
			Duration::seconds(10),
		);
		let key = ApiKey::new("key");

		vault.mint(&key).expect("First mint should succeed.");
		clock.advance(Duration::seconds(8));

		let fresh = vault.mint(&key).expect("Second mint should succeed.");

		clock.advance(Duration::seconds(5));

		assert_eq!(vault.len(), 2);
		assert_eq!(vault.sweep(), 1);
		assert_eq!(vault.len(), 1);
		assert!(vault.resolve(fresh.expose()).is_some());
	}
}
