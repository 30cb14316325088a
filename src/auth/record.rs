//! Vault-owned token records and their lifecycle status.

// self
use crate::{
	_prelude::*,
	auth::{secret::ApiKey, token::SessionToken},
};

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	/// Token resolves to its secret.
	Active,
	/// Token passed its expiry instant and must behave like an unknown token.
	Expired,
}

/// A minted session token together with the key it unlocks.
#[derive(Clone)]
pub struct TokenRecord {
	/// Token handed to the client.
	pub token: SessionToken,
	/// Key released on redemption; callers must avoid logging it.
	pub secret: ApiKey,
	/// Instant the vault minted the token.
	pub issued_at: OffsetDateTime,
	/// Last instant at which the token still resolves.
	pub expires_at: OffsetDateTime,
}
impl TokenRecord {
	/// Creates a record valid from `issued_at` through `issued_at + ttl` (inclusive).
	pub fn new(token: SessionToken, secret: ApiKey, issued_at: OffsetDateTime, ttl: Duration) -> Self {
		Self { token, secret, issued_at, expires_at: issued_at + ttl }
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant > self.expires_at { TokenStatus::Expired } else { TokenStatus::Active }
	}

	/// Returns `true` if the record still resolves at the provided instant.
	pub fn is_active_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Active)
	}

	/// Remaining validity at the provided instant, or zero once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("token", &self.token)
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
