//! Opaque session tokens issued by the vault.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Number of random bytes behind each token (256 bits).
pub const TOKEN_ENTROPY_BYTES: usize = 32;

const FINGERPRINT_BYTES: usize = 6;

/// Random, unguessable identifier exchanged for the API key while it is valid.
///
/// Tokens are URL-safe base64 without padding. `Debug` and `Display` only print a
/// [fingerprint](SessionToken::fingerprint) so tokens never land in logs verbatim.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);
impl SessionToken {
	/// Draws a fresh token from the operating system CSPRNG.
	pub fn generate() -> Result<Self> {
		let mut bytes = [0_u8; TOKEN_ENTROPY_BYTES];

		OsRng.try_fill_bytes(&mut bytes).map_err(|e| Error::Entropy { message: e.to_string() })?;

		Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
	}

	/// Returns the wire representation handed to clients.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Consumes the token and returns its wire representation.
	pub fn into_inner(self) -> String {
		self.0
	}

	/// Short label derived from a SHA-256 digest of the token, safe to log and correlate.
	pub fn fingerprint(&self) -> String {
		fingerprint(&self.0)
	}
}
impl Borrow<str> for SessionToken {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for SessionToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SessionToken").field(&self.fingerprint()).finish()
	}
}
impl Display for SessionToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.fingerprint())
	}
}

/// Fingerprints an arbitrary presented token string the same way [`SessionToken`] does.
pub fn fingerprint(raw: &str) -> String {
	let digest = Sha256::digest(raw.as_bytes());

	URL_SAFE_NO_PAD.encode(&digest[..FINGERPRINT_BYTES])
}
