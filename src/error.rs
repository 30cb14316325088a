//! Crate-level error types shared by the vault, gateway, configuration, and server.
//!
//! Expected conditions (expired tokens, exhausted quotas) are not errors here; they travel as
//! explicit outcome values ([`crate::limiter::Admission`], [`crate::gateway::ExchangeError`]).
//! Only faults that should abort a request end up in [`Error`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The operating system entropy source failed while generating a token.
	#[error("Entropy source failed: {message}.")]
	Entropy {
		/// Error reported by the random source.
		message: String,
	},
	/// Freshly generated tokens kept colliding with outstanding ones.
	#[error("Could not generate an unused session token after {attempts} attempts.")]
	TokenCollision {
		/// Number of generation attempts made.
		attempts: u32,
	},
	/// Socket or runtime I/O failure surfaced by the server.
	#[error("I/O error: {0}.")]
	Io(#[from] std::io::Error),
}

/// Configuration and key-source failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// A setting could not be parsed or is out of range.
	#[error("Setting `{key}` has an invalid value `{value}`.")]
	InvalidValue {
		/// Environment key (or field name) that failed.
		key: &'static str,
		/// Offending raw value.
		value: String,
	},
	/// An environment variable holds bytes that are not valid unicode.
	#[error("Setting `{key}` is not valid unicode.")]
	NotUnicode {
		/// Environment key that failed.
		key: String,
	},
}
impl ConfigError {
	/// Builds an [`ConfigError::InvalidValue`] for the provided key/value pair.
	pub fn invalid(key: &'static str, value: impl Into<String>) -> Self {
		Self::InvalidValue { key, value: value.into() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn config_error_converts_into_crate_error_with_source() {
		let config_error = ConfigError::invalid("TOKEN_EXCHANGE_RATE_LIMIT", "ten");
		let error: Error = config_error.clone().into();

		assert!(matches!(error, Error::Config(_)));
		assert!(error.to_string().contains("TOKEN_EXCHANGE_RATE_LIMIT"));
		assert_eq!(error.to_string(), config_error.to_string());
	}

	#[test]
	fn io_error_keeps_its_source() {
		let error: Error = std::io::Error::other("address in use").into();
		let source =
			StdError::source(&error).expect("I/O errors should expose the underlying source.");

		assert_eq!(source.to_string(), "address in use");
	}
}
