//! Gateway configuration and environment access.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `TOKEN_EXCHANGE_BIND_ADDR` | `0.0.0.0:8080` | HTTP listen address |
//! | `AUTHENTICATION_API_KEY` | unset | API key released on redemption |
//! | `AUTHENTICATION_API_KEY_PLACEHOLDER` | `BQYHJGJHJ` | key value treated as "not configured" |
//! | `TOKEN_EXCHANGE_TOKEN_TTL_SECS` | `3600` | session token lifetime |
//! | `TOKEN_EXCHANGE_RATE_WINDOW_SECS` | `60` | rate-limit window length |
//! | `TOKEN_EXCHANGE_RATE_LIMIT` | `10` | redemptions per client per window |
//! | `TOKEN_EXCHANGE_SWEEP_INTERVAL_SECS` | `60` | eviction sweep period |
//! | `TOKEN_EXCHANGE_TRUST_FORWARDED_FOR` | `false` | key clients by `X-Forwarded-For` |

// std
use std::{env::VarError, net::SocketAddr};
// self
use crate::{_prelude::*, error::ConfigError, limiter::WindowPolicy, vault::TokenVault};

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "AUTHENTICATION_API_KEY";
/// Default placeholder key shipped in sample configurations.
pub const DEFAULT_PLACEHOLDER_KEY: &str = "BQYHJGJHJ";

const BIND_ADDR_VAR: &str = "TOKEN_EXCHANGE_BIND_ADDR";
const PLACEHOLDER_VAR: &str = "AUTHENTICATION_API_KEY_PLACEHOLDER";
const TOKEN_TTL_VAR: &str = "TOKEN_EXCHANGE_TOKEN_TTL_SECS";
const RATE_WINDOW_VAR: &str = "TOKEN_EXCHANGE_RATE_WINDOW_SECS";
const RATE_LIMIT_VAR: &str = "TOKEN_EXCHANGE_RATE_LIMIT";
const SWEEP_INTERVAL_VAR: &str = "TOKEN_EXCHANGE_SWEEP_INTERVAL_SECS";
const TRUST_FORWARDED_FOR_VAR: &str = "TOKEN_EXCHANGE_TRUST_FORWARDED_FOR";
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::seconds(60);

/// Read access to environment variables.
pub trait ReadEnv {
	/// Returns the value of `key`, mirroring [`std::env::var`].
	fn var(&self, key: &str) -> Result<String, VarError>;
}

/// Process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;
impl ReadEnv for SystemEnv {
	fn var(&self, key: &str) -> Result<String, VarError> {
		std::env::var(key)
	}
}

impl ReadEnv for HashMap<String, String> {
	fn var(&self, key: &str) -> Result<String, VarError> {
		self.get(key).cloned().ok_or(VarError::NotPresent)
	}
}

/// Runtime settings for the gateway and its HTTP server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
	/// Address the HTTP server binds to.
	pub bind_addr: SocketAddr,
	/// Key value that counts as "not configured".
	pub placeholder_key: String,
	/// Lifetime of minted session tokens.
	pub token_ttl: Duration,
	/// Redemption quota per client.
	pub rate_policy: WindowPolicy,
	/// Period between eviction sweeps.
	pub sweep_interval: Duration,
	/// Whether the first `X-Forwarded-For` entry identifies the client.
	pub trust_forwarded_for: bool,
}
impl GatewayConfig {
	/// Loads settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_read_env(&SystemEnv)
	}

	/// Loads settings from any [`ReadEnv`], falling back to defaults for unset keys.
	pub fn from_read_env(env: &impl ReadEnv) -> Result<Self, ConfigError> {
		let defaults = Self::default();
		let bind_addr = read(env, BIND_ADDR_VAR)?
			.map(|raw| {
				raw.parse::<SocketAddr>().map_err(|_| ConfigError::invalid(BIND_ADDR_VAR, raw))
			})
			.transpose()?
			.unwrap_or(defaults.bind_addr);
		let placeholder_key = read(env, PLACEHOLDER_VAR)?.unwrap_or(defaults.placeholder_key);
		let token_ttl = read_secs(env, TOKEN_TTL_VAR)?.unwrap_or(defaults.token_ttl);
		let window = read_secs(env, RATE_WINDOW_VAR)?.unwrap_or(defaults.rate_policy.window);
		let quota = read(env, RATE_LIMIT_VAR)?
			.map(|raw| match raw.trim().parse::<u32>() {
				Ok(quota) if quota > 0 => Ok(quota),
				_ => Err(ConfigError::invalid(RATE_LIMIT_VAR, raw)),
			})
			.transpose()?
			.unwrap_or(defaults.rate_policy.quota);
		let sweep_interval =
			read_secs(env, SWEEP_INTERVAL_VAR)?.unwrap_or(defaults.sweep_interval);
		let trust_forwarded_for = read(env, TRUST_FORWARDED_FOR_VAR)?
			.map(|raw| parse_flag(TRUST_FORWARDED_FOR_VAR, raw))
			.transpose()?
			.unwrap_or(defaults.trust_forwarded_for);

		Ok(Self {
			bind_addr,
			placeholder_key,
			token_ttl,
			rate_policy: WindowPolicy::new(window, quota),
			sweep_interval,
			trust_forwarded_for,
		})
	}

	/// Overrides the listen address.
	pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
		self.bind_addr = addr;

		self
	}

	/// Overrides the placeholder key.
	pub fn with_placeholder_key(mut self, key: impl Into<String>) -> Self {
		self.placeholder_key = key.into();

		self
	}

	/// Overrides the token lifetime.
	pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
		self.token_ttl = ttl;

		self
	}

	/// Overrides the rate-limit policy.
	pub fn with_rate_policy(mut self, policy: WindowPolicy) -> Self {
		self.rate_policy = policy;

		self
	}

	/// Overrides the sweep period.
	pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
		self.sweep_interval = interval;

		self
	}

	/// Enables or disables `X-Forwarded-For` client identification.
	pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
		self.trust_forwarded_for = trust;

		self
	}
}
impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
			placeholder_key: DEFAULT_PLACEHOLDER_KEY.into(),
			token_ttl: TokenVault::DEFAULT_TTL,
			rate_policy: WindowPolicy::default(),
			sweep_interval: DEFAULT_SWEEP_INTERVAL,
			trust_forwarded_for: false,
		}
	}
}

/// Reads `key`, treating an unset variable as `None`.
pub fn read(env: &impl ReadEnv, key: &str) -> Result<Option<String>, ConfigError> {
	match env.var(key) {
		Ok(value) => Ok(Some(value)),
		Err(VarError::NotPresent) => Ok(None),
		Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { key: key.into() }),
	}
}

fn read_secs(env: &impl ReadEnv, key: &'static str) -> Result<Option<Duration>, ConfigError> {
	read(env, key)?
		.map(|raw| match raw.trim().parse::<u32>() {
			Ok(secs) if secs > 0 => Ok(Duration::seconds(i64::from(secs))),
			_ => Err(ConfigError::invalid(key, raw)),
		})
		.transpose()
}

fn parse_flag(key: &'static str, raw: String) -> Result<bool, ConfigError> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::invalid(key, raw)),
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::ffi::OsString;
	// self
	use super::*;

	fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn defaults_apply_when_unset() {
		let config = GatewayConfig::from_read_env(&env(&[]))
			.expect("An empty environment should yield the defaults.");

		assert_eq!(config, GatewayConfig::default());
		assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
		assert_eq!(config.token_ttl, Duration::seconds(3600));
		assert_eq!(config.rate_policy, WindowPolicy::new(Duration::seconds(60), 10));
		assert_eq!(config.placeholder_key, "BQYHJGJHJ");
	}

	#[test]
	fn overrides_are_parsed() {
		let config = GatewayConfig::from_read_env(&env(&[
			(BIND_ADDR_VAR, "127.0.0.1:9000"),
			(PLACEHOLDER_VAR, "changeme"),
			(TOKEN_TTL_VAR, "120"),
			(RATE_WINDOW_VAR, "30"),
			(RATE_LIMIT_VAR, " 5 "),
			(SWEEP_INTERVAL_VAR, "15"),
			(TRUST_FORWARDED_FOR_VAR, "Yes"),
		]))
		.expect("Valid overrides should parse.");

		assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
		assert_eq!(config.placeholder_key, "changeme");
		assert_eq!(config.token_ttl, Duration::minutes(2));
		assert_eq!(config.rate_policy, WindowPolicy::new(Duration::seconds(30), 5));
		assert_eq!(config.sweep_interval, Duration::seconds(15));
		assert!(config.trust_forwarded_for);
	}

	#[test]
	fn invalid_values_name_the_key() {
		for (key, value) in [
			(RATE_LIMIT_VAR, "0"),
			(RATE_LIMIT_VAR, "ten"),
			(TOKEN_TTL_VAR, "-5"),
			(RATE_WINDOW_VAR, "0"),
			(BIND_ADDR_VAR, "localhost"),
			(TRUST_FORWARDED_FOR_VAR, "maybe"),
		] {
			let err = GatewayConfig::from_read_env(&env(&[(key, value)]))
				.expect_err("Invalid values must be rejected.");

			assert_eq!(err, ConfigError::InvalidValue { key, value: value.into() });
		}
	}

	#[test]
	fn non_unicode_values_are_reported() {
		struct Garbled;
		impl ReadEnv for Garbled {
			fn var(&self, _: &str) -> Result<String, VarError> {
				Err(VarError::NotUnicode(OsString::from("garbled")))
			}
		}

		let err = GatewayConfig::from_read_env(&Garbled)
			.expect_err("Non-unicode values must be rejected.");

		assert!(matches!(err, ConfigError::NotUnicode { .. }));
	}

	#[test]
	fn builders_override_fields() {
		let config = GatewayConfig::default()
			.with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
			.with_placeholder_key("placeholder")
			.with_token_ttl(Duration::seconds(5))
			.with_rate_policy(WindowPolicy::new(Duration::seconds(1), 1))
			.with_sweep_interval(Duration::seconds(2))
			.with_trust_forwarded_for(true);

		assert_eq!(config.bind_addr.port(), 0);
		assert_eq!(config.placeholder_key, "placeholder");
		assert_eq!(config.token_ttl, Duration::seconds(5));
		assert_eq!(config.rate_policy.quota, 1);
		assert_eq!(config.sweep_interval, Duration::seconds(2));
		assert!(config.trust_forwarded_for);
	}
}
