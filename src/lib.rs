//! Short-lived session tokens that can be redeemed for a protected API key, guarded by a
//! per-client fixed-window rate limiter.
//!
//! The crate is split into two in-process components sharing injectable in-memory state:
//!
//! - [`vault::TokenVault`] mints opaque tokens bound to the API key and resolves them while they
//!   are valid.
//! - [`limiter::RateLimiter`] admits or rejects redemption attempts per client identity.
//!
//! [`gateway::ExchangeGateway`] wires both to a [`gateway::KeySource`], and the `server` feature
//! exposes the pair over HTTP via [`http::router`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
#[cfg(feature = "server")] pub mod http;
pub mod limiter;
pub mod obs;
pub mod store;
pub mod vault;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ApiKey,
		clock::{Clock, ManualClock},
		gateway::{ExchangeGateway, StaticKeySource},
		limiter::{RateLimiter, WindowPolicy},
		store::{MemoryCounterStore, MemoryTokenStore},
		vault::TokenVault,
	};

	/// API key used by test fixtures.
	pub const TEST_API_KEY: &str = "test-api-key-0123456789";

	/// Fixed instant the manual clock starts from in tests.
	pub fn test_epoch() -> OffsetDateTime {
		time::macros::datetime!(2025-11-10 12:00 UTC)
	}

	/// Builds a manual clock pinned to [`test_epoch`].
	pub fn test_clock() -> ManualClock {
		ManualClock::new(test_epoch())
	}

	/// Builds a vault with a one-hour TTL backed by a fresh in-memory store.
	pub fn build_test_vault(clock: &ManualClock) -> TokenVault {
		let clock: Arc<dyn Clock> = Arc::new(clock.clone());

		TokenVault::new(Arc::new(MemoryTokenStore::default()), clock, Duration::hours(1))
	}

	/// Builds a limiter allowing 10 requests per 60 second window.
	pub fn build_test_limiter(clock: &ManualClock) -> RateLimiter {
		let clock: Arc<dyn Clock> = Arc::new(clock.clone());

		RateLimiter::new(Arc::new(MemoryCounterStore::default()), clock, WindowPolicy::default())
	}

	/// Constructs a gateway with the default policy and [`TEST_API_KEY`] configured.
	pub fn build_test_gateway(clock: &ManualClock) -> ExchangeGateway {
		build_test_gateway_with_key(clock, Some(TEST_API_KEY))
	}

	/// Constructs a gateway with the default policy and the provided key (if any).
	pub fn build_test_gateway_with_key(clock: &ManualClock, key: Option<&str>) -> ExchangeGateway {
		let source = Arc::new(StaticKeySource::new(key.map(ApiKey::new)));

		ExchangeGateway::new(source, build_test_vault(clock), build_test_limiter(clock))
	}
}

mod _prelude {
	pub use std::{
		borrow::Borrow,
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		hash::Hash,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(test)] use {color_eyre as _, http_body_util as _, tower as _};
#[cfg(all(test, not(feature = "server")))] use tokio as _;
