//! Exchange gateway: the `/api-key` and `/exchange-token` operations over a vault and limiter.
//!
//! [`ExchangeGateway::check_api_key`] mints a session token whenever a real API key is
//! configured. [`ExchangeGateway::exchange`] runs every redemption through the rate limiter
//! first, then validates the presented token, then asks the vault for the key. Expected
//! refusals come back as [`ExchangeError`]; only faults (key source, entropy) are [`Error`]s.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{ApiKey, ClientId},
	clock::{Clock, SystemClock},
	config::{self, DEFAULT_PLACEHOLDER_KEY, GatewayConfig, ReadEnv, SystemEnv},
	error::ConfigError,
	limiter::{Admission, RateLimiter, RetryDirective},
	obs::{self, Operation, OperationSpan, Outcome},
	store::{MemoryCounterStore, MemoryTokenStore},
	vault::TokenVault,
};

/// Where the gateway reads the protected API key from.
pub trait KeySource
where
	Self: Debug + Send + Sync,
{
	/// Returns the currently configured key, if any.
	fn current(&self) -> Result<Option<ApiKey>, ConfigError>;
}

/// Fixed key supplied at construction.
#[derive(Clone, Debug, Default)]
pub struct StaticKeySource(Option<ApiKey>);
impl StaticKeySource {
	/// Wraps the provided key (or its absence).
	pub fn new(key: Option<ApiKey>) -> Self {
		Self(key)
	}
}
impl KeySource for StaticKeySource {
	fn current(&self) -> Result<Option<ApiKey>, ConfigError> {
		Ok(self.0.clone())
	}
}

/// Key read from an environment variable on every check, so rotations apply without restart.
#[derive(Clone, Debug)]
pub struct EnvKeySource<E = SystemEnv> {
	env: E,
	var: String,
}
impl EnvKeySource {
	/// Reads [`config::API_KEY_VAR`] from the process environment.
	pub fn from_process() -> Self {
		Self::new(SystemEnv, config::API_KEY_VAR)
	}
}
impl<E> EnvKeySource<E>
where
	E: ReadEnv,
{
	/// Reads `var` from the provided environment.
	pub fn new(env: E, var: impl Into<String>) -> Self {
		Self { env, var: var.into() }
	}
}
impl<E> KeySource for EnvKeySource<E>
where
	E: Debug + ReadEnv + Send + Sync,
{
	fn current(&self) -> Result<Option<ApiKey>, ConfigError> {
		Ok(config::read(&self.env, &self.var)?.map(ApiKey::new))
	}
}

/// Payload of the `/api-key` endpoint.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStatus {
	/// Whether a real (non-placeholder) key is configured.
	pub configured: bool,
	/// Freshly minted session token, or empty when not configured.
	pub session_token: String,
	/// Token lifetime in seconds.
	pub expires_in: i64,
}
impl Debug for ApiKeyStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiKeyStatus")
			.field("configured", &self.configured)
			.field("session_token", &if self.session_token.is_empty() { "" } else { "<redacted>" })
			.field("expires_in", &self.expires_in)
			.finish()
	}
}

/// Expected refusals from [`ExchangeGateway::exchange`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExchangeError {
	/// No (or an empty) session token was presented.
	#[error("Session token required")]
	MissingToken,
	/// The token is unknown or expired; the two are deliberately indistinguishable.
	#[error("Invalid or expired session token")]
	InvalidToken,
	/// The client exhausted its redemption quota.
	#[error("Too many requests")]
	RateLimited(RetryDirective),
}

/// Evictions performed by one [`ExchangeGateway::sweep`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Expired session tokens removed.
	pub tokens_evicted: usize,
	/// Elapsed rate-limit windows removed.
	pub windows_evicted: usize,
}

/// Thread-safe counters for gateway outcomes.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
	tokens_minted: AtomicU64,
	exchanges_granted: AtomicU64,
	invalid_tokens: AtomicU64,
	missing_tokens: AtomicU64,
	rate_limited: AtomicU64,
	key_source_failures: AtomicU64,
}
impl ExchangeMetrics {
	/// Session tokens handed out by `/api-key`.
	pub fn tokens_minted(&self) -> u64 {
		self.tokens_minted.load(Ordering::Relaxed)
	}

	/// Redemptions that released the key.
	pub fn exchanges_granted(&self) -> u64 {
		self.exchanges_granted.load(Ordering::Relaxed)
	}

	/// Redemptions refused for an unknown or expired token.
	pub fn invalid_tokens(&self) -> u64 {
		self.invalid_tokens.load(Ordering::Relaxed)
	}

	/// Redemptions refused for a missing token.
	pub fn missing_tokens(&self) -> u64 {
		self.missing_tokens.load(Ordering::Relaxed)
	}

	/// Redemptions refused by the rate limiter.
	pub fn rate_limited(&self) -> u64 {
		self.rate_limited.load(Ordering::Relaxed)
	}

	/// Configuration checks that failed to read the key source.
	pub fn key_source_failures(&self) -> u64 {
		self.key_source_failures.load(Ordering::Relaxed)
	}

	fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}
}

/// Coordinates the key source, token vault, and rate limiter.
#[derive(Clone, Debug)]
pub struct ExchangeGateway {
	source: Arc<dyn KeySource>,
	vault: TokenVault,
	limiter: RateLimiter,
	placeholder_key: String,
	metrics: Arc<ExchangeMetrics>,
}
impl ExchangeGateway {
	/// Creates a gateway from explicitly constructed components.
	pub fn new(source: Arc<dyn KeySource>, vault: TokenVault, limiter: RateLimiter) -> Self {
		Self {
			source,
			vault,
			limiter,
			placeholder_key: DEFAULT_PLACEHOLDER_KEY.into(),
			metrics: Default::default(),
		}
	}

	/// Builds a gateway with fresh in-memory stores and the system clock.
	pub fn from_config(config: &GatewayConfig, source: Arc<dyn KeySource>) -> Self {
		let clock: Arc<dyn Clock> = Arc::new(SystemClock);
		let vault =
			TokenVault::new(Arc::new(MemoryTokenStore::default()), clock.clone(), config.token_ttl);
		let limiter =
			RateLimiter::new(Arc::new(MemoryCounterStore::default()), clock, config.rate_policy);

		Self::new(source, vault, limiter).with_placeholder_key(config.placeholder_key.clone())
	}

	/// Overrides the key value treated as "not configured".
	pub fn with_placeholder_key(mut self, key: impl Into<String>) -> Self {
		self.placeholder_key = key.into();

		self
	}

	/// Reports whether a real key is configured and, if so, mints a session token for it.
	pub fn check_api_key(&self) -> Result<ApiKeyStatus> {
		const OP: Operation = Operation::CheckApiKey;

		let _span = OperationSpan::new(OP, "check_api_key").entered();
		let expires_in = self.vault.ttl().whole_seconds();
		let key = match self.source.current() {
			Ok(key) => key,
			Err(e) => {
				ExchangeMetrics::bump(&self.metrics.key_source_failures);
				obs::record_outcome(OP, Outcome::Failure);
				#[cfg(feature = "tracing")]
				tracing::error!(error = %e, "failed to read the configured API key");

				return Err(e.into());
			},
		};
		let Some(key) = key.filter(|key| self.is_real_key(key)) else {
			obs::record_outcome(OP, Outcome::Miss);

			return Ok(ApiKeyStatus {
				configured: false,
				session_token: String::new(),
				expires_in,
			});
		};
		let token = self.vault.mint(&key).inspect_err(|_e| {
			obs::record_outcome(OP, Outcome::Failure);
			#[cfg(feature = "tracing")]
			tracing::error!(error = %_e, "failed to mint a session token");
		})?;

		ExchangeMetrics::bump(&self.metrics.tokens_minted);
		obs::record_outcome(OP, Outcome::Success);

		Ok(ApiKeyStatus { configured: true, session_token: token.into_inner(), expires_in })
	}

	/// Redeems `token` for the API key on behalf of `client`.
	///
	/// Every call counts against the client's quota, including calls without a token.
	pub fn exchange(
		&self,
		client: &ClientId,
		token: Option<&str>,
	) -> Result<ApiKey, ExchangeError> {
		const OP: Operation = Operation::Exchange;

		let _span = OperationSpan::new(OP, "exchange").entered();
		let result = self.exchange_inner(client, token);
		let (counter, outcome) = match &result {
			Ok(_) => (&self.metrics.exchanges_granted, Outcome::Success),
			Err(ExchangeError::InvalidToken) => (&self.metrics.invalid_tokens, Outcome::Miss),
			Err(ExchangeError::MissingToken) => (&self.metrics.missing_tokens, Outcome::Rejected),
			Err(ExchangeError::RateLimited(_)) => (&self.metrics.rate_limited, Outcome::Rejected),
		};

		ExchangeMetrics::bump(counter);
		obs::record_outcome(OP, outcome);

		result
	}

	fn exchange_inner(
		&self,
		client: &ClientId,
		token: Option<&str>,
	) -> Result<ApiKey, ExchangeError> {
		if let Admission::Rejected(directive) = self.limiter.admit(client) {
			return Err(ExchangeError::RateLimited(directive));
		}

		let token = token.filter(|token| !token.is_empty()).ok_or(ExchangeError::MissingToken)?;

		self.vault.resolve(token).ok_or(ExchangeError::InvalidToken)
	}

	/// Evicts expired tokens and elapsed rate-limit windows.
	pub fn sweep(&self) -> SweepReport {
		let _span = OperationSpan::new(Operation::Sweep, "gateway").entered();
		let report =
			SweepReport { tokens_evicted: self.vault.sweep(), windows_evicted: self.limiter.sweep() };

		obs::record_outcome(Operation::Sweep, Outcome::Success);
		#[cfg(feature = "tracing")]
		tracing::debug!(
			tokens_evicted = report.tokens_evicted,
			windows_evicted = report.windows_evicted,
			tokens_remaining = self.vault.len(),
			windows_remaining = self.limiter.len(),
			"sweep finished"
		);

		report
	}

	/// Runs [`ExchangeGateway::sweep`] every `interval` on the current Tokio runtime until the
	/// returned handle is dropped.
	///
	/// Must be called from within a Tokio runtime.
	#[cfg(feature = "server")]
	pub fn spawn_janitor(&self, interval: Duration) -> JanitorHandle {
		let gateway = self.clone();
		let period = interval.unsigned_abs().max(std::time::Duration::from_secs(1));
		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);

			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;
				gateway.sweep();
			}
		});

		JanitorHandle(task)
	}

	/// Token vault used by this gateway.
	pub fn vault(&self) -> &TokenVault {
		&self.vault
	}

	/// Rate limiter used by this gateway.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// Outcome counters.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.metrics
	}

	fn is_real_key(&self, key: &ApiKey) -> bool {
		!key.is_empty() && key.expose() != self.placeholder_key
	}
}

/// Background sweep task; aborted when dropped.
#[cfg(feature = "server")]
#[derive(Debug)]
pub struct JanitorHandle(tokio::task::JoinHandle<()>);
#[cfg(feature = "server")]
impl JanitorHandle {
	/// Returns `true` once the task has stopped.
	pub fn is_finished(&self) -> bool {
		self.0.is_finished()
	}
}
#[cfg(feature = "server")]
impl Drop for JanitorHandle {
	fn drop(&mut self) {
		self.0.abort();
	}
}
