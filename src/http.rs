//! Axum front end exposing `GET /api-key` and `POST /exchange-token`.
//!
//! Response shapes:
//!
//! | Route | Case | Status | Body |
//! |---|---|---|---|
//! | `/api-key` | ok | 200 | `{ configured, sessionToken, expiresIn }` |
//! | `/api-key` | fault | 500 | `{ configured: false, error }` |
//! | `/exchange-token` | ok | 200 | `{ apiKey }` |
//! | `/exchange-token` | no token | 400 | `{ error }` |
//! | `/exchange-token` | unknown or expired token | 401 | `{ error }` |
//! | `/exchange-token` | throttled | 429 | `{ error, message, retryAfter }` + `Retry-After` |

// std
use std::{convert::Infallible, net::SocketAddr};
// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::{ConnectInfo, FromRequestParts, State},
	http::{HeaderValue, StatusCode, header, request::Parts},
	response::{IntoResponse, Response},
	routing::{get, post},
};
// self
use crate::{
	_prelude::*,
	auth::{ApiKey, ClientId},
	config::GatewayConfig,
	gateway::{ExchangeError, ExchangeGateway},
};

/// Header consulted for the client address when forwarding is trusted.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

const INTERNAL_ERROR: &str = "Internal server error";
const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Try again later.";

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
	/// Gateway serving both routes.
	pub gateway: ExchangeGateway,
	/// Whether the first `X-Forwarded-For` entry identifies the client.
	pub trust_forwarded_for: bool,
}
impl AppState {
	/// Creates handler state that keys clients by peer address.
	pub fn new(gateway: ExchangeGateway) -> Self {
		Self { gateway, trust_forwarded_for: false }
	}

	/// Enables or disables `X-Forwarded-For` client identification.
	pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
		self.trust_forwarded_for = trust;

		self
	}
}

/// Builds the router for both gateway endpoints.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/api-key", get(api_key))
		.route("/exchange-token", post(exchange_token))
		.with_state(state)
}

/// Binds `config.bind_addr`, starts the sweep janitor, and serves until Ctrl-C.
pub async fn serve(config: &GatewayConfig, gateway: ExchangeGateway) -> Result<()> {
	let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
	let _janitor = gateway.spawn_janitor(config.sweep_interval);
	let app = router(AppState::new(gateway).with_trust_forwarded_for(config.trust_forwarded_for));

	tracing::info!(addr = %listener.local_addr()?, "token exchange listening");

	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	tracing::info!("token exchange stopped");

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "failed to listen for ctrl-c; shutting down");
	}
}

/// Client identity derived from the connection (or `X-Forwarded-For` when trusted).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAddr(pub ClientId);
impl FromRequestParts<AppState> for ClientAddr {
	type Rejection = Infallible;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		Ok(Self(client_id(parts, state.trust_forwarded_for)))
	}
}

fn client_id(parts: &Parts, trust_forwarded_for: bool) -> ClientId {
	let forwarded = trust_forwarded_for
		.then(|| parts.headers.get(FORWARDED_FOR))
		.flatten()
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(',').next())
		.and_then(|first| ClientId::new(first.trim()).ok());

	forwarded
		.or_else(|| {
			parts
				.extensions
				.get::<ConnectInfo<SocketAddr>>()
				.map(|ConnectInfo(addr)| ClientId::from(addr.ip()))
		})
		.unwrap_or_else(ClientId::unknown)
}

#[derive(Debug, Serialize)]
struct ApiKeyFailure {
	configured: bool,
	error: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest {
	#[serde(default)]
	session_token: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeResponse {
	api_key: ApiKey,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitBody {
	error: String,
	message: &'static str,
	retry_after: u64,
}

async fn api_key(State(state): State<AppState>) -> Response {
	match state.gateway.check_api_key() {
		Ok(status) => Json(status).into_response(),
		// The gateway already logged the fault.
		Err(_) => (
			StatusCode::INTERNAL_SERVER_ERROR,
			Json(ApiKeyFailure { configured: false, error: INTERNAL_ERROR }),
		)
			.into_response(),
	}
}

async fn exchange_token(
	State(state): State<AppState>,
	ClientAddr(client): ClientAddr,
	body: Bytes,
) -> Result<Json<ExchangeResponse>, ExchangeError> {
	let token = session_token(&body);
	let api_key = state.gateway.exchange(&client, token.as_deref())?;

	Ok(Json(ExchangeResponse { api_key }))
}

/// Extracts `sessionToken` from a JSON body.
///
/// Falsy values (absent, `null`, `false`, `0`, `""`) and unreadable bodies count as missing.
/// Any other non-string value is passed on in its JSON form, so it fails lookup like an unknown
/// token rather than being reported as missing.
fn session_token(body: &[u8]) -> Option<String> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	match serde_path_to_error::deserialize::<_, ExchangeRequest>(&mut deserializer) {
		Ok(request) => request.session_token.and_then(presented_token),
		Err(e) => {
			tracing::debug!(path = %e.path(), error = %e.inner(), "malformed exchange request body");

			None
		},
	}
}

fn presented_token(value: serde_json::Value) -> Option<String> {
	use serde_json::Value;

	match value {
		Value::Null | Value::Bool(false) => None,
		Value::Number(ref number) if number.as_f64() == Some(0.0) => None,
		Value::String(token) => (!token.is_empty()).then_some(token),
		other => Some(other.to_string()),
	}
}

impl IntoResponse for ExchangeError {
	fn into_response(self) -> Response {
		match self {
			Self::MissingToken =>
				(StatusCode::BAD_REQUEST, Json(ErrorBody { error: self.to_string() })).into_response(),
			Self::InvalidToken =>
				(StatusCode::UNAUTHORIZED, Json(ErrorBody { error: self.to_string() })).into_response(),
			Self::RateLimited(ref directive) => {
				let retry_after = directive.retry_after_secs();
				let body = RateLimitBody {
					error: self.to_string(),
					message: RATE_LIMIT_MESSAGE,
					retry_after,
				};

				(
					StatusCode::TOO_MANY_REQUESTS,
					[(header::RETRY_AFTER, HeaderValue::from(retry_after))],
					Json(body),
				)
					.into_response()
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::http::Request;
	use time::macros;
	// self
	use super::*;
	use crate::{_preludet::*, error::ConfigError, gateway::KeySource, limiter::RetryDirective};

	fn parts(forwarded: Option<&str>, peer: Option<SocketAddr>) -> Parts {
		let mut builder = Request::builder().uri("/exchange-token");

		if let Some(value) = forwarded {
			builder = builder.header(FORWARDED_FOR, value);
		}

		let (mut parts, ()) =
			builder.body(()).expect("Request fixture should build successfully.").into_parts();

		if let Some(addr) = peer {
			parts.extensions.insert(ConnectInfo(addr));
		}

		parts
	}

	#[test]
	fn client_id_prefers_peer_address_by_default() {
		let peer = SocketAddr::from(([10, 1, 2, 3], 5555));
		let parts = parts(Some("203.0.113.9"), Some(peer));

		assert_eq!(client_id(&parts, false).as_ref(), "10.1.2.3");
		assert_eq!(client_id(&parts, true).as_ref(), "203.0.113.9");
	}

	#[test]
	fn client_id_takes_first_forwarded_entry_and_falls_back() {
		let peer = SocketAddr::from(([10, 1, 2, 3], 5555));

		assert_eq!(
			client_id(&parts(Some(" 198.51.100.7 , 10.0.0.1"), Some(peer)), true).as_ref(),
			"198.51.100.7"
		);
		assert_eq!(client_id(&parts(Some(""), Some(peer)), true).as_ref(), "10.1.2.3");
		assert_eq!(client_id(&parts(None, None), true), ClientId::unknown());
	}

	#[test]
	fn session_token_treats_falsy_values_as_missing() {
		assert_eq!(session_token(br#"{"sessionToken":"abc"}"#), Some("abc".into()));

		let bodies: [&[u8]; 7] = [
			br#"{"sessionToken":""}"#,
			br#"{"sessionToken":null}"#,
			br#"{"sessionToken":false}"#,
			br#"{"sessionToken":0}"#,
			br#"{"other":"abc"}"#,
			b"not json",
			b"",
		];

		for body in bodies {
			assert_eq!(session_token(body), None, "Body {body:?} should count as missing.");
		}
	}

	#[test]
	fn session_token_passes_truthy_non_strings_to_lookup() {
		assert_eq!(session_token(br#"{"sessionToken":7}"#), Some("7".into()));
		assert_eq!(session_token(br#"{"sessionToken":["x"]}"#), Some(r#"["x"]"#.into()));
		assert_eq!(session_token(br#"{"sessionToken":true}"#), Some("true".into()));
	}

	#[test]
	fn key_source_failure_is_logged_once() {
		#[derive(Debug)]
		struct Unreadable;
		impl KeySource for Unreadable {
			fn current(&self) -> Result<Option<ApiKey>, ConfigError> {
				Err(ConfigError::NotUnicode { key: "AUTHENTICATION_API_KEY".into() })
			}
		}

		#[derive(Clone, Default)]
		struct Capture(Arc<Mutex<Vec<u8>>>);
		impl std::io::Write for Capture {
			fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
				self.0.lock().extend_from_slice(buf);

				Ok(buf.len())
			}

			fn flush(&mut self) -> std::io::Result<()> {
				Ok(())
			}
		}

		let clock = test_clock();
		let gateway = ExchangeGateway::new(
			Arc::new(Unreadable),
			build_test_vault(&clock),
			build_test_limiter(&clock),
		);
		let capture = Capture::default();
		let writer = capture.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_ansi(false)
			.with_writer(move || writer.clone())
			.finish();
		let runtime = tokio::runtime::Builder::new_current_thread()
			.build()
			.expect("Runtime should build successfully.");
		let response = tracing::subscriber::with_default(subscriber, || {
			runtime.block_on(api_key(State(AppState::new(gateway))))
		});
		let output = String::from_utf8(capture.0.lock().clone())
			.expect("Captured log output should be UTF-8.");

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(output.lines().filter(|line| line.contains("ERROR")).count(), 1, "{output}");
	}

	#[test]
	fn exchange_errors_map_to_statuses() {
		assert_eq!(ExchangeError::MissingToken.into_response().status(), StatusCode::BAD_REQUEST);
		assert_eq!(ExchangeError::InvalidToken.into_response().status(), StatusCode::UNAUTHORIZED);

		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let response = ExchangeError::RateLimited(RetryDirective::until(
			now + Duration::milliseconds(29_500),
			now,
		))
		.into_response();

		assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
		assert_eq!(
			response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
			Some("30")
		);
	}
}
