//! HTTP server exposing the token exchange gateway.

// std
use std::sync::Arc;
// self
use token_exchange::{
	config::GatewayConfig,
	error::Result,
	gateway::{EnvKeySource, ExchangeGateway},
	http, obs,
};

#[tokio::main]
async fn main() -> Result<()> {
	obs::init_subscriber();

	let config = GatewayConfig::from_env()?;
	let gateway = ExchangeGateway::from_config(&config, Arc::new(EnvKeySource::from_process()));

	tracing::info!(
		token_ttl_secs = config.token_ttl.whole_seconds(),
		rate_window_secs = config.rate_policy.window.whole_seconds(),
		rate_quota = config.rate_policy.quota,
		trust_forwarded_for = config.trust_forwarded_for,
		"starting token exchange"
	);

	http::serve(&config, gateway).await
}
