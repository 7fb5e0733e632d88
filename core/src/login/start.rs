//! Login start: mint a nonce and redirect to the broker

use url::Url;

use crate::config::{Config, NONCE_TTL_SECS};
use crate::error::{ApiError, Result};
use crate::nonce::NonceRegistry;
use crate::platform::Clock;

/// Handle a login request for `email`, returning the broker URL to redirect to
pub fn handle(
    email: &str,
    config: &Config,
    nonces: &NonceRegistry,
    clock: &dyn Clock,
) -> Result<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::invalid_request("email address is required"));
    }

    let nonce = nonces.mint(NONCE_TTL_SECS, clock);
    build_auth_url(config, email, &nonce)
}

/// Build the broker authorization URL for an implicit-flow ID token request
pub fn build_auth_url(config: &Config, login_hint: &str, nonce: &str) -> Result<String> {
    let mut url = Url::parse(&config.auth_endpoint())
        .map_err(|e| ApiError::internal(format!("invalid broker auth URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("login_hint", login_hint)
        .append_pair("scope", "openid email")
        .append_pair("nonce", nonce)
        .append_pair("response_type", "id_token")
        .append_pair("client_id", &config.rp_origin)
        .append_pair("redirect_uri", &config.redirect_uri());

    Ok(url.to_string())
}
