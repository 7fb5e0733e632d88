//! Login verification: check the ID token the broker posted back

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::nonce::NonceRegistry;
use crate::oidc::{self, VerifiedIdentity};
use crate::platform::{Cache, Clock, HttpClient};

/// Handle a returned ID token
///
/// The token must be addressed to this relying party and issued by the
/// configured broker. Failures are logged with their reason code; callers
/// should only show the end user a generic message.
pub async fn handle(
    id_token: &str,
    config: &Config,
    nonces: &NonceRegistry,
    cache: &dyn Cache,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<VerifiedIdentity> {
    let id_token = id_token.trim();
    if id_token.is_empty() {
        return Err(ApiError::invalid_request("id_token is required"));
    }

    let result = oidc::verify_token(
        id_token,
        &config.rp_origin,
        &config.broker_origin,
        nonces,
        cache,
        http,
        clock,
    )
    .await;

    match &result {
        Ok(identity) => tracing::debug!(email = %identity.email, "login verified"),
        Err(e) => tracing::warn!(reason = e.error_key(), error = %e, "login verification failed"),
    }

    result
}
