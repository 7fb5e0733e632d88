//! OIDC Discovery document fetching
//!
//! Fetches and parses the broker's OpenID Connect discovery document.

use serde::Deserialize;

use crate::error::{ApiError, Result};
use crate::platform::HttpClient;

/// OIDC Discovery document (partial)
#[derive(Debug, Deserialize)]
pub struct DiscoveryDocument {
    pub jwks_uri: String,
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Fetch OIDC discovery document for a broker origin
pub async fn fetch_discovery(broker: &str, http: &dyn HttpClient) -> Result<DiscoveryDocument> {
    validate_broker_url(broker)?;

    let broker = broker.trim_end_matches('/');
    let discovery_url = format!("{}/.well-known/openid-configuration", broker);
    tracing::debug!(url = %discovery_url, "fetching discovery document");

    let response = http
        .get(
            &discovery_url,
            &[
                ("Accept", "application/json"),
                ("User-Agent", super::USER_AGENT),
            ],
        )
        .await
        .map_err(|e| ApiError::discovery(format!("failed to fetch discovery document: {}", e)))?;

    if response.status != 200 {
        return Err(ApiError::discovery(format!(
            "failed to fetch discovery document: HTTP {}",
            response.status
        )));
    }

    let doc: DiscoveryDocument = response
        .json()
        .map_err(|e| ApiError::discovery(format!("invalid discovery document: {}", e)))?;

    if doc.jwks_uri.trim().is_empty() {
        return Err(ApiError::discovery("discovery document has an empty jwks_uri"));
    }

    if let Some(issuer) = &doc.issuer {
        if issuer.trim_end_matches('/') != broker {
            return Err(ApiError::discovery(format!(
                "issuer mismatch: expected '{}', got '{}'",
                broker, issuer
            )));
        }
    }

    Ok(doc)
}

/// Validate broker URL format per RFC 8414 and OpenID Connect Core 1.0
fn validate_broker_url(broker: &str) -> Result<()> {
    let url = url::Url::parse(broker)
        .map_err(|_| ApiError::discovery("invalid broker URL"))?;

    let is_localhost = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"));
    if url.scheme() != "https" && !is_localhost {
        return Err(ApiError::discovery("broker must use HTTPS"));
    }

    if url.query().is_some() {
        return Err(ApiError::discovery("broker URL must not have query string"));
    }

    if url.fragment().is_some() {
        return Err(ApiError::discovery("broker URL must not have fragment"));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(ApiError::discovery("broker URL must not have userinfo"));
    }

    Ok(())
}
