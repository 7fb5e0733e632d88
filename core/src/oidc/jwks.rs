//! JWKS (JSON Web Key Set) handling
//!
//! Discovers the broker's signing keys, keeps the RS256 ones and caches them
//! per broker origin.

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::discovery::fetch_discovery;
use crate::config::KEY_CACHE_TTL_SECS;
use crate::error::{ApiError, Result};
use crate::platform::{cache_get, cache_put, Cache, Clock, HttpClient};

/// The only signing algorithm the broker is trusted with
pub const SUPPORTED_ALG: &str = "RS256";

/// A single JWK as published by the broker
///
/// Everything is optional so that keys of foreign types do not make the whole
/// document unreadable; usable entries are checked in [`KeySet::from_jwks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerJwk {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

impl BrokerJwk {
    fn is_supported(&self) -> bool {
        self.alg.as_deref() == Some(SUPPORTED_ALG)
            && self.kty.as_deref().map_or(true, |kty| kty == "RSA")
            && self.key_use.as_deref().map_or(true, |u| u == "sig")
    }
}

#[derive(Deserialize)]
struct JwkSetDocument {
    keys: Vec<BrokerJwk>,
}

#[derive(Serialize, Deserialize)]
struct CachedKeySet {
    fetched_at: u64,
    keys: Vec<BrokerJwk>,
}

impl CachedKeySet {
    fn is_fresh(&self, now: u64) -> bool {
        now < self.fetched_at.saturating_add(KEY_CACHE_TTL_SECS)
    }
}

/// A broker public key ready for signature verification
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    key: DecodingKey,
}

impl SigningKey {
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

/// Broker signing keys indexed by key ID
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
}

impl KeySet {
    /// Build a key set from already-filtered JWKs
    pub fn from_jwks(jwks: &[BrokerJwk]) -> Result<Self> {
        let mut keys = HashMap::new();

        for jwk in jwks.iter().filter(|jwk| jwk.is_supported()) {
            let Some(kid) = jwk.kid.as_deref() else {
                tracing::debug!("skipping RS256 key without kid");
                continue;
            };

            let (n, e) = match (jwk.n.as_deref(), jwk.e.as_deref()) {
                (Some(n), Some(e)) if !n.is_empty() && !e.is_empty() => (n, e),
                _ => {
                    return Err(ApiError::discovery(format!(
                        "key '{}' is missing its modulus or exponent",
                        kid
                    )))
                }
            };

            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|err| ApiError::discovery(format!("invalid key '{}': {}", kid, err)))?;

            keys.insert(
                kid.to_string(),
                SigningKey {
                    kid: kid.to_string(),
                    key,
                },
            );
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Fetch JWKS from a URI, keeping only RS256 entries
pub async fn fetch_jwks(jwks_uri: &str, http: &dyn HttpClient) -> Result<Vec<BrokerJwk>> {
    let response = http
        .get(
            jwks_uri,
            &[
                ("Accept", "application/json"),
                ("User-Agent", super::USER_AGENT),
            ],
        )
        .await
        .map_err(|e| ApiError::discovery(format!("failed to fetch JWKS: {}", e)))?;

    if response.status != 200 {
        return Err(ApiError::discovery(format!(
            "failed to fetch JWKS: HTTP {}",
            response.status
        )));
    }

    let jwks: JwkSetDocument = response
        .json()
        .map_err(|e| ApiError::discovery(format!("invalid JWKS: {}", e)))?;

    Ok(jwks.keys.into_iter().filter(BrokerJwk::is_supported).collect())
}

/// Run full discovery for a broker and return its usable keys
pub async fn discover_keys(broker: &str, http: &dyn HttpClient) -> Result<Vec<BrokerJwk>> {
    let discovery = fetch_discovery(broker, http).await?;
    fetch_jwks(&discovery.jwks_uri, http).await
}

/// Get the broker's key set, reusing a cached copy while it is fresh
pub async fn get_keys(
    broker: &str,
    cache: &dyn Cache,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<KeySet> {
    Ok(load_keys(broker, cache, http, clock).await?.0)
}

/// Resolve a key ID to a signing key
///
/// A key ID missing from a cached key set counts as a cache miss: the set is
/// fetched again once before giving up.
pub async fn resolve_key(
    broker: &str,
    kid: &str,
    cache: &dyn Cache,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<SigningKey> {
    let (keys, from_cache) = load_keys(broker, cache, http, clock).await?;
    if let Some(key) = keys.get(kid) {
        return Ok(key.clone());
    }

    if from_cache {
        tracing::debug!(kid, "key not in cached key set, refetching");
        let keys = refresh_keys(broker, cache, http, clock).await?;
        if let Some(key) = keys.get(kid) {
            return Ok(key.clone());
        }
    }

    Err(ApiError::unknown_key(kid))
}

async fn load_keys(
    broker: &str,
    cache: &dyn Cache,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<(KeySet, bool)> {
    let cache_key = cache_key(broker);

    match cache_get::<CachedKeySet>(cache, &cache_key).await {
        Ok(Some(cached)) if cached.is_fresh(clock.now_secs()) => {
            tracing::debug!(broker, "using cached key set");
            return Ok((KeySet::from_jwks(&cached.keys)?, true));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(broker, error = %e, "failed to read cached key set"),
    }

    Ok((refresh_keys(broker, cache, http, clock).await?, false))
}

async fn refresh_keys(
    broker: &str,
    cache: &dyn Cache,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<KeySet> {
    let jwks = discover_keys(broker, http).await?;
    let keys = KeySet::from_jwks(&jwks)?;

    let cached = CachedKeySet {
        fetched_at: clock.now_secs(),
        keys: jwks,
    };
    if let Err(e) = cache_put(cache, &cache_key(broker), &cached, KEY_CACHE_TTL_SECS).await {
        tracing::warn!(broker, error = %e, "failed to cache key set");
    }

    tracing::debug!(broker, keys = keys.len(), "fetched broker key set");
    Ok(keys)
}

fn cache_key(broker: &str) -> String {
    format!("jwks:{}", broker.trim_end_matches('/'))
}
