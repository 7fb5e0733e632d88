//! Configuration loading

use crate::error::{ApiError, Result};
use crate::platform::Environment;

/// Relying-party configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the identity broker, e.g. "https://broker.portier.io"
    pub broker_origin: String,
    /// Origin of this relying party; doubles as the OIDC client_id and token audience
    pub rp_origin: String,
}

impl Config {
    /// Load configuration from platform environment
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let broker_origin = env
            .get_var("BROKER_ORIGIN")
            .map_err(|_| ApiError::internal("BROKER_ORIGIN not configured"))?;
        let rp_origin = env
            .get_var("RP_ORIGIN")
            .map_err(|_| ApiError::internal("RP_ORIGIN not configured"))?;

        Self::new(&broker_origin, &rp_origin)
    }

    /// Build a configuration from explicit origins
    pub fn new(broker_origin: &str, rp_origin: &str) -> Result<Self> {
        Ok(Self {
            broker_origin: normalize_origin("BROKER_ORIGIN", broker_origin)?,
            rp_origin: normalize_origin("RP_ORIGIN", rp_origin)?,
        })
    }

    /// Broker authorization endpoint the user is redirected to
    pub fn auth_endpoint(&self) -> String {
        format!("{}/auth", self.broker_origin)
    }

    /// Callback the broker posts the ID token back to
    pub fn redirect_uri(&self) -> String {
        format!("{}/verify", self.rp_origin)
    }
}

fn normalize_origin(name: &str, value: &str) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::internal(format!("{} is empty", name)));
    }

    let url = url::Url::parse(trimmed)
        .map_err(|e| ApiError::internal(format!("{} is not a valid URL: {}", name, e)))?;
    if url.host_str().is_none() {
        return Err(ApiError::internal(format!("{} has no host", name)));
    }

    Ok(trimmed.to_string())
}

/// Lifetime of a login nonce (30 minutes)
pub const NONCE_TTL_SECS: u64 = 1800;

/// How long a fetched broker key set is reused (5 minutes)
pub const KEY_CACHE_TTL_SECS: u64 = 300;

/// Clock skew tolerated on exp, iat and nbf (3 minutes)
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 180;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockEnv;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> MockEnv {
        MockEnv::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn test_from_env_trims_trailing_slash() {
        let config = Config::from_env(&env(&[
            ("BROKER_ORIGIN", "https://broker.example/"),
            ("RP_ORIGIN", "http://localhost:8000"),
        ]))
        .unwrap();

        assert_eq!(config.broker_origin, "https://broker.example");
        assert_eq!(config.rp_origin, "http://localhost:8000");
        assert_eq!(config.auth_endpoint(), "https://broker.example/auth");
        assert_eq!(config.redirect_uri(), "http://localhost:8000/verify");
    }

    #[test]
    fn test_from_env_missing_broker_origin() {
        let err = Config::from_env(&env(&[("RP_ORIGIN", "http://localhost:8000")])).unwrap_err();
        assert_eq!(err.error_key(), "internal_error");
        assert!(err.to_string().contains("BROKER_ORIGIN"));
    }

    #[test]
    fn test_from_env_missing_rp_origin() {
        let err =
            Config::from_env(&env(&[("BROKER_ORIGIN", "https://broker.example")])).unwrap_err();
        assert!(err.to_string().contains("RP_ORIGIN"));
    }

    #[test]
    fn test_invalid_origin_rejected() {
        assert!(Config::new("not a url", "http://localhost:8000").is_err());
        assert!(Config::new("https://broker.example", "").is_err());
    }
}
