//! OIDC token validation
//!
//! Validates broker-issued ID tokens by verifying signatures and checking claims.
//! Checks run in a fixed order and the first failure wins. The nonce is only
//! consumed once everything else has passed, so a forged or stale token cannot
//! burn a legitimate login attempt.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use super::jwks::resolve_key;
use crate::config::CLOCK_SKEW_LEEWAY_SECS;
use crate::error::{ApiError, Result};
use crate::nonce::NonceRegistry;
use crate::platform::{Cache, Clock, HttpClient};

/// ID token claims, all optional so that a missing claim is reported by name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub sub: Option<String>,

    /// Audience (can be string or array)
    #[serde(default, deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    #[serde(default)]
    pub exp: Option<u64>,

    #[serde(default)]
    pub iat: Option<u64>,

    #[serde(default)]
    pub nbf: Option<u64>,

    #[serde(default)]
    pub nonce: Option<String>,
}

/// Identity asserted by a fully verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
}

/// Deserialize audience as either string or array
fn deserialize_audience<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct AudienceVisitor;

    impl<'de> Visitor<'de> for AudienceVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("string or array of strings")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Vec<String>, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_string()])
        }

        fn visit_unit<E>(self) -> std::result::Result<Vec<String>, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Vec<String>, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element()? {
                values.push(value);
            }
            Ok(values)
        }
    }

    deserializer.deserialize_any(AudienceVisitor)
}

/// Verify a broker ID token and return the email address it asserts
pub async fn verify_token(
    token: &str,
    expected_audience: &str,
    expected_issuer: &str,
    nonces: &NonceRegistry,
    cache: &dyn Cache,
    http: &dyn HttpClient,
    clock: &dyn Clock,
) -> Result<VerifiedIdentity> {
    // 1. Header, untrusted, only to learn which key to use
    let header = decode_header(token)
        .map_err(|e| ApiError::signature(format!("malformed token header: {}", e)))?;

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| ApiError::unknown_key("(none)"))?;

    // 2. Key lookup
    let key = resolve_key(expected_issuer, kid, cache, http, clock).await?;

    // 3. Signature, RS256 only
    if header.alg != Algorithm::RS256 {
        return Err(ApiError::signature(format!(
            "algorithm {:?} is not allowed",
            header.alg
        )));
    }

    // Time-based and audience checks are done below against the platform clock
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.set_required_spec_claims::<&str>(&[]);

    let token_data = decode::<IdTokenClaims>(token, key.decoding_key(), &validation).map_err(
        |e| match e.kind() {
            ErrorKind::Json(_) => ApiError::claim("payload", format!("malformed claims: {}", e)),
            _ => ApiError::signature(format!("token verification failed: {}", e)),
        },
    )?;
    let claims = token_data.claims;

    // 4-5. Claims
    let email = validate_claims(&claims, expected_audience, expected_issuer, clock.now_secs())?;

    // 6. Nonce, last
    if let Some(nonce) = claims.nonce.as_deref() {
        nonces.consume(nonce, clock)?;
    }

    Ok(VerifiedIdentity { email })
}

/// Check required and optional claims, returning the subject on success
pub fn validate_claims(
    claims: &IdTokenClaims,
    expected_audience: &str,
    expected_issuer: &str,
    now_secs: u64,
) -> Result<String> {
    let leeway = CLOCK_SKEW_LEEWAY_SECS;

    match claims.aud.as_slice() {
        [] => return Err(ApiError::claim("aud", "missing")),
        [aud] if aud == expected_audience => {}
        other => {
            return Err(ApiError::claim(
                "aud",
                format!("expected '{}', got {:?}", expected_audience, other),
            ))
        }
    }

    let iss = claims
        .iss
        .as_deref()
        .ok_or_else(|| ApiError::claim("iss", "missing"))?;
    if iss != expected_issuer {
        return Err(ApiError::claim(
            "iss",
            format!("expected '{}', got '{}'", expected_issuer, iss),
        ));
    }

    let exp = claims.exp.ok_or_else(|| ApiError::claim("exp", "missing"))?;
    if exp.saturating_add(leeway) < now_secs {
        return Err(ApiError::claim("exp", "token has expired"));
    }

    let iat = claims.iat.ok_or_else(|| ApiError::claim("iat", "missing"))?;
    if iat > now_secs.saturating_add(leeway) {
        return Err(ApiError::claim("iat", "token issued in the future"));
    }

    let sub = claims
        .sub
        .as_deref()
        .ok_or_else(|| ApiError::claim("sub", "missing"))?;
    validate_email_subject(sub)?;

    if let Some(nbf) = claims.nbf {
        if nbf > now_secs.saturating_add(leeway) {
            return Err(ApiError::claim("nbf", "token is not yet valid"));
        }
    }

    Ok(sub.to_string())
}

/// The subject must look like an email address: an '@' with something on both sides
fn validate_email_subject(subject: &str) -> Result<()> {
    if subject.chars().any(|c| c.is_control()) {
        return Err(ApiError::claim("sub", "contains control characters"));
    }

    let looks_like_email = subject
        .char_indices()
        .any(|(i, c)| c == '@' && i > 0 && i + 1 < subject.len());
    if !looks_like_email {
        return Err(ApiError::claim("sub", "not an email address"));
    }

    Ok(())
}
