//! OIDC (OpenID Connect) module
//!
//! Handles ID token validation including discovery, JWKS fetching, and claim verification.

mod discovery;
pub mod jwks;
mod validate;

pub use jwks::{get_keys, resolve_key, KeySet, SigningKey};
pub use validate::{validate_claims, verify_token, IdTokenClaims, VerifiedIdentity};

pub(crate) const USER_AGENT: &str = "portier-rp-rust";
