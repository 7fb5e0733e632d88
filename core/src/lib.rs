//! portier-rp-core: Platform-agnostic relying-party logic for broker-issued ID tokens
//!
//! This crate discovers and caches the broker's signing keys, verifies the ID
//! tokens it issues, and enforces single use of per-login nonces. It depends
//! only on abstract platform traits (Cache, HttpClient, Clock, Environment) and
//! never performs I/O itself.

pub mod config;
pub mod error;
pub mod login;
pub mod nonce;
pub mod oidc;
pub mod platform;

#[cfg(test)]
pub mod test_support;
