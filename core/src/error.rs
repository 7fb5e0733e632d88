//! Error types and HTTP status mapping

use serde::Serialize;
use thiserror::Error;

/// Result type alias for relying-party operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Relying-party error with HTTP status code mapping
///
/// `Discovery` through `Nonce` are verification failures. They all surface to
/// the end user as the same generic message; the variant only feeds logs.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("key discovery failed: {message}")]
    Discovery { message: String },

    #[error("unknown signing key: {kid}")]
    UnknownKey { kid: String },

    #[error("invalid signature: {message}")]
    Signature { message: String },

    #[error("invalid claim '{claim}': {message}")]
    Claim { claim: &'static str, message: String },

    #[error("invalid or expired nonce")]
    Nonce,

    #[error("upstream error: {message}")]
    Upstream { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    pub fn unknown_key(kid: impl Into<String>) -> Self {
        Self::UnknownKey { kid: kid.into() }
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    pub fn claim(claim: &'static str, message: impl Into<String>) -> Self {
        Self::Claim {
            claim,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error means "the presented token was not accepted"
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. }
                | Self::UnknownKey { .. }
                | Self::Signature { .. }
                | Self::Claim { .. }
                | Self::Nonce
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::Discovery { .. } => 400,
            Self::UnknownKey { .. } => 400,
            Self::Signature { .. } => 400,
            Self::Claim { .. } => 400,
            Self::Nonce => 400,
            Self::Upstream { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    /// Internal reason code, for logs only
    pub fn error_key(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Discovery { .. } => "discovery_failed",
            Self::UnknownKey { .. } => "unknown_key",
            Self::Signature { .. } => "invalid_signature",
            Self::Claim { .. } => "invalid_claim",
            Self::Nonce => "invalid_nonce",
            Self::Upstream { .. } => "upstream_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// Error response body shown to the end user
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        if err.is_verification_failure() {
            return Self {
                error: "verification_failed".to_string(),
                message: "We could not verify your email address. Please try logging in again."
                    .to_string(),
            };
        }

        match err {
            ApiError::InvalidRequest { .. } => Self {
                error: err.error_key().to_string(),
                message: err.to_string(),
            },
            _ => Self {
                error: "internal_error".to_string(),
                message: "Something went wrong on our side.".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failures_map_to_400() {
        let errors = [
            ApiError::discovery("no jwks_uri"),
            ApiError::unknown_key("k1"),
            ApiError::signature("bad"),
            ApiError::claim("aud", "mismatch"),
            ApiError::Nonce,
        ];

        for err in &errors {
            assert!(err.is_verification_failure(), "{} should be a verification failure", err);
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn test_non_verification_errors() {
        assert!(!ApiError::invalid_request("x").is_verification_failure());
        assert!(!ApiError::upstream("x").is_verification_failure());
        assert!(!ApiError::internal("x").is_verification_failure());
        assert_eq!(ApiError::upstream("x").status_code(), 502);
        assert_eq!(ApiError::internal("x").status_code(), 500);
    }

    #[test]
    fn test_error_response_hides_reason_code() {
        let err = ApiError::unknown_key("secret-kid");
        let body = ErrorResponse::from(&err);

        assert_eq!(body.error, "verification_failed");
        assert!(!body.message.contains("secret-kid"));
        assert!(!body.message.contains("unknown_key"));
    }

    #[test]
    fn test_error_response_for_invalid_request_keeps_message() {
        let err = ApiError::invalid_request("missing form field: email");
        let body = ErrorResponse::from(&err);

        assert_eq!(body.error, "invalid_request");
        assert!(body.message.contains("missing form field: email"));
    }

    #[test]
    fn test_claim_error_names_claim() {
        let err = ApiError::claim("sub", "not an email address");
        assert_eq!(err.to_string(), "invalid claim 'sub': not an email address");
        assert_eq!(err.error_key(), "invalid_claim");
    }

    #[test]
    fn test_internal_error_response_is_generic() {
        let err = ApiError::internal("BROKER_ORIGIN not configured");
        let body = ErrorResponse::from(&err);

        assert_eq!(body.error, "internal_error");
        assert!(!body.message.contains("BROKER_ORIGIN"));
    }
}
