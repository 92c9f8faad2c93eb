//! Error types for token verification and authorization configuration.

use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

/// Why a request or upgrade could not be authenticated.
///
/// Every variant ends in a 401 (HTTP) or socket termination (WebSocket);
/// none is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("bad token signature")]
    BadSignature,
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
}

impl AuthError {
    /// Short machine-friendly reason used in audit logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
            Self::InvalidClaims(_) => "invalid_claims",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::BadSignature,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims(err.to_string()),
            _ => Self::Malformed,
        }
    }
}

/// Startup configuration problems in the authorization layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid public key: {0}")]
    PublicKey(#[source] jsonwebtoken::errors::Error),
    #[error("invalid role mapping json: {0}")]
    MappingJson(#[from] serde_json::Error),
    #[error("invalid role pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("role pattern `{pattern}` maps to {source}")]
    Role {
        pattern: String,
        #[source]
        source: crate::role::UnknownRole,
    },
}
