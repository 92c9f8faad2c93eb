//! Authentication interface for the gateway.
//!
//! Defines the `Authenticator` trait, the JWT-backed implementation and the
//! helpers that pull credentials out of HTTP and WebSocket upgrade requests.

use authz::{AuthError, Identity, RoleMapper, TokenVerifier};
use axum::http::{HeaderMap, header};
use protocol::BEARER_SUBPROTOCOL;
use std::{future::Future, sync::Arc};

/// Header carrying the per-request audit correlation id.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Trait for authenticating callers.
///
/// Uses RPITIT (no dyn dispatch).
pub trait Authenticator: Send + Sync + 'static {
    /// Verify a bearer token and return the caller's identity.
    fn authenticate(&self, token: &str) -> impl Future<Output = Result<Identity, AuthError>> + Send;
}

/// Authenticates access tokens with a [`TokenVerifier`] and resolves roles
/// with the shared [`RoleMapper`].
pub struct JwtAuthenticator {
    verifier: TokenVerifier,
    mapper: Arc<RoleMapper>,
}

impl JwtAuthenticator {
    pub fn new(verifier: TokenVerifier, mapper: Arc<RoleMapper>) -> Self {
        Self { verifier, mapper }
    }

    pub fn mapper(&self) -> &RoleMapper {
        &self.mapper
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> impl Future<Output = Result<Identity, AuthError>> + Send {
        let result = self
            .verifier
            .verify(token)
            .map(|claims| Identity::resolve(claims, &self.mapper));
        std::future::ready(result)
    }
}

/// Token from `Authorization: Bearer <token>`.
///
/// A missing header is [`AuthError::Missing`]; any other scheme or an empty
/// token is [`AuthError::Malformed`].
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::Missing)?
        .to_str()
        .map_err(|_| AuthError::Malformed)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::Malformed)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

/// Token offered on a WebSocket upgrade: `Sec-WebSocket-Protocol:
/// bearer,<token>` first, then the `token` query parameter.
pub fn ws_token<'a>(headers: &'a HeaderMap, query_token: Option<&'a str>) -> Option<&'a str> {
    let from_protocol = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let mut parts = v.split(',').map(str::trim);
            match (parts.next(), parts.next()) {
                (Some(scheme), Some(token))
                    if scheme.eq_ignore_ascii_case(BEARER_SUBPROTOCOL) && !token.is_empty() =>
                {
                    Some(token)
                }
                _ => None,
            }
        });
    from_protocol.or_else(|| query_token.map(str::trim).filter(|t| !t.is_empty()))
}

/// Correlation id supplied by the caller, or a fresh one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(X_CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
