//! RS256 access-token verification.
//!
//! Verification is pure and synchronous: the public key is supplied once at
//! construction and no network calls are made afterwards.

use crate::{AuthError, Claims, ConfigError, RawClaims};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

/// Default clock skew tolerance, seconds.
pub const DEFAULT_LEEWAY: u64 = 30;

/// Audience of refresh tokens minted with the same key. Never accepted as an
/// access token.
pub const REFRESH_AUDIENCE: &str = "refresh";

/// Optional claim checks applied on top of signature and expiry.
#[derive(Debug, Clone)]
pub struct VerifierOptions {
    /// Required `iss`, if any.
    pub issuer: Option<String>,
    /// Required `aud`, if any. When unset, any `aud` except
    /// [`REFRESH_AUDIENCE`] is accepted.
    pub audience: Option<String>,
    /// Clock skew tolerance for `exp`/`nbf`, seconds.
    pub leeway: u64,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            leeway: DEFAULT_LEEWAY,
        }
    }
}

/// Verifies access tokens against a single RSA public key.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    reject_refresh: bool,
}

impl TokenVerifier {
    /// Create a verifier from a PEM-encoded RSA public key.
    pub fn new(public_key_pem: &str, options: VerifierOptions) -> Result<Self, ConfigError> {
        let key =
            DecodingKey::from_rsa_pem(public_key_pem.as_bytes()).map_err(ConfigError::PublicKey)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = options.leeway;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &options.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &options.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key,
            validation,
            reject_refresh: options.audience.is_none(),
        })
    }

    /// Check signature, algorithm, expiry and configured claims, then return
    /// the typed claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)?;
        if self.reject_refresh && data.claims.has_audience(REFRESH_AUDIENCE) {
            return Err(AuthError::InvalidClaims("refresh token used as access token".into()));
        }
        data.claims.validate()?;
        Ok(data.claims)
    }
}

/// Decode a token's payload WITHOUT checking its signature.
///
/// For logging and debugging only; never base an access decision on the
/// result.
pub fn decode(token: &str) -> Result<RawClaims, AuthError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::Malformed);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}
