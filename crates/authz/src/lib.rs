//! Tactix trust core: token verification, AD-group role mapping and
//! effective-permission computation.
//!
//! Build one [`TokenVerifier`], one [`RoleMapper`] and one
//! [`PermissionEngine`] at startup and share them; all three are immutable.

pub use {
    claims::{Claims, Identity, RawClaims},
    effective::{DEFAULT_READ_SUFFIXES, PermissionDenied, PermissionEngine, RoleGrant},
    error::{AuthError, ConfigError},
    mapper::{RoleMapper, RoleRule},
    role::{Action, Role, RoleSet, UnknownRole, escalate},
    verifier::{DEFAULT_LEEWAY, REFRESH_AUDIENCE, TokenVerifier, VerifierOptions, decode},
};

mod claims;
mod effective;
mod error;
mod mapper;
mod role;
mod verifier;

#[cfg(feature = "testing")]
pub mod testing;
