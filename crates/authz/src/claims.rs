//! Verified token claims and the per-request identity derived from them.

use crate::{AuthError, RoleMapper, RoleSet};
use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Claims carried by an access token issued by the auth service.
///
/// Only produced by [`crate::TokenVerifier::verify`], so holding a value of
/// this type means the signature and expiry have been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject; the user principal name unless `upn` overrides it.
    pub sub: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upn: Option<CompactString>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// AD group memberships. Anything but an array reads as no groups, and
    /// non-string entries are skipped.
    #[serde(default, deserialize_with = "string_array")]
    pub ad_groups: Vec<String>,
    /// Expiry, unix seconds.
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audiences, from either a single string or an array.
    #[serde(default, deserialize_with = "audiences", skip_serializing_if = "Vec::is_empty")]
    pub aud: Vec<String>,
}

impl Claims {
    /// The principal this token speaks for.
    pub fn principal(&self) -> &str {
        self.upn.as_deref().unwrap_or(&self.sub)
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|aud| aud == audience)
    }

    pub(crate) fn validate(&self) -> Result<(), AuthError> {
        if self.principal().trim().is_empty() {
            return Err(AuthError::InvalidClaims("empty subject".into()));
        }
        Ok(())
    }
}

fn strings(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect()
}

fn string_array<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => strings(items),
        _ => Vec::new(),
    })
}

fn audiences<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(aud) => vec![aud],
        Value::Array(items) => strings(items),
        _ => Vec::new(),
    })
}

/// Unverified claims, for introspection only.
pub type RawClaims = serde_json::Map<String, serde_json::Value>;

/// An authenticated caller. Lives for one request or one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub upn: CompactString,
    pub display_name: Option<String>,
    pub ad_groups: BTreeSet<String>,
    /// Roles resolved from `ad_groups` by the role mapper.
    pub roles: RoleSet,
}

impl Identity {
    /// Build the identity for verified `claims`, resolving roles with `mapper`.
    pub fn resolve(claims: Claims, mapper: &RoleMapper) -> Self {
        let roles = mapper.resolve(&claims.ad_groups);
        Self {
            upn: claims.principal().into(),
            display_name: claims.name,
            ad_groups: claims.ad_groups.into_iter().collect(),
            roles,
        }
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.ad_groups.contains(group)
    }
}
