//! Effective per-operation permissions.
//!
//! AD groups give a coarse baseline (`{OP}_{SUFFIX}` grants VIEWER);
//! database grants overlay finer roles on top. Grants only ever add: the
//! AD baseline is a floor that revoking a grant cannot go below.

use crate::{Action, Identity, Role, RoleSet};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Group suffixes that grant VIEWER when none are configured.
pub const DEFAULT_READ_SUFFIXES: [&str; 3] = ["READ", "VIEW", "ALL"];

/// An application-owned, per-operation role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGrant {
    pub upn: CompactString,
    pub operation_code: CompactString,
    pub role: Role,
}

/// Returned by [`PermissionEngine::require`]; rendered as 403 by the edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("forbidden: {action} requires one of {required:?}")]
pub struct PermissionDenied {
    pub action: Action,
    pub required: &'static [Role],
}

/// Computes effective role sets and answers capability checks.
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    read_suffixes: Vec<String>,
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_READ_SUFFIXES)
    }
}

impl PermissionEngine {
    /// Create an engine with the given read suffixes; blank entries are
    /// ignored and an empty list falls back to the defaults.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut read_suffixes: Vec<String> = suffixes
            .into_iter()
            .map(|s| s.as_ref().trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if read_suffixes.is_empty() {
            read_suffixes = DEFAULT_READ_SUFFIXES.iter().map(|s| s.to_string()).collect();
        }
        Self { read_suffixes }
    }

    /// Parse a comma-separated suffix list (`RBAC_READ_SUFFIXES`).
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn read_suffixes(&self) -> &[String] {
        &self.read_suffixes
    }

    /// Effective roles of `identity` on `operation_code`.
    ///
    /// Grants for other users or other operations are ignored. User
    /// principal names compare case-insensitively.
    pub fn compute_effective(
        &self,
        identity: &Identity,
        operation_code: &str,
        grants: &[RoleGrant],
    ) -> RoleSet {
        let mut roles = RoleSet::new();

        let has_read_group = self
            .read_suffixes
            .iter()
            .any(|suffix| identity.in_group(&format!("{operation_code}_{suffix}")));
        if has_read_group {
            roles.escalate(Role::Viewer);
        }

        for grant in grants.iter().filter(|g| {
            g.operation_code.as_str() == operation_code && g.upn.eq_ignore_ascii_case(&identity.upn)
        }) {
            roles.escalate(grant.role);
        }

        roles
    }

    /// Whether `roles` permit `action`.
    pub fn can(roles: &RoleSet, action: Action) -> bool {
        roles.intersects(action.granted_by())
    }

    /// Like [`Self::can`], as a `Result` for `?` in handlers.
    pub fn require(roles: &RoleSet, action: Action) -> Result<(), PermissionDenied> {
        if Self::can(roles, action) {
            Ok(())
        } else {
            Err(PermissionDenied {
                action,
                required: action.granted_by(),
            })
        }
    }
}
