//! Application roles, the strict role hierarchy, and capability actions.
//!
//! The hierarchy is total: `Admin ⊇ Imo ⊇ Editor ⊇ Viewer`. Every
//! [`RoleSet`] is closed under it, so holding a role always means holding
//! every role below it.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

/// Application role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Read-only access.
    Viewer,
    /// May create and modify records.
    Editor,
    /// Incident management officer; may assign work.
    Imo,
    /// Full administrative access.
    Admin,
}

impl Role {
    /// All roles, least privileged first.
    pub const ALL: [Role; 4] = [Role::Viewer, Role::Editor, Role::Imo, Role::Admin];

    /// Canonical upper-case name, as used in configuration and tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "VIEWER",
            Self::Editor => "EDITOR",
            Self::Imo => "IMO",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VIEWER" => Ok(Self::Viewer),
            "EDITOR" => Ok(Self::Editor),
            "IMO" => Ok(Self::Imo),
            "ADMIN" => Ok(Self::Admin),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

/// Expand a role into itself plus every role it implies.
///
/// This is the single place the hierarchy is encoded; edge-level and
/// handler-level checks both go through it.
pub fn escalate(role: Role) -> RoleSet {
    RoleSet(Role::ALL.into_iter().filter(|r| *r <= role).collect())
}

/// A hierarchy-closed set of roles.
///
/// The only ways to add a role go through [`escalate`], so the set can
/// never hold a role without the roles it implies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    /// The empty role set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `role` and everything it implies.
    pub fn escalate(&mut self, role: Role) {
        self.0.extend(escalate(role).0);
    }

    /// Union with another closed set.
    pub fn extend(&mut self, other: &RoleSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// True if any of `roles` is held.
    pub fn intersects(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.0.contains(r))
    }

    /// Most privileged role held, if any.
    pub fn highest(&self) -> Option<Role> {
        self.0.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::new();
        for role in iter {
            set.escalate(role);
        }
        set
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let roles = Vec::<Role>::deserialize(deserializer)?;
        Ok(roles.into_iter().collect())
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for role in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(role.as_str())?;
            first = false;
        }
        Ok(())
    }
}

/// Capability checked by handlers before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Read,
    Write,
    Assign,
    Admin,
}

impl Action {
    /// Roles that grant this action. Fixed table.
    pub fn granted_by(self) -> &'static [Role] {
        match self {
            Self::Read => &[Role::Viewer, Role::Editor, Role::Imo, Role::Admin],
            Self::Write => &[Role::Editor, Role::Imo, Role::Admin],
            Self::Assign => &[Role::Imo, Role::Admin],
            Self::Admin => &[Role::Admin],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Assign => "ASSIGN",
            Self::Admin => "ADMIN",
        })
    }
}
