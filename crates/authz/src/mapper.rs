//! AD-group to application-role mapping.
//!
//! Rules are compiled once at startup from a JSON object of
//! `pattern -> [ROLE, ...]`. A bad mapping never blocks startup: it is
//! logged and replaced by the empty mapping.

use crate::{ConfigError, Role, RoleSet};
use regex::Regex;
use std::collections::BTreeMap;

/// One compiled mapping rule.
#[derive(Debug, Clone)]
pub struct RoleRule {
    pattern: Regex,
    roles: RoleSet,
}

impl RoleRule {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Whether `group` matches this rule. Unanchored, like a regex search.
    pub fn matches(&self, group: &str) -> bool {
        self.pattern.is_match(group)
    }
}

/// Immutable set of compiled rules, shared by the edge and the handlers.
#[derive(Debug, Clone, Default)]
pub struct RoleMapper {
    rules: Vec<RoleRule>,
}

impl RoleMapper {
    /// The mapping that resolves every group list to no roles.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile rules, degrading to the empty mapping on any error.
    pub fn compile(rules: &BTreeMap<String, Vec<String>>) -> Self {
        match Self::try_compile(rules) {
            Ok(mapper) => mapper,
            Err(e) => {
                tracing::warn!("role mapping rejected, using empty mapping: {e}");
                Self::empty()
            }
        }
    }

    /// Compile rules, reporting the first invalid pattern or role name.
    pub fn try_compile(rules: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (pattern, names) in rules {
            let regex = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            let roles = names
                .iter()
                .map(|name| name.parse::<Role>())
                .collect::<Result<RoleSet, _>>()
                .map_err(|source| ConfigError::Role {
                    pattern: pattern.clone(),
                    source,
                })?;
            compiled.push(RoleRule {
                pattern: regex,
                roles,
            });
        }
        tracing::debug!(rules = compiled.len(), "compiled role mapping");
        Ok(Self { rules: compiled })
    }

    /// Parse and compile a JSON mapping, degrading to the empty mapping.
    ///
    /// A blank string is treated as "no mapping configured".
    pub fn from_json(json: &str) -> Self {
        if json.trim().is_empty() {
            return Self::empty();
        }
        match serde_json::from_str::<BTreeMap<String, Vec<String>>>(json) {
            Ok(rules) => Self::compile(&rules),
            Err(e) => {
                tracing::warn!("{}, using empty mapping", ConfigError::MappingJson(e));
                Self::empty()
            }
        }
    }

    /// Resolve group memberships to the union of every matching rule's roles.
    ///
    /// Pure union: rule order and duplicate groups do not change the result.
    pub fn resolve<I, S>(&self, groups: I) -> RoleSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roles = RoleSet::new();
        for group in groups {
            let group = group.as_ref();
            for rule in self.rules.iter().filter(|rule| rule.matches(group)) {
                roles.extend(&rule.roles);
            }
        }
        roles
    }

    pub fn rules(&self) -> &[RoleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
