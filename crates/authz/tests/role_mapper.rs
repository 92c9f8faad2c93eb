//! Role mapper tests.

use std::collections::BTreeMap;
use tactix_authz::{Claims, Identity, Role, RoleMapper, testing};

fn rules(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(p, roles)| (p.to_string(), roles.iter().map(|r| r.to_string()).collect()))
        .collect()
}

#[test]
fn matching_groups_contribute_union() {
    let mapper = RoleMapper::compile(&rules(&[
        ("^OPS_", &["VIEWER"]),
        ("_EDITORS$", &["EDITOR"]),
        ("^ADMINS$", &["ADMIN"]),
    ]));
    let roles = mapper.resolve(["OPS_1", "TEAM_EDITORS"]);
    assert!(roles.contains(Role::Viewer));
    assert!(roles.contains(Role::Editor));
    assert!(!roles.contains(Role::Imo));
}

#[test]
fn resolve_is_order_independent_and_idempotent() {
    let mapper = RoleMapper::from_json(r#"{"^OPS_": ["VIEWER"], "IMO": ["IMO"]}"#);
    let a = mapper.resolve(["OPS_1", "X_IMO"]);
    let b = mapper.resolve(["X_IMO", "OPS_1", "OPS_1"]);
    assert_eq!(a, b);
    assert_eq!(mapper.resolve(["X_IMO", "X_IMO"]), mapper.resolve(["X_IMO"]));
}

#[test]
fn duplicate_rules_do_not_duplicate_roles() {
    let mapper = RoleMapper::from_json(r#"{"^OPS_": ["EDITOR", "EDITOR"], "OPS": ["EDITOR"]}"#);
    let roles = mapper.resolve(["OPS_1"]);
    assert_eq!(roles.len(), 2);
    assert_eq!(roles.highest(), Some(Role::Editor));
}

#[test]
fn invalid_regex_degrades_to_empty() {
    let mapper = RoleMapper::from_json(r#"{"([unclosed": ["ADMIN"], "^OPS_": ["VIEWER"]}"#);
    assert!(mapper.is_empty());
    assert!(mapper.resolve(["OPS_1"]).is_empty());
}

#[test]
fn malformed_json_degrades_to_empty() {
    assert!(RoleMapper::from_json("{not json").is_empty());
    assert!(RoleMapper::from_json(r#"["^OPS_"]"#).is_empty());
    assert!(RoleMapper::from_json("").is_empty());
}

#[test]
fn unknown_role_name_is_reported() {
    let err = RoleMapper::try_compile(&rules(&[("^OPS_", &["OWNER"])])).unwrap_err();
    assert!(err.to_string().contains("OWNER"));
    assert!(RoleMapper::compile(&rules(&[("^OPS_", &["OWNER"])])).is_empty());
}

#[test]
fn identity_resolves_roles_from_claims() {
    let mapper = RoleMapper::from_json(r#"{"^OPS_": ["VIEWER"]}"#);
    let claims: Claims =
        serde_json::from_value(testing::claims("alice@example.com", &["OPS_1"])).unwrap();
    let identity = Identity::resolve(claims, &mapper);
    assert_eq!(identity.upn, "alice@example.com");
    assert!(identity.in_group("OPS_1"));
    assert!(identity.roles.contains(Role::Viewer));
}
