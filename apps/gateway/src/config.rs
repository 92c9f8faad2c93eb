//! Gateway configuration, from the environment or a TOML file.

use crate::utils::{self, split_csv, unescape_newlines};
use anyhow::{Context, Result, bail};
use authz::{DEFAULT_LEEWAY, DEFAULT_READ_SUFFIXES, RoleMapper, VerifierOptions};
use realtime::DEFAULT_MAX_QUEUE;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, path::Path, str::FromStr, time::Duration};

/// Paths that bypass authentication unless configured otherwise.
pub const DEFAULT_ALLOWLIST: [&str; 3] = ["^/auth/", "^/health$", "^/api-docs/"];

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address.
    pub bind: String,
    /// RSA public key (PEM) used to verify access tokens.
    pub public_key: String,
    /// AD group pattern to role names. Either a table or a JSON object
    /// string; a malformed mapping is logged and left empty.
    #[serde(deserialize_with = "lenient_role_mapping")]
    pub role_mapping: BTreeMap<String, Vec<String>>,
    /// Group suffixes that grant VIEWER on an operation.
    pub read_suffixes: Vec<String>,
    /// Per-connection realtime queue capacity.
    pub max_queue: usize,
    /// WebSocket URL of the change feed. No ingestion when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_feed_url: Option<String>,
    /// Backend that authenticated HTTP requests are forwarded to.
    pub api_target: String,
    /// Base URL of the snapshot service.
    pub snapshot_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_audience: Option<String>,
    /// Heartbeat interval for realtime connections. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_secs: Option<u64>,
    /// Cap of the change feed reconnect backoff.
    pub feed_backoff_max_secs: u64,
    /// Path regexes that skip authentication.
    pub allowlist: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            public_key: String::new(),
            role_mapping: BTreeMap::new(),
            read_suffixes: DEFAULT_READ_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            max_queue: DEFAULT_MAX_QUEUE,
            upstream_feed_url: None,
            api_target: "http://incident-svc:3000".to_owned(),
            snapshot_url: "http://incident-svc:3000/snapshots".to_owned(),
            jwt_issuer: None,
            jwt_audience: None,
            heartbeat_secs: None,
            feed_backoff_max_secs: 30,
            allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl GatewayConfig {
    /// Parse a TOML string into a `GatewayConfig`, expanding environment
    /// variables first.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let expanded = utils::expand_env_vars(toml_str);
        let config: Self = toml::from_str(&expanded).context("invalid gateway config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unset or blank variables
    /// keep their defaults.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind) = var("BIND") {
            config.bind = bind;
        } else if let Some(port) = var("PORT") {
            let port: u16 = parse_number("PORT", &port)?;
            config.bind = format!("0.0.0.0:{port}");
        }
        if let Some(key) = var("PUBLIC_KEY") {
            config.public_key = key;
        }
        if let Some(json) = var("ROLE_MAPPING") {
            config.role_mapping = role_mapping_or_empty(Value::String(json));
        }
        if let Some(csv) = var("RBAC_READ_SUFFIXES") {
            config.read_suffixes = split_csv(&csv);
        }
        if let Some(max) = var("MAX_QUEUE") {
            config.max_queue = parse_number("MAX_QUEUE", &max)?;
        }
        config.upstream_feed_url = var("UPSTREAM_FEED_URL");
        if let Some(target) = var("API_TARGET") {
            config.api_target = target;
        }
        if let Some(url) = var("SNAPSHOT_URL") {
            config.snapshot_url = url;
        }
        config.jwt_issuer = var("JWT_ISSUER");
        config.jwt_audience = var("JWT_AUDIENCE");
        if let Some(secs) = var("HEARTBEAT_SECS") {
            config.heartbeat_secs = Some(parse_number("HEARTBEAT_SECS", &secs)?);
        }
        if let Some(secs) = var("FEED_BACKOFF_MAX_SECS") {
            config.feed_backoff_max_secs = parse_number("FEED_BACKOFF_MAX_SECS", &secs)?;
        }
        if let Some(csv) = var("AUTH_ALLOWLIST") {
            config.allowlist = split_csv(&csv);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.public_key.trim().is_empty() {
            bail!("PUBLIC_KEY is required");
        }
        if self.max_queue == 0 {
            bail!("MAX_QUEUE must be at least 1");
        }
        if self.heartbeat_secs == Some(0) {
            bail!("HEARTBEAT_SECS must be at least 1");
        }
        Ok(())
    }

    /// The public key with escaped newlines restored.
    pub fn public_key_pem(&self) -> String {
        unescape_newlines(&self.public_key)
    }

    pub fn verifier_options(&self) -> VerifierOptions {
        VerifierOptions {
            issuer: self.jwt_issuer.clone(),
            audience: self.jwt_audience.clone(),
            leeway: DEFAULT_LEEWAY,
        }
    }

    /// Compile the role mapping. Never fails; bad rules leave it empty.
    pub fn role_mapper(&self) -> RoleMapper {
        RoleMapper::compile(&self.role_mapping)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        self.heartbeat_secs.map(Duration::from_secs)
    }

    pub fn feed_backoff_max(&self) -> Duration {
        Duration::from_secs(self.feed_backoff_max_secs.max(1))
    }
}

/// Read a role mapping from a table of pattern to role list or single role,
/// or from a string holding that object as JSON.
fn parse_role_mapping(value: Value) -> Result<BTreeMap<String, Vec<String>>, String> {
    let rules = match value {
        Value::Object(rules) => rules,
        Value::String(json) => match serde_json::from_str(&json) {
            Ok(Value::Object(rules)) => rules,
            Ok(other) => return Err(format!("expected an object, got {other}")),
            Err(e) => return Err(e.to_string()),
        },
        other => return Err(format!("expected an object, got {other}")),
    };

    rules
        .into_iter()
        .map(|(pattern, roles)| {
            let roles = match roles {
                Value::String(role) => vec![role],
                Value::Array(roles) => roles
                    .into_iter()
                    .map(|role| match role {
                        Value::String(role) => Ok(role),
                        other => Err(format!("role for `{pattern}` must be a string, got {other}")),
                    })
                    .collect::<Result<_, _>>()?,
                other => return Err(format!("roles for `{pattern}` must be a list, got {other}")),
            };
            Ok((pattern, roles))
        })
        .collect()
}

fn role_mapping_or_empty(value: Value) -> BTreeMap<String, Vec<String>> {
    parse_role_mapping(value).unwrap_or_else(|e| {
        tracing::warn!("ignoring invalid role mapping: {e}");
        BTreeMap::new()
    })
}

fn lenient_role_mapping<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(role_mapping_or_empty(Value::deserialize(deserializer)?))
}

fn parse_number<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{name} must be a number, got {value:?}"))
}
