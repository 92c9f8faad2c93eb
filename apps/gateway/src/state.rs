//! Shared application state for the gateway server.

use crate::{auth::Authenticator, middleware::Allowlist};
use authz::PermissionEngine;
use realtime::{Distributor, SnapshotSource};
use std::sync::Arc;

/// Shared state available to all request handlers.
pub struct AppState<A: Authenticator, S: SnapshotSource> {
    /// Token authenticator.
    pub authenticator: Arc<A>,
    /// Realtime distributor.
    pub distributor: Arc<Distributor<S>>,
    /// Effective permission engine.
    pub permissions: Arc<PermissionEngine>,
    /// Paths that skip authentication.
    pub allowlist: Arc<Allowlist>,
    /// HTTP client used for proxying.
    pub client: reqwest::Client,
    /// Proxy target base URL.
    pub api_target: Arc<str>,
}

impl<A: Authenticator, S: SnapshotSource> Clone for AppState<A, S> {
    fn clone(&self) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
            distributor: Arc::clone(&self.distributor),
            permissions: Arc::clone(&self.permissions),
            allowlist: Arc::clone(&self.allowlist),
            client: self.client.clone(),
            api_target: Arc::clone(&self.api_target),
        }
    }
}
