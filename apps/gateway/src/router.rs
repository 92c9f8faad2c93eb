//! HTTP routes of the edge.

use crate::{
    ApiError, AppState,
    auth::Authenticator,
    middleware::require_auth,
    proxy,
    rt::upgrade,
};
use authz::{Action, Identity, PermissionEngine, Role, RoleGrant, RoleSet};
use axum::{
    Extension, Json, Router,
    extract::{Request, State},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post},
};
use compact_str::CompactString;
use realtime::SnapshotSource;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Build the edge router.
///
/// `/health` and `/authz/effective` are served locally, `/rt` and `/rt/*`
/// upgrade to realtime sockets, and everything else is forwarded to the
/// backend API.
pub fn router<A: Authenticator, S: SnapshotSource>(state: AppState<A, S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/authz/effective", post(effective::<A, S>))
        .route("/rt", get(upgrade::<A, S>))
        .route("/rt/{*rest}", get(upgrade::<A, S>))
        .fallback(forward::<A, S>)
        .layer(from_fn_with_state(state.clone(), require_auth::<A, S>))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "ts": chrono::Utc::now().to_rfc3339() }))
}

/// Body of `POST /authz/effective`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveRequest {
    pub operation_code: CompactString,
    /// Grants held by the application for this operation.
    #[serde(default)]
    pub grants: Vec<RoleGrant>,
    /// When set, respond 403 unless the effective roles permit it.
    #[serde(default)]
    pub action: Option<Action>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveResponse {
    pub upn: CompactString,
    pub operation_code: CompactString,
    pub roles: RoleSet,
    pub highest: Option<Role>,
}

/// Effective roles of the caller on one operation, for backends that
/// guard mutations.
async fn effective<A: Authenticator, S: SnapshotSource>(
    State(state): State<AppState<A, S>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<EffectiveRequest>,
) -> Result<Json<EffectiveResponse>, ApiError> {
    let roles = state
        .permissions
        .compute_effective(&identity, &request.operation_code, &request.grants);
    if let Some(action) = request.action {
        PermissionEngine::require(&roles, action)?;
    }
    Ok(Json(EffectiveResponse {
        upn: identity.upn,
        operation_code: request.operation_code,
        highest: roles.highest(),
        roles,
    }))
}

async fn forward<A: Authenticator, S: SnapshotSource>(
    State(state): State<AppState<A, S>>,
    req: Request,
) -> Result<Response, ApiError> {
    proxy::forward(&state.client, &state.api_target, req).await
}
