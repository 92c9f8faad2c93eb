//! Edge authentication middleware.

use crate::{
    ApiError, AppState,
    auth::{Authenticator, X_CORRELATION_ID, bearer_token, correlation_id},
    rt::is_realtime_path,
};
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use realtime::SnapshotSource;
use regex::RegexSet;

/// Path patterns that skip authentication.
#[derive(Debug, Clone)]
pub struct Allowlist(RegexSet);

impl Allowlist {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RegexSet::new(patterns).map(Self)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.0.is_match(path)
    }
}

/// Authenticate every request that is neither allowlisted nor a realtime
/// upgrade (those authenticate in their own handler).
///
/// On success the [`authz::Identity`] is attached to the request extensions
/// and the request continues with its `Authorization` header untouched. The
/// correlation id is set on both the forwarded request and the response.
pub async fn require_auth<A, S>(
    State(state): State<AppState<A, S>>,
    mut req: Request,
    next: Next,
) -> Response
where
    A: Authenticator,
    S: SnapshotSource,
{
    let cid = correlation_id(req.headers());
    let cid_header = HeaderValue::from_str(&cid).ok();
    if let Some(value) = &cid_header {
        req.headers_mut().insert(X_CORRELATION_ID, value.clone());
    }
    let path = req.uri().path().to_owned();

    let mut response = if state.allowlist.is_match(&path) || is_realtime_path(&path) {
        next.run(req).await
    } else {
        let token = bearer_token(req.headers()).map(str::to_owned);
        let result = match token {
            Ok(token) => state.authenticator.authenticate(&token).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(identity) => {
                tracing::info!(cid = %cid, path = %path, upn = %identity.upn, roles = %identity.roles, "auth success");
                req.extensions_mut().insert(identity);
                next.run(req).await
            }
            Err(e) => {
                tracing::warn!(cid = %cid, path = %path, reason = e.reason(), "auth failure");
                ApiError::from(e).into_response()
            }
        }
    };

    if let Some(value) = cid_header {
        response.headers_mut().insert(X_CORRELATION_ID, value);
    }
    response
}
