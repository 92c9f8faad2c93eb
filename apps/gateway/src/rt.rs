//! Realtime WebSocket endpoint: upgrade authentication and the socket loop.

use crate::{
    AppState,
    auth::{Authenticator, correlation_id, ws_token},
};
use authz::Identity;
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, future, stream::SplitSink};
use protocol::BEARER_SUBPROTOCOL;
use realtime::{DeliveryError, Distributor, FrameSink, SnapshotSource};
use serde::Deserialize;
use std::{future::Future, sync::Arc};

/// Whether `path` is served by the realtime endpoint.
pub fn is_realtime_path(path: &str) -> bool {
    path == "/rt" || path.starts_with("/rt/")
}

/// Query string of an upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct RtQuery {
    pub token: Option<String>,
}

/// Authenticate the upgrade request before accepting it.
///
/// Without a valid token the response is a bare `401 Unauthorized` and the
/// connection is closed; no realtime connection is ever registered.
pub async fn upgrade<A, S>(
    State(state): State<AppState<A, S>>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<RtQuery>,
    ws: WebSocketUpgrade,
) -> Response
where
    A: Authenticator,
    S: SnapshotSource,
{
    let cid = correlation_id(&headers);
    let path = uri.path();
    let Some(token) = ws_token(&headers, query.token.as_deref()) else {
        tracing::warn!(cid = %cid, path = %path, reason = "missing", "ws auth failure");
        return unauthorized();
    };

    match state.authenticator.authenticate(token).await {
        Ok(identity) => {
            tracing::info!(cid = %cid, path = %path, upn = %identity.upn, roles = %identity.roles, "ws auth success");
            let distributor = Arc::clone(&state.distributor);
            ws.protocols([BEARER_SUBPROTOCOL])
                .on_upgrade(move |socket| serve_socket(socket, distributor, identity))
                .into_response()
        }
        Err(e) => {
            tracing::warn!(cid = %cid, path = %path, reason = e.reason(), "ws auth failure");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, [(header::CONNECTION, "close")]).into_response()
}

/// Run an upgraded socket through the distributor until either side ends.
async fn serve_socket<S: SnapshotSource>(
    socket: WebSocket,
    distributor: Arc<Distributor<S>>,
    identity: Identity,
) {
    let (sender, receiver) = socket.split();
    let incoming = receiver
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        });
    distributor
        .run_connection(identity, WsSink(sender), incoming)
        .await;
}

/// Write half of an upgraded socket. Each send completes only once the
/// frame has been written.
pub struct WsSink(SplitSink<WebSocket, Message>);

impl FrameSink for WsSink {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        async move {
            self.0
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| DeliveryError::Send(e.to_string()))
        }
    }
}
