//! Shared fixtures: a gateway on an ephemeral port and a fake backend.
#![allow(dead_code)]

use authz::{PermissionEngine, RoleMapper, TokenVerifier, VerifierOptions, testing};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
};
use realtime::{Distributor, SnapshotError, SnapshotSource};
use serde_json::{Value, json};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tactix_gateway::{
    Allowlist, AppState, JwtAuthenticator, ServeHandle, config::DEFAULT_ALLOWLIST, serve_state,
};

/// Answers every key with `{"key": <key>, "status": "open"}`.
#[derive(Clone, Copy, Default)]
pub struct StaticSnapshots;

impl SnapshotSource for StaticSnapshots {
    fn fetch(&self, key: &str) -> impl Future<Output = Result<Value, SnapshotError>> + Send {
        std::future::ready(Ok(json!({ "key": key, "status": "open" })))
    }
}

pub struct TestGateway {
    pub handle: ServeHandle,
    pub distributor: Arc<Distributor<StaticSnapshots>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.handle.port)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{path}", self.handle.port)
    }
}

/// Serve a gateway that forwards to `api_target`. Members of `OPS_*` groups
/// are mapped to EDITOR.
pub async fn spawn_gateway(api_target: &str) -> TestGateway {
    let verifier = TokenVerifier::new(testing::PUBLIC_KEY, VerifierOptions::default()).unwrap();
    let mapper = Arc::new(RoleMapper::from_json(r#"{"^OPS_": ["EDITOR"]}"#));
    let distributor = Arc::new(Distributor::new(StaticSnapshots, 10));
    let state = AppState {
        authenticator: Arc::new(JwtAuthenticator::new(verifier, mapper)),
        distributor: Arc::clone(&distributor),
        permissions: Arc::new(PermissionEngine::default()),
        allowlist: Arc::new(Allowlist::new(DEFAULT_ALLOWLIST).unwrap()),
        client: reqwest::Client::new(),
        api_target: Arc::from(api_target),
    };
    let handle = serve_state(state, "127.0.0.1:0").await.unwrap();
    TestGateway {
        handle,
        distributor,
    }
}

/// Backend that echoes each request as JSON and counts hits.
pub struct Backend {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

async fn echo(
    State(hits): State<Arc<AtomicUsize>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "authorization": header("authorization"),
        "correlationId": header("x-correlation-id"),
        "body": String::from_utf8_lossy(&body),
    }))
}

pub async fn spawn_backend() -> Backend {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().fallback(echo).with_state(Arc::clone(&hits));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Backend { url, hits }
}

impl Backend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
