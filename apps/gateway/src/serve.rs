//! Gateway serve entrypoint, shared by the binary and tests.

use crate::{
    AppState, GatewayConfig, JwtAuthenticator,
    auth::Authenticator,
    middleware::Allowlist,
    router::router,
};
use anyhow::{Context, Result};
use authz::{PermissionEngine, TokenVerifier};
use realtime::{Backoff, Distributor, HttpSnapshotSource, SnapshotSource, WsFeed};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};

/// First feed reconnect delay.
const FEED_BACKOFF_INITIAL: Duration = Duration::from_millis(500);

/// Handle returned by [`serve`]: the bound port and shutdown trigger.
pub struct ServeHandle {
    /// The port the gateway is listening on.
    pub port: u16,
    shutdown_tx: broadcast::Sender<()>,
    join: JoinHandle<std::io::Result<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServeHandle {
    /// A receiver that fires when [`Self::shutdown`] is called.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Run `task` until shutdown.
    pub fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.push(tokio::spawn(task));
    }

    /// Trigger graceful shutdown and wait for the server and its background
    /// tasks to stop.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.join.await??;
        for task in self.tasks {
            task.await?;
        }
        Ok(())
    }
}

/// Build the production state: JWT authenticator, HTTP snapshot source.
pub fn build_state(config: &GatewayConfig) -> Result<AppState<JwtAuthenticator, HttpSnapshotSource>> {
    let verifier = TokenVerifier::new(&config.public_key_pem(), config.verifier_options())
        .context("invalid PUBLIC_KEY")?;
    let mapper = Arc::new(config.role_mapper());
    tracing::info!("loaded {} role mapping rules", mapper.len());

    let client = reqwest::Client::new();
    let snapshots = HttpSnapshotSource::new(client.clone(), &config.snapshot_url);
    let allowlist = Allowlist::new(&config.allowlist).context("invalid allowlist pattern")?;

    Ok(AppState {
        authenticator: Arc::new(JwtAuthenticator::new(verifier, mapper)),
        distributor: Arc::new(Distributor::new(snapshots, config.max_queue)),
        permissions: Arc::new(PermissionEngine::new(&config.read_suffixes)),
        allowlist: Arc::new(allowlist),
        client,
        api_target: Arc::from(config.api_target.as_str()),
    })
}

/// Build everything from `config`, bind, start the change feed and
/// heartbeat, and start serving.
pub async fn serve(config: &GatewayConfig) -> Result<ServeHandle> {
    let state = build_state(config)?;
    let distributor = Arc::clone(&state.distributor);
    let mut handle = serve_state(state, &config.bind).await?;

    match &config.upstream_feed_url {
        Some(url) => {
            let feed = WsFeed::new(url);
            let backoff = Backoff::new(FEED_BACKOFF_INITIAL, config.feed_backoff_max());
            let shutdown = handle.shutdown_signal();
            let distributor = Arc::clone(&distributor);
            tracing::info!("subscribing to change feed at {url}");
            handle.spawn(async move { distributor.ingest(feed, backoff, shutdown).await });
        }
        None => tracing::warn!("UPSTREAM_FEED_URL not set, realtime ingestion disabled"),
    }

    if let Some(every) = config.heartbeat() {
        let shutdown = handle.shutdown_signal();
        handle.spawn(async move { distributor.heartbeat(every, shutdown).await });
    }

    Ok(handle)
}

/// Serve an already-built state on `bind`.
pub async fn serve_state<A, S>(state: AppState<A, S>, bind: &str) -> Result<ServeHandle>
where
    A: Authenticator,
    S: SnapshotSource,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let port = listener.local_addr()?.port();
    tracing::info!("gateway listening on {bind} (port {port})");

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("received shutdown signal");
            })
            .await
    });

    Ok(ServeHandle {
        port,
        shutdown_tx,
        join,
        tasks: Vec::new(),
    })
}
