//! Fan-out of change events to subscribed connections.

use crate::{
    ChangeFeed, DeliveryError, FrameSink, SnapshotSource,
    connection::{Connection, ConnectionId, Delivery, Step},
    feed::Backoff,
    registry::Registry,
};
use authz::Identity;
use compact_str::CompactString;
use futures_core::Stream;
use futures_util::StreamExt;
use protocol::{ClientMessage, EventEnvelope, ServerMessage};
use std::{
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::broadcast;

/// Default per-connection queue capacity.
pub const DEFAULT_MAX_QUEUE: usize = 100;

/// Per-publish fan-out summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Connections the event was queued on.
    pub queued: usize,
    /// Connections whose backlog was replaced by a pending snapshot.
    pub resyncs: usize,
    /// Unsubscribed connections whose backlog was truncated.
    pub truncated: usize,
}

/// Routes upstream events to live connections.
///
/// Each connection owns a bounded queue of `max_queue` frames drained by a
/// single flush loop, so there is at most one send in flight per connection.
/// The frame in flight counts toward `max_queue`. An enqueue on a full queue
/// discards the backlog and schedules a snapshot of the subscribed resource
/// instead.
pub struct Distributor<S> {
    registry: Registry,
    snapshots: S,
    max_queue: usize,
    last_seq: AtomicU64,
}

impl<S: SnapshotSource> Distributor<S> {
    pub fn new(snapshots: S, max_queue: usize) -> Self {
        Self {
            registry: Registry::new(),
            snapshots,
            max_queue: max_queue.max(1),
            last_seq: AtomicU64::new(0),
        }
    }

    pub fn max_queue(&self) -> usize {
        self.max_queue
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Highest seq ingested so far.
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Relaxed)
    }

    /// Create an authenticated connection.
    pub fn register(&self, identity: Identity) -> Arc<Connection> {
        let conn = self.registry.insert(identity, self.max_queue);
        tracing::info!(conn = %conn.id(), upn = %conn.identity().upn, "realtime connection opened");
        conn
    }

    /// Remove and close a connection. Returns false if it was already gone.
    pub fn close(&self, id: ConnectionId) -> bool {
        match self.registry.remove(id) {
            Some(conn) => {
                conn.close();
                tracing::info!(conn = %id, "realtime connection closed");
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self, id: ConnectionId, key: impl Into<CompactString>, seq: Option<u64>) -> bool {
        self.registry
            .get(id)
            .is_some_and(|conn| self.subscribe_conn(&conn, key.into(), seq))
    }

    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        self.registry.get(id).is_some_and(|conn| conn.unsubscribe())
    }

    /// Offer `event` to every live connection.
    pub fn publish(&self, event: EventEnvelope) -> Fanout {
        self.last_seq.fetch_max(event.seq, Ordering::Relaxed);
        let event = Arc::new(event);
        let mut fanout = Fanout::default();
        for conn in self.registry.snapshot() {
            match conn.offer_event(&event) {
                Delivery::Skipped => {}
                Delivery::Queued => fanout.queued += 1,
                Delivery::Resync => {
                    fanout.resyncs += 1;
                    tracing::debug!(conn = %conn.id(), seq = event.seq, "queue overflow, resync scheduled");
                }
                Delivery::Truncated => {
                    fanout.truncated += 1;
                    tracing::debug!(conn = %conn.id(), "queue overflow, backlog truncated");
                }
            }
        }
        fanout
    }

    /// Parse one raw feed frame and publish it. Malformed frames are
    /// logged and dropped.
    pub fn ingest_frame(&self, frame: &str) -> Option<Fanout> {
        match serde_json::from_str::<EventEnvelope>(frame) {
            Ok(event) => Some(self.publish(event)),
            Err(e) => {
                tracing::warn!("dropping malformed feed frame: {e}");
                None
            }
        }
    }

    /// Apply one client text frame to `conn`.
    pub fn handle_client_text(&self, conn: &Connection, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe {
                subscription_key,
                seq,
            }) => {
                self.subscribe_conn(conn, subscription_key, seq);
            }
            Ok(ClientMessage::Unsubscribe) => {
                conn.unsubscribe();
            }
            Ok(ClientMessage::Ping) => {
                conn.offer_control(ServerMessage::Pong);
            }
            Err(e) => {
                tracing::debug!(conn = %conn.id(), "invalid client frame: {e}");
                conn.offer_control(ServerMessage::error(400, format!("invalid message: {e}")));
            }
        }
    }

    fn subscribe_conn(&self, conn: &Connection, key: CompactString, seq: Option<u64>) -> bool {
        tracing::debug!(conn = %conn.id(), key = %key, seq = ?seq, "subscribe");
        conn.subscribe(key, seq)
    }

    /// Drain `conn` into `sink` until it is closed or a send fails.
    ///
    /// Frames are popped only after the previous send completed.
    pub async fn flush<K: FrameSink>(&self, conn: &Connection, sink: &mut K) -> Result<(), DeliveryError> {
        loop {
            match conn.next_step() {
                Step::Closed => return Ok(()),
                Step::Idle => conn.wait().await,
                Step::Frame(frame) => {
                    sink.send(frame.to_text()?).await?;
                    conn.finish_send();
                }
                Step::Resync { key, seq } => {
                    let resource = match self.snapshots.fetch(&key).await {
                        Ok(resource) => resource,
                        Err(e) => {
                            tracing::warn!(conn = %conn.id(), key = %key, "snapshot fetch failed: {e}");
                            let notice = ServerMessage::error(503, "snapshot unavailable, reconnect");
                            if let Ok(text) = serde_json::to_string(&notice) {
                                let _ = sink.send(text).await;
                            }
                            return Err(e.into());
                        }
                    };
                    if conn.is_closed() {
                        return Ok(());
                    }
                    let snapshot = ServerMessage::Snapshot {
                        subscription_key: key,
                        resource,
                        seq,
                    };
                    sink.send(serde_json::to_string(&snapshot)?).await?;
                    conn.finish_send();
                }
            }
        }
    }

    /// Run one connection to completion: register it, flush its queue into
    /// `sink`, apply frames from `incoming`, and close it when either side
    /// ends.
    pub async fn run_connection<K, I>(&self, identity: Identity, mut sink: K, incoming: I)
    where
        K: FrameSink,
        I: Stream<Item = String> + Send,
    {
        let conn = self.register(identity);
        let mut incoming = pin!(incoming);
        let mut flush = pin!(self.flush(&conn, &mut sink));
        loop {
            tokio::select! {
                result = &mut flush => {
                    if let Err(e) = result {
                        tracing::warn!(conn = %conn.id(), "delivery failed: {e}");
                    }
                    break;
                }
                text = incoming.next() => match text {
                    Some(text) => self.handle_client_text(&conn, &text),
                    None => break,
                },
            }
        }
        self.close(conn.id());
    }

    /// Consume `feed` until shutdown, reconnecting with `backoff` whenever
    /// the subscription is lost. Live connections stay open meanwhile.
    pub async fn ingest<F: ChangeFeed>(
        &self,
        feed: F,
        mut backoff: Backoff,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let connected = tokio::select! {
                _ = shutdown.recv() => return,
                result = feed.connect() => result,
            };
            match connected {
                Ok(mut stream) => {
                    tracing::info!("change feed connected");
                    backoff.reset();
                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => return,
                            item = stream.next() => match item {
                                Some(Ok(frame)) => {
                                    self.ingest_frame(&frame);
                                }
                                Some(Err(e)) => {
                                    tracing::warn!("change feed error: {e}");
                                    break;
                                }
                                None => {
                                    tracing::warn!("change feed closed");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => tracing::warn!("change feed unavailable: {e}"),
            }
            let delay = backoff.next_delay();
            tracing::info!("reconnecting change feed in {delay:?}");
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Offer a heartbeat to every connection each `every` until shutdown.
    /// Connections with a full queue skip the beat.
    pub async fn heartbeat(&self, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = ticker.tick() => {
                    let ts = chrono::Utc::now().timestamp_millis();
                    for conn in self.registry.snapshot() {
                        conn.offer_control(ServerMessage::Heartbeat { ts });
                    }
                }
            }
        }
    }
}
