//! Shared fixtures for distributor tests.
#![allow(dead_code)]

use authz::{Identity, RoleSet};
use protocol::EventEnvelope;
use serde_json::{Value, json};
use std::{
    future::Future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tactix_realtime::{
    Connection, DeliveryError, Distributor, FrameSink, SnapshotError, SnapshotSource,
};
use tokio::sync::{Semaphore, mpsc};

/// Snapshot source that answers `{"key": <key>}` and records each fetch.
#[derive(Clone, Default)]
pub struct Snapshots {
    pub fetched: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl Snapshots {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl SnapshotSource for Snapshots {
    fn fetch(&self, key: &str) -> impl Future<Output = Result<Value, SnapshotError>> + Send {
        self.fetched.lock().unwrap().push(key.to_owned());
        let result = if self.fail {
            Err(SnapshotError::Unavailable("scripted failure".into()))
        } else {
            Ok(json!({ "key": key }))
        };
        std::future::ready(result)
    }
}

/// Sink whose sends block until [`GatedSink::open`] releases them.
#[derive(Clone)]
pub struct GatedSink {
    gate: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<Value>>>,
}

impl GatedSink {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
            sent: Arc::default(),
        }
    }

    /// Let `sends` more sends complete.
    pub fn open(&self, sends: usize) {
        self.gate.add_permits(sends);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Frames whose send completed.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }
}

impl FrameSink for GatedSink {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        let sink = self.clone();
        async move {
            sink.started.fetch_add(1, Ordering::SeqCst);
            let now = sink.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            sink.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let permit = sink
                .gate
                .acquire()
                .await
                .map_err(|_| DeliveryError::Send("gate closed".into()))?;
            permit.forget();
            sink.in_flight.fetch_sub(1, Ordering::SeqCst);
            sink.sent.lock().unwrap().push(serde_json::from_str(&frame).unwrap());
            Ok(())
        }
    }
}

pub fn identity(upn: &str) -> Identity {
    Identity {
        upn: upn.into(),
        display_name: None,
        ad_groups: Default::default(),
        roles: RoleSet::new(),
    }
}

pub fn scoped(key: &str, seq: u64) -> EventEnvelope {
    EventEnvelope::scoped("incident.updated", key, seq).with_payload(json!({ "seq": seq }))
}

pub fn broadcast(seq: u64) -> EventEnvelope {
    EventEnvelope::broadcast("system.notice", seq)
}

/// Flush `conn` until it goes idle and return every frame written.
pub async fn drain(dist: &Distributor<Snapshots>, conn: &Connection) -> Vec<Value> {
    let (mut tx, mut rx) = mpsc::channel(64);
    let _ = tokio::time::timeout(Duration::from_millis(50), dist.flush(conn, &mut tx)).await;
    drop(tx);
    let mut frames = Vec::new();
    while let Some(text) = rx.recv().await {
        frames.push(serde_json::from_str(&text).unwrap());
    }
    frames
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
