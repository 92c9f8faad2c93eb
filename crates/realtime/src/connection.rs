//! A live client connection: identity, subscription state and outbound queue.

use crate::queue::{Offer, OutboundQueue, Outbound, Pending};
use authz::Identity;
use compact_str::CompactString;
use parking_lot::Mutex;
use protocol::{EventEnvelope, ServerMessage};
use std::{fmt, sync::Arc};
use tokio::sync::Notify;

/// Registry key of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection.
///
/// A connection only exists once its upgrade was authenticated, so the
/// pre-upgrade phase has no state here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Receives broadcast events only.
    Authenticated,
    /// Receives broadcast events and events for the key.
    Subscribed(CompactString),
    /// Terminal. Nothing is enqueued or delivered any more.
    Closed,
}

/// Result of offering an event to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The event does not match, or the connection is closed.
    Skipped,
    Queued,
    Resync,
    Truncated,
}

impl From<Offer> for Delivery {
    fn from(offer: Offer) -> Self {
        match offer {
            Offer::Queued => Self::Queued,
            Offer::Resync => Self::Resync,
            Offer::Truncated => Self::Truncated,
        }
    }
}

/// What the flush loop should do next.
#[derive(Debug)]
pub(crate) enum Step {
    Closed,
    Idle,
    Resync { key: CompactString, seq: u64 },
    Frame(Outbound),
}

struct Inner {
    state: ConnectionState,
    queue: OutboundQueue,
}

/// One WebSocket client.
///
/// State and queue sit behind a single short-lived lock, never held across
/// an await. The flush loop is woken through `notify`.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, identity: Identity, capacity: usize) -> Self {
        Self {
            id,
            identity,
            inner: Mutex::new(Inner {
                state: ConnectionState::Authenticated,
                queue: OutboundQueue::new(capacity),
            }),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state.clone()
    }

    pub fn subscription_key(&self) -> Option<CompactString> {
        match &self.inner.lock().state {
            ConnectionState::Subscribed(key) => Some(key.clone()),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().state == ConnectionState::Closed
    }

    /// Number of frames waiting, excluding a pending resync and the frame
    /// being sent.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Seq of the snapshot the next flush will send, if any.
    pub fn pending_resync(&self) -> Option<u64> {
        self.inner.lock().queue.resync_pending()
    }

    /// Apply the fan-out rule and enqueue `event` if it matches.
    pub fn offer_event(&self, event: &Arc<EventEnvelope>) -> Delivery {
        let delivery = {
            let mut inner = self.inner.lock();
            let Inner { state, queue } = &mut *inner;
            match &*state {
                ConnectionState::Closed => Delivery::Skipped,
                ConnectionState::Authenticated if event.matches(None) => {
                    queue.push_event(Arc::clone(event), false).into()
                }
                ConnectionState::Subscribed(key) if event.matches(Some(key.as_str())) => {
                    queue.push_event(Arc::clone(event), true).into()
                }
                _ => Delivery::Skipped,
            }
        };
        if delivery != Delivery::Skipped {
            self.notify.notify_one();
        }
        delivery
    }

    /// Enqueue a control frame. Returns false if closed or the queue is full.
    pub fn offer_control(&self, msg: ServerMessage) -> bool {
        let queued = {
            let mut inner = self.inner.lock();
            inner.state != ConnectionState::Closed && inner.queue.push_control(msg)
        };
        if queued {
            self.notify.notify_one();
        }
        queued
    }

    /// Move to `Subscribed(key)`. With a `seq` the next frame is a snapshot
    /// tagged with it and queued scoped deltas are discarded.
    pub fn subscribe(&self, key: CompactString, seq: Option<u64>) -> bool {
        {
            let mut inner = self.inner.lock();
            let Inner { state, queue } = &mut *inner;
            let same_key = match state {
                ConnectionState::Closed => return false,
                ConnectionState::Subscribed(current) => *current == key,
                ConnectionState::Authenticated => false,
            };
            match seq {
                Some(seq) => {
                    queue.drop_scoped();
                    queue.request_resync(seq);
                }
                None if same_key => {}
                None => queue.drop_scoped(),
            }
            *state = ConnectionState::Subscribed(key);
        }
        self.notify.notify_one();
        true
    }

    /// Back to `Authenticated`; queued scoped events are discarded.
    pub fn unsubscribe(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closed {
            return false;
        }
        inner.queue.drop_scoped();
        inner.state = ConnectionState::Authenticated;
        true
    }

    /// Mark closed and wake the flush loop so it exits. Idempotent.
    pub(crate) fn close(&self) {
        self.inner.lock().state = ConnectionState::Closed;
        self.notify.notify_one();
    }

    pub(crate) fn next_step(&self) -> Step {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closed {
            return Step::Closed;
        }
        let Inner { state, queue } = &mut *inner;
        loop {
            let step = match queue.pop() {
                None => return Step::Idle,
                Some(Pending::Frame(frame)) => Step::Frame(frame),
                Some(Pending::Resync(seq)) => match &*state {
                    ConnectionState::Subscribed(key) => Step::Resync {
                        key: key.clone(),
                        seq,
                    },
                    // Nothing to resync once unsubscribed.
                    _ => continue,
                },
            };
            queue.start_send();
            return step;
        }
    }

    /// The frame returned by the last step was written.
    pub(crate) fn finish_send(&self) {
        self.inner.lock().queue.finish_send();
    }

    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("upn", &self.identity.upn)
            .finish_non_exhaustive()
    }
}
