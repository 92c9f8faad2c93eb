//! Per-connection bounded outbound queue.

use protocol::{EventEnvelope, ServerMessage};
use std::{collections::VecDeque, sync::Arc};

/// One frame waiting to be written to a client.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A change event, shared across every connection it fans out to.
    Event(Arc<EventEnvelope>),
    /// A gateway-originated message (pong, error, heartbeat).
    Control(ServerMessage),
}

impl Outbound {
    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Event(event) => serde_json::to_string(event.as_ref()),
            Self::Control(msg) => serde_json::to_string(msg),
        }
    }

    fn is_scoped_event(&self) -> bool {
        matches!(self, Self::Event(event) if !event.is_broadcast())
    }
}

/// Outcome of offering an event to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// The backlog was discarded; a snapshot will be sent instead.
    Resync,
    /// The backlog was discarded and only this event kept, because the
    /// connection has nothing to resync from.
    Truncated,
}

/// Next thing the flush loop must do.
#[derive(Debug)]
pub(crate) enum Pending {
    Resync(u64),
    Frame(Outbound),
}

/// Bounded FIFO plus a pending-resync marker.
///
/// Queued items plus the frame currently being sent never exceed `capacity`.
/// A pending resync is not a queue entry; it is always served before the
/// items.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    items: VecDeque<Outbound>,
    capacity: usize,
    resync: Option<u64>,
    in_flight: bool,
}

impl OutboundQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            resync: None,
            in_flight: false,
        }
    }

    fn occupied(&self) -> usize {
        self.items.len() + usize::from(self.in_flight)
    }

    fn is_full(&self) -> bool {
        self.occupied() >= self.capacity
    }

    /// Enqueue an event. `can_resync` is false for connections without a
    /// subscription.
    ///
    /// A broadcast that overflows the queue also schedules the snapshot and
    /// raises its seq. Broadcasts already queued are lost with the backlog;
    /// the snapshot only restores the subscribed resource.
    pub(crate) fn push_event(&mut self, event: Arc<EventEnvelope>, can_resync: bool) -> Offer {
        let scoped = !event.is_broadcast();

        // A pending snapshot already covers scoped deltas; just raise its seq.
        if scoped {
            if let Some(seq) = self.resync.as_mut() {
                *seq = (*seq).max(event.seq);
                return Offer::Resync;
            }
        }

        if !self.is_full() {
            self.items.push_back(Outbound::Event(event));
            return Offer::Queued;
        }

        self.items.clear();
        if can_resync {
            self.request_resync(event.seq);
            Offer::Resync
        } else {
            // With a single slot taken by the send in flight, the event is dropped.
            if !self.is_full() {
                self.items.push_back(Outbound::Event(event));
            }
            Offer::Truncated
        }
    }

    /// Enqueue a control frame; dropped when the queue is full.
    pub(crate) fn push_control(&mut self, msg: ServerMessage) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push_back(Outbound::Control(msg));
        true
    }

    pub(crate) fn request_resync(&mut self, seq: u64) {
        self.resync = Some(self.resync.map_or(seq, |pending| pending.max(seq)));
    }

    /// Discard queued scoped events and any pending resync.
    pub(crate) fn drop_scoped(&mut self) {
        self.items.retain(|item| !item.is_scoped_event());
        self.resync = None;
    }

    pub(crate) fn pop(&mut self) -> Option<Pending> {
        if let Some(seq) = self.resync.take() {
            return Some(Pending::Resync(seq));
        }
        self.items.pop_front().map(Pending::Frame)
    }

    /// The popped frame is being written; it keeps its slot until
    /// [`Self::finish_send`].
    pub(crate) fn start_send(&mut self) {
        self.in_flight = true;
    }

    pub(crate) fn finish_send(&mut self) {
        self.in_flight = false;
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn resync_pending(&self) -> Option<u64> {
        self.resync
    }
}
