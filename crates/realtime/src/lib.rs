//! Tactix realtime distributor.
//!
//! Ingests change events from one upstream feed and fans them out to
//! authenticated WebSocket connections. Each connection has a bounded queue;
//! a client that falls behind gets a fresh snapshot of its subscribed
//! resource instead of an unbounded backlog of deltas.

pub use {
    connection::{Connection, ConnectionId, ConnectionState, Delivery},
    distributor::{DEFAULT_MAX_QUEUE, Distributor, Fanout},
    error::{DeliveryError, FeedError, SnapshotError},
    feed::{Backoff, ChangeFeed, ChannelFeed, FeedStream, WsFeed},
    queue::Outbound,
    registry::Registry,
    sink::FrameSink,
    snapshot::{HttpSnapshotSource, SnapshotSource},
};

mod connection;
mod distributor;
mod error;
mod feed;
mod queue;
mod registry;
mod sink;
mod snapshot;
