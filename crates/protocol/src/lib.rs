//! Tactix realtime wire protocol: change events from the upstream feed and
//! the JSON text frames exchanged with WebSocket clients.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subprotocol token offered by browsers that carry the access token in
/// `Sec-WebSocket-Protocol: bearer,<token>`.
pub const BEARER_SUBPROTOCOL: &str = "bearer";

/// Fan-out class of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// Delivered to every open connection.
    Broadcast,
    /// Delivered only to connections subscribed to the event's key.
    #[default]
    Scoped,
}

/// A change notification produced upstream.
///
/// `seq` is monotonic per subscription key. An event without a key is
/// treated as broadcast regardless of `class`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: CompactString,
    #[serde(default)]
    pub class: EventClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_key: Option<CompactString>,
    pub seq: u64,
    #[serde(default)]
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// A scoped event for `key`, stamped now.
    pub fn scoped(kind: impl Into<CompactString>, key: impl Into<CompactString>, seq: u64) -> Self {
        Self {
            kind: kind.into(),
            class: EventClass::Scoped,
            subscription_key: Some(key.into()),
            seq,
            payload: Value::Null,
            occurred_at: Utc::now(),
        }
    }

    /// A broadcast event, stamped now.
    pub fn broadcast(kind: impl Into<CompactString>, seq: u64) -> Self {
        Self {
            kind: kind.into(),
            class: EventClass::Broadcast,
            subscription_key: None,
            seq,
            payload: Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.class == EventClass::Broadcast || self.subscription_key.is_none()
    }

    /// Whether a connection subscribed to `key` (or to nothing) receives
    /// this event.
    pub fn matches(&self, key: Option<&str>) -> bool {
        if self.is_broadcast() {
            return true;
        }
        match (self.subscription_key.as_deref(), key) {
            (Some(own), Some(key)) => own == key,
            _ => false,
        }
    }
}

/// Frames sent by a client over the realtime socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start (or switch) the connection's subscription. A `seq` asks the
    /// server to resync from a snapshot before streaming events.
    Subscribe {
        #[serde(rename = "subscriptionKey")]
        subscription_key: CompactString,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    /// Drop the current subscription; broadcast events keep flowing.
    Unsubscribe,
    /// Keepalive.
    Ping,
}

/// Frames sent by the gateway to a client, other than raw events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full resource state; replaces whatever the client had for the key.
    Snapshot {
        #[serde(rename = "subscriptionKey")]
        subscription_key: CompactString,
        resource: Value,
        seq: u64,
    },
    /// Error response.
    Error {
        /// HTTP-style status code.
        code: u16,
        message: String,
    },
    /// Pong response to client ping.
    Pong,
    /// Idle keepalive, unix milliseconds.
    Heartbeat { ts: i64 },
}

impl ServerMessage {
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
