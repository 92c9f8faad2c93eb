//! Wire format tests.

use serde_json::json;
use tactix_protocol::{ClientMessage, EventClass, EventEnvelope, ServerMessage};

#[test]
fn envelope_parses_upstream_shape() {
    let event: EventEnvelope = serde_json::from_value(json!({
        "type": "incident.updated",
        "subscriptionKey": "incident:42",
        "seq": 7,
        "payload": { "status": "open" },
        "occurredAt": "2026-01-01T00:00:00Z"
    }))
    .unwrap();
    assert_eq!(event.kind, "incident.updated");
    assert_eq!(event.class, EventClass::Scoped);
    assert_eq!(event.seq, 7);
    assert!(event.matches(Some("incident:42")));
    assert!(!event.matches(Some("incident:43")));
    assert!(!event.matches(None));
}

#[test]
fn envelope_without_key_is_broadcast() {
    let event: EventEnvelope = serde_json::from_value(json!({
        "type": "system.notice",
        "seq": 1,
        "occurredAt": "2026-01-01T00:00:00Z"
    }))
    .unwrap();
    assert!(event.is_broadcast());
    assert!(event.matches(None));
    assert!(event.matches(Some("incident:1")));
}

#[test]
fn envelope_serializes_camel_case() {
    let event = EventEnvelope::scoped("incident.updated", "incident:1", 3);
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "incident.updated");
    assert_eq!(value["subscriptionKey"], "incident:1");
    assert_eq!(value["class"], "scoped");
    assert!(value.get("occurredAt").is_some());
}

#[test]
fn client_messages() {
    let msg: ClientMessage =
        serde_json::from_str(r#"{"type":"subscribe","subscriptionKey":"incident:1","seq":4}"#)
            .unwrap();
    assert_eq!(
        msg,
        ClientMessage::Subscribe {
            subscription_key: "incident:1".into(),
            seq: Some(4),
        }
    );
    let msg: ClientMessage =
        serde_json::from_str(r#"{"type":"subscribe","subscriptionKey":"incident:1"}"#).unwrap();
    assert!(matches!(msg, ClientMessage::Subscribe { seq: None, .. }));
    assert_eq!(
        serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
        ClientMessage::Ping
    );
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
}

#[test]
fn server_messages() {
    let snapshot = ServerMessage::Snapshot {
        subscription_key: "incident:1".into(),
        resource: json!({ "id": 1 }),
        seq: 9,
    };
    assert_eq!(
        serde_json::to_value(&snapshot).unwrap(),
        json!({ "type": "snapshot", "subscriptionKey": "incident:1", "resource": { "id": 1 }, "seq": 9 })
    );
    assert_eq!(
        serde_json::to_value(ServerMessage::error(400, "bad frame")).unwrap(),
        json!({ "type": "error", "code": 400, "message": "bad frame" })
    );
    assert_eq!(
        serde_json::to_value(ServerMessage::Pong).unwrap(),
        json!({ "type": "pong" })
    );
}
