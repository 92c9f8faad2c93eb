//! Fan-out, backpressure and resync tests.

mod common;

use common::{GatedSink, Snapshots, broadcast, drain, eventually, identity, scoped};
use futures_util::{StreamExt, stream};
use std::{sync::Arc, time::Duration};
use tactix_realtime::{ConnectionState, Distributor, Fanout};
use tokio::sync::mpsc;

#[tokio::test]
async fn overflow_delivers_one_snapshot() {
    let dist = Distributor::new(Snapshots::default(), 2);
    let conn = dist.register(identity("alice"));
    assert!(dist.subscribe(conn.id(), "incident:1", None));

    for seq in 1..=3 {
        dist.publish(scoped("incident:1", seq));
    }
    assert_eq!(conn.queued(), 0);
    assert_eq!(conn.pending_resync(), Some(3));

    let frames = drain(&dist, &conn).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "snapshot");
    assert_eq!(frames[0]["seq"], 3);
    assert_eq!(frames[0]["subscriptionKey"], "incident:1");
    assert_eq!(frames[0]["resource"]["key"], "incident:1");
}

#[tokio::test]
async fn frame_in_flight_counts_toward_capacity() {
    let dist = Arc::new(Distributor::new(Snapshots::default(), 2));
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 1));

    let sink = GatedSink::new();
    let flush = tokio::spawn({
        let (dist, conn, mut sink) = (dist.clone(), conn.clone(), sink.clone());
        async move { dist.flush(&conn, &mut sink).await }
    });
    assert!(eventually(|| sink.started() == 1).await);
    assert_eq!(conn.queued(), 0);

    // One slot holds the send in flight, so the third event overflows.
    assert_eq!(dist.publish(scoped("incident:1", 2)).queued, 1);
    assert_eq!(dist.publish(scoped("incident:1", 3)).resyncs, 1);
    assert_eq!(conn.queued(), 0);
    assert_eq!(conn.pending_resync(), Some(3));
    assert_eq!(sink.started(), 1, "next frame popped before the send completed");

    sink.open(8);
    assert!(eventually(|| sink.sent().len() == 2).await);
    let frames = sink.sent();
    assert_eq!(frames[0]["type"], "incident.updated");
    assert_eq!(frames[0]["seq"], 1);
    assert_eq!(frames[1]["type"], "snapshot");
    assert_eq!(frames[1]["seq"], 3);
    assert_eq!(sink.max_in_flight(), 1);
    flush.abort();
}

#[tokio::test]
async fn slow_sink_keeps_one_send_in_flight() {
    let dist = Arc::new(Distributor::new(Snapshots::default(), 10));
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    for seq in 1..=4 {
        dist.publish(scoped("incident:1", seq));
    }

    let sink = GatedSink::new();
    let flush = tokio::spawn({
        let (dist, conn, mut sink) = (dist.clone(), conn.clone(), sink.clone());
        async move { dist.flush(&conn, &mut sink).await }
    });
    assert!(eventually(|| sink.started() == 1).await);
    assert_eq!(conn.queued(), 3);

    sink.open(1);
    assert!(eventually(|| sink.started() == 2).await);
    assert_eq!(conn.queued(), 2);

    sink.open(3);
    assert!(eventually(|| sink.sent().len() == 4).await);
    let seqs: Vec<u64> = sink.sent().iter().map(|f| f["seq"].as_u64().unwrap()).collect();
    assert_eq!(seqs, [1, 2, 3, 4]);
    assert_eq!(sink.max_in_flight(), 1);
    flush.abort();
}

#[tokio::test]
async fn queue_never_exceeds_capacity() {
    let dist = Distributor::new(Snapshots::default(), 3);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    for seq in 1..=20 {
        dist.publish(scoped("incident:1", seq));
        dist.publish(broadcast(seq));
        assert!(conn.queued() <= 3, "queue grew to {}", conn.queued());
    }
}

#[tokio::test]
async fn deltas_are_delivered_in_order() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    for seq in 1..=4 {
        dist.publish(scoped("incident:1", seq));
    }
    let seqs: Vec<u64> = drain(&dist, &conn)
        .await
        .iter()
        .map(|f| f["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, [1, 2, 3, 4]);
}

#[tokio::test]
async fn pending_resync_absorbs_later_deltas() {
    let dist = Distributor::new(Snapshots::default(), 1);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 1));
    dist.publish(scoped("incident:1", 2));
    let fanout = dist.publish(scoped("incident:1", 3));
    assert_eq!(fanout.resyncs, 1);
    assert_eq!(conn.pending_resync(), Some(3));
    assert_eq!(conn.queued(), 0);

    dist.publish(broadcast(4));
    let frames = drain(&dist, &conn).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["type"], "snapshot");
    assert_eq!(frames[1]["type"], "system.notice");
}

#[tokio::test]
async fn broadcast_overflow_folds_into_pending_snapshot() {
    let dist = Distributor::new(Snapshots::default(), 1);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 1));
    dist.publish(scoped("incident:1", 2));
    assert_eq!(conn.pending_resync(), Some(2));

    assert_eq!(dist.publish(broadcast(3)).queued, 1);
    assert_eq!(dist.publish(broadcast(4)).resyncs, 1);
    assert_eq!(conn.queued(), 0);
    assert_eq!(conn.pending_resync(), Some(4));

    let frames = drain(&dist, &conn).await;
    assert_eq!(frames.len(), 1, "queued broadcasts are lost with the backlog: {frames:?}");
    assert_eq!(frames[0]["type"], "snapshot");
    assert_eq!(frames[0]["seq"], 4);
}

#[tokio::test]
async fn subscribe_with_seq_sends_snapshot_first() {
    let snapshots = Snapshots::default();
    let dist = Distributor::new(snapshots.clone(), 10);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 40));
    dist.publish(broadcast(41));

    dist.subscribe(conn.id(), "incident:1", Some(42));
    let frames = drain(&dist, &conn).await;
    assert_eq!(frames[0]["type"], "snapshot");
    assert_eq!(frames[0]["seq"], 42);
    assert_eq!(frames.len(), 2, "stale delta must be dropped: {frames:?}");
    assert_eq!(frames[1]["type"], "system.notice");
    assert_eq!(snapshots.fetched(), ["incident:1"]);
}

#[tokio::test]
async fn fan_out_by_class_and_key() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let a = dist.register(identity("a"));
    let b = dist.register(identity("b"));
    let idle = dist.register(identity("c"));
    dist.subscribe(a.id(), "incident:1", None);
    dist.subscribe(b.id(), "incident:2", None);

    let fanout = dist.publish(scoped("incident:1", 1));
    assert_eq!(fanout, Fanout { queued: 1, ..Fanout::default() });
    assert_eq!(a.queued(), 1);
    assert_eq!(b.queued(), 0);

    assert_eq!(dist.publish(broadcast(2)).queued, 3);
    assert_eq!(idle.queued(), 1);
    assert_eq!(idle.state(), ConnectionState::Authenticated);
    assert_eq!(dist.last_seq(), 2);
}

#[tokio::test]
async fn switching_key_drops_old_scoped_events() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 1));
    dist.publish(broadcast(2));

    dist.subscribe(conn.id(), "incident:2", None);
    assert_eq!(conn.subscription_key().as_deref(), Some("incident:2"));
    assert_eq!(conn.queued(), 1);
    dist.publish(scoped("incident:1", 3));
    assert_eq!(conn.queued(), 1);
}

#[tokio::test]
async fn unsubscribe_keeps_broadcasts_only() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 1));
    assert!(dist.unsubscribe(conn.id()));
    assert_eq!(conn.queued(), 0);
    assert_eq!(dist.publish(scoped("incident:1", 2)).queued, 0);
    assert_eq!(dist.publish(broadcast(3)).queued, 1);
}

#[tokio::test]
async fn unsubscribed_overflow_truncates_backlog() {
    let dist = Distributor::new(Snapshots::default(), 2);
    let conn = dist.register(identity("alice"));
    dist.publish(broadcast(1));
    dist.publish(broadcast(2));
    let fanout = dist.publish(broadcast(3));
    assert_eq!(fanout.truncated, 1);
    assert_eq!(conn.queued(), 1);
    let frames = drain(&dist, &conn).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["seq"], 3);
}

#[tokio::test]
async fn closed_connection_receives_nothing() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let conn = dist.register(identity("alice"));
    dist.subscribe(conn.id(), "incident:1", None);
    dist.publish(scoped("incident:1", 1));

    assert!(dist.close(conn.id()));
    assert!(!dist.close(conn.id()));
    assert_eq!(dist.connection_count(), 0);
    assert_eq!(dist.publish(scoped("incident:1", 2)).queued, 0);
    assert!(!dist.subscribe(conn.id(), "incident:1", None));

    let (mut tx, mut rx) = mpsc::channel(8);
    dist.flush(&conn, &mut tx).await.unwrap();
    drop(tx);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn client_frames_are_answered() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let conn = dist.register(identity("alice"));
    dist.handle_client_text(&conn, r#"{"type":"ping"}"#);
    dist.handle_client_text(&conn, "not json");
    dist.handle_client_text(&conn, r#"{"type":"subscribe","subscriptionKey":"incident:9"}"#);

    assert_eq!(conn.subscription_key().as_deref(), Some("incident:9"));
    let frames = drain(&dist, &conn).await;
    assert_eq!(frames[0]["type"], "pong");
    assert_eq!(frames[1]["type"], "error");
    assert_eq!(frames[1]["code"], 400);
}

#[tokio::test]
async fn control_frames_skip_full_queue() {
    let dist = Distributor::new(Snapshots::default(), 1);
    let conn = dist.register(identity("alice"));
    dist.publish(broadcast(1));
    assert!(!conn.offer_control(protocol::ServerMessage::Pong));
    assert_eq!(conn.queued(), 1);
    assert_eq!(conn.pending_resync(), None);
}

#[tokio::test]
async fn send_failure_closes_connection() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let (tx, rx) = mpsc::channel::<String>(1);
    drop(rx);
    let incoming = stream::iter([r#"{"type":"ping"}"#.to_owned()]).chain(stream::pending());

    tokio::time::timeout(
        Duration::from_secs(1),
        dist.run_connection(identity("alice"), tx, incoming),
    )
    .await
    .expect("connection should end after failed send");
    assert_eq!(dist.connection_count(), 0);
}

#[tokio::test]
async fn snapshot_failure_notifies_then_closes() {
    let dist = Distributor::new(Snapshots::failing(), 10);
    let (tx, mut rx) = mpsc::channel::<String>(8);
    let incoming = stream::iter([
        r#"{"type":"subscribe","subscriptionKey":"incident:1","seq":5}"#.to_owned(),
    ])
    .chain(stream::pending());

    tokio::time::timeout(
        Duration::from_secs(1),
        dist.run_connection(identity("alice"), tx, incoming),
    )
    .await
    .expect("connection should end after failed resync");

    let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["code"], 503);
    assert!(rx.recv().await.is_none());
    assert_eq!(dist.connection_count(), 0);
}

#[tokio::test]
async fn client_hangup_closes_connection() {
    let dist = Distributor::new(Snapshots::default(), 10);
    let (tx, _rx) = mpsc::channel::<String>(8);
    dist.run_connection(identity("alice"), tx, stream::empty()).await;
    assert_eq!(dist.connection_count(), 0);
}
