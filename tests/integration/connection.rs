use crate::*;

use courier::{Ack, ConnectionState, CourierError, OperationError, Response, WriteMode};

#[tokio::test]
async fn test_operations_refused_until_connected() {
    let rig = rig_with(QueueConfig::default());
    let mut rec = Recorder::new();

    rig.handle.read_signal_strength(rec.callback("idle")).unwrap();
    assert_eq!(rec.next().await, ("idle", Err(OperationError::NotConnected)));

    rig.handle.on_connecting().unwrap();
    rig.handle
        .write(addr(), counting(4), 20, WriteMode::WithResponse, rec.callback("connecting"))
        .unwrap();
    assert_eq!(
        rec.next().await,
        ("connecting", Err(OperationError::NotConnected))
    );
    assert!(rig.mock.submissions().is_empty());

    let status = rig.handle.status().await.unwrap();
    assert_eq!(status.connection, ConnectionState::Connecting);
    assert_eq!(status.failed, 2);
}

/// After a disconnect, a late ack from the old link is ignored and a fresh
/// connection re-resolves and runs new operations normally.
#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let rig = connected();
    let mut rec = Recorder::new();

    rig.handle.read(addr(), rec.callback("lost")).unwrap();
    submissions(&rig.mock, 1).await;
    rig.handle.on_disconnected().unwrap();
    assert_eq!(rec.next().await, ("lost", Err(OperationError::Disconnected)));

    // Answer to the read that was in flight when the link dropped.
    rig.mock.ack(Ack::Value(bytes::Bytes::from_static(b"late")));
    settle().await;
    rec.assert_quiet();

    rig.handle.on_connecting().unwrap();
    rig.handle.on_connected().unwrap();
    rig.handle.read(addr(), rec.callback("fresh")).unwrap();
    submissions(&rig.mock, 2).await;
    rig.mock.ack(Ack::Value(bytes::Bytes::from_static(b"\x01\x02")));
    assert_eq!(
        rec.next().await,
        (
            "fresh",
            Ok(Response::Value(bytes::Bytes::from_static(b"\x01\x02")))
        )
    );

    let status = rig.handle.status().await.unwrap();
    assert_eq!(status.connection, ConnectionState::Connected);
    assert_eq!(status.completed, 1);
    assert_eq!(status.failed, 1);
}

/// A disconnect while a write is paused between chunks fails the write;
/// the pause expiring afterwards sends nothing.
#[tokio::test(start_paused = true)]
async fn test_disconnect_while_paused_between_chunks() {
    let rig = rig_with(QueueConfig {
        chunk_interval_ms: 50,
        ..QueueConfig::default()
    });
    rig.handle.on_connected().unwrap();
    let mut rec = Recorder::new();

    rig.handle
        .write(addr(), counting(45), 20, WriteMode::WithResponse, rec.callback("paced"))
        .unwrap();
    submissions(&rig.mock, 1).await;
    rig.mock.ack(Ack::ChunkWritten);

    let mut paused = false;
    for _ in 0..100 {
        let status = rig.handle.status().await.unwrap();
        if status.active.is_some_and(|a| !a.awaiting_ack && a.bytes_sent == Some(20)) {
            paused = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(paused, "write never entered the pause between chunks");

    rig.handle.on_disconnected().unwrap();
    assert_eq!(rec.next().await, ("paced", Err(OperationError::Disconnected)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.mock.chunk_lengths(), vec![20]);

    rig.handle.on_connected().unwrap();
    rig.handle
        .write(addr(), counting(3), 20, WriteMode::WithResponse, rec.callback("after"))
        .unwrap();
    submissions(&rig.mock, 2).await;
    rig.mock.ack(Ack::ChunkWritten);
    assert_eq!(rec.next().await, ("after", Ok(Response::Written)));
    assert_eq!(rig.mock.chunk_lengths(), vec![20, 3]);
}

#[tokio::test]
async fn test_shutdown_fails_pending_and_closes_handle() {
    let rig = connected();
    let mut rec = Recorder::new();

    rig.handle
        .write(addr(), counting(50), 20, WriteMode::WithResponse, rec.callback("write"))
        .unwrap();
    rig.handle.request_mtu(185, rec.callback("mtu")).unwrap();
    submissions(&rig.mock, 1).await;

    rig.handle.shutdown();
    assert_eq!(rec.next().await, ("write", Err(OperationError::Disconnected)));
    assert_eq!(rec.next().await, ("mtu", Err(OperationError::Disconnected)));

    rig.worker.await.unwrap().unwrap();
    assert_eq!(
        rig.handle.read_signal_strength(|_| {}),
        Err(CourierError::WorkerClosed)
    );
    assert_eq!(rig.handle.status().await, Err(CourierError::WorkerClosed));
}

#[tokio::test]
async fn test_status_serializes_progress() {
    let rig = connected();

    rig.handle
        .write(addr(), counting(41), 20, WriteMode::WithResponse, |_| {})
        .unwrap();
    rig.handle.read_signal_strength(|_| {}).unwrap();
    submissions(&rig.mock, 1).await;
    rig.mock.ack(Ack::ChunkWritten);
    submissions(&rig.mock, 2).await;

    let status = rig.handle.status().await.unwrap();
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["connection"], "connected");
    assert_eq!(json["queued"], 1);
    assert_eq!(json["active"]["kind"], "write");
    assert_eq!(json["active"]["bytes_sent"], 20);
    assert_eq!(json["active"]["total_len"], 41);
    assert_eq!(json["active"]["awaiting_ack"], true);
}
