use crate::*;

use courier::mock::Submission;
use courier::{Ack, CourierError, OperationError, Response, WriteMode};
use courier_core::ChunkError;

#[tokio::test]
async fn test_zero_chunk_size_queues_nothing() {
    let rig = connected();

    let err = rig
        .handle
        .write(addr(), counting(10), 0, WriteMode::WithResponse, |_| {
            panic!("callback must not run")
        })
        .unwrap_err();
    assert_eq!(err, CourierError::Chunk(ChunkError::ZeroChunkSize));

    let status = rig.handle.status().await.unwrap();
    assert!(status.active.is_none());
    assert_eq!(status.queued, 0);
    assert_eq!(status.failed, 0);
}

/// An endpoint that does not resolve fails its operation without a round
/// trip; the next operation still runs.
#[tokio::test]
async fn test_unresolved_endpoint_fails_fast() {
    let rig = connected();
    rig.mock.make_unresolvable(other_addr());
    let mut rec = Recorder::new();

    rig.handle
        .write(other_addr(), counting(30), 20, WriteMode::WithResponse, rec.callback("missing"))
        .unwrap();
    rig.handle.read(other_addr(), rec.callback("missing-read")).unwrap();
    rig.handle
        .write(addr(), counting(3), 20, WriteMode::WithResponse, rec.callback("ok"))
        .unwrap();

    assert_eq!(
        rec.next().await,
        (
            "missing",
            Err(OperationError::AddressResolutionFailed(other_addr()))
        )
    );
    assert_eq!(
        rec.next().await,
        (
            "missing-read",
            Err(OperationError::AddressResolutionFailed(other_addr()))
        )
    );

    submissions(&rig.mock, 1).await;
    assert!(matches!(
        rig.mock.submissions()[0],
        Submission::Chunk { address, .. } if address == addr()
    ));
    rig.mock.ack(Ack::ChunkWritten);
    assert_eq!(rec.next().await, ("ok", Ok(Response::Written)));
}

/// A synchronous rejection fails only the operation it hit.
#[tokio::test]
async fn test_rejected_submission_fails_one_operation() {
    let rig = connected();
    let mut rec = Recorder::new();

    // Second chunk of the write is refused by the link.
    rig.handle
        .write(addr(), counting(25), 20, WriteMode::WithResponse, rec.callback("write"))
        .unwrap();
    rig.handle.read_signal_strength(rec.callback("rssi")).unwrap();

    submissions(&rig.mock, 1).await;
    rig.mock.reject_next("gatt busy");
    rig.mock.ack(Ack::ChunkWritten);
    assert_eq!(
        rec.next().await,
        (
            "write",
            Err(OperationError::SubmissionRejected("gatt busy".into()))
        )
    );

    submissions(&rig.mock, 2).await;
    assert!(matches!(
        rig.mock.submissions()[1],
        Submission::SignalRead { .. }
    ));
    rig.mock.ack(Ack::SignalStrength(-90));
    assert_eq!(rec.next().await, ("rssi", Ok(Response::Rssi(-90))));
}

/// A failed ack ends that operation with the reported status; siblings
/// keep running.
#[tokio::test]
async fn test_ack_error_is_per_operation() {
    let rig = connected();
    let mut rec = Recorder::new();

    rig.handle
        .write(addr(), counting(45), 20, WriteMode::WithResponse, rec.callback("write"))
        .unwrap();
    rig.handle.request_mtu(247, rec.callback("mtu")).unwrap();

    submissions(&rig.mock, 1).await;
    rig.mock.ack(Ack::ChunkWritten);
    submissions(&rig.mock, 2).await;
    rig.mock.ack(Ack::Failed { status: 0x85 });
    assert_eq!(
        rec.next().await,
        ("write", Err(OperationError::AckError { status: 0x85 }))
    );

    // The third chunk of the failed write is never sent.
    submissions(&rig.mock, 3).await;
    assert_eq!(rig.mock.chunk_lengths(), vec![20, 20]);
    rig.mock.ack(Ack::Mtu(247));
    assert_eq!(rec.next().await, ("mtu", Ok(Response::Mtu(247))));

    let status = rig.handle.status().await.unwrap();
    assert_eq!((status.completed, status.failed), (1, 1));
}

/// A panicking callback does not stall the queue.
#[tokio::test]
async fn test_panicking_callback_is_contained() {
    let rig = connected();
    let mut rec = Recorder::new();

    rig.handle
        .read_signal_strength(|_| panic!("host callback failure"))
        .unwrap();
    rig.handle.read_signal_strength(rec.callback("after")).unwrap();

    submissions(&rig.mock, 1).await;
    rig.mock.ack(Ack::SignalStrength(-1));
    submissions(&rig.mock, 2).await;
    rig.mock.ack(Ack::SignalStrength(-2));
    assert_eq!(rec.next().await, ("after", Ok(Response::Rssi(-2))));
}
