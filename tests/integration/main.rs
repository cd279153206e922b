//! Courier integration test harness.
//!
//! Every test drives a real `Peripheral` worker on the tokio runtime
//! against a `MockChannel`. The test plays the remote peer: it waits for a
//! submission to appear, then answers it with `mock.ack(..)`, which posts
//! the ack back to the worker the way a link's notification path would.
//!
//!   cargo test --test integration

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use courier::mock::MockChannel;
use courier::{ack_channel, OperationResult, Peripheral, PeripheralHandle, TaskDispatcher};
use courier_core::config::QueueConfig;
use courier_core::EndpointAddress;

mod connection;
mod failures;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a test waits for a callback before giving up.
pub const WAIT: Duration = Duration::from_secs(2);

pub fn addr() -> EndpointAddress {
    EndpointAddress::new(Uuid::from_u128(0x6E40_0001), Uuid::from_u128(0x6E40_0002))
}

pub fn other_addr() -> EndpointAddress {
    EndpointAddress::new(Uuid::from_u128(0x6E40_0001), Uuid::from_u128(0x6E40_0003))
}

/// Payload whose bytes count up from zero, so chunk order is visible.
pub fn counting(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}

/// A worker, its handle, and the mock link it drives.
pub struct Rig {
    pub handle: PeripheralHandle,
    pub mock: MockChannel,
    pub worker: JoinHandle<anyhow::Result<()>>,
}

pub fn rig_with(config: QueueConfig) -> Rig {
    let (acks, events) = ack_channel();
    let mock = MockChannel::with_acks(acks);
    let (dispatcher, _dispatch_task) = TaskDispatcher::spawn();
    let (handle, worker) = Peripheral::spawn(mock.clone(), events, dispatcher, &config);
    Rig {
        handle,
        mock,
        worker,
    }
}

/// A rig whose peer has already connected.
pub fn connected() -> Rig {
    let rig = rig_with(QueueConfig::default());
    rig.handle.on_connected().unwrap();
    rig
}

/// Collects callback results in the order the dispatcher fires them.
pub struct Recorder {
    tx: mpsc::UnboundedSender<(&'static str, OperationResult)>,
    rx: mpsc::UnboundedReceiver<(&'static str, OperationResult)>,
}

impl Recorder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A callback that records its result under `label`.
    pub fn callback(&self, label: &'static str) -> impl FnOnce(OperationResult) + Send + 'static {
        let tx = self.tx.clone();
        move |result| {
            let _ = tx.send((label, result));
        }
    }

    /// The next fired callback. Panics if none fires within [`WAIT`].
    pub async fn next(&mut self) -> (&'static str, OperationResult) {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("no callback fired in time")
            .expect("recorder channel closed")
    }

    /// Assert no callback has fired that was not already taken.
    pub fn assert_quiet(&mut self) {
        if let Ok((label, result)) = self.rx.try_recv() {
            panic!("unexpected callback {label}: {result:?}");
        }
    }
}

/// Wait for the mock to record `count` submissions, bounded by [`WAIT`].
pub async fn submissions(mock: &MockChannel, count: usize) {
    tokio::time::timeout(WAIT, mock.wait_for_submissions(count))
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {count} submissions, saw {:?}",
                mock.submissions()
            )
        });
}

/// Give the worker and dispatcher a chance to run anything already queued.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
