//! Channel adapter: the contract between the queue and the link.
//!
//! The adapter accepts one submission at a time and reports its outcome
//! later through an [`AckSender`]. The queue never submits a second unit
//! of work before the previous one has been acknowledged.

use bytes::Bytes;
use tokio::sync::mpsc;

use courier_core::{EndpointAddress, WriteMode};

use crate::operation::OperationId;

/// Synchronous refusal of a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejected {
    pub reason: String,
}

impl Rejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Trait implemented by the link layer.
///
/// Every `submit_*` call that returns `Ok` must eventually be answered
/// with exactly one [`ChannelEvent`] carrying the same id. Unacknowledged
/// writes are answered with a locally synthesized `ChunkWritten`.
pub trait ChannelAdapter: Send + 'static {
    /// Resolved handle for an endpoint on the current connection.
    type Endpoint: Send;

    /// Look the endpoint up on the live connection. `None` fails the
    /// operation without a round trip.
    fn resolve(&mut self, address: &EndpointAddress) -> Option<Self::Endpoint>;

    fn submit_chunk(
        &mut self,
        id: OperationId,
        endpoint: &Self::Endpoint,
        chunk: Bytes,
        mode: WriteMode,
    ) -> Result<(), Rejected>;

    fn submit_signal_read(&mut self, id: OperationId) -> Result<(), Rejected>;

    fn submit_read(&mut self, id: OperationId, endpoint: &Self::Endpoint) -> Result<(), Rejected>;

    fn submit_mtu_request(&mut self, id: OperationId, mtu: u16) -> Result<(), Rejected>;
}

/// Outcome of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    ChunkWritten,
    SignalStrength(i32),
    Value(Bytes),
    Mtu(u16),
    /// Non-success status reported by the peer or the stack.
    Failed { status: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub id: OperationId,
    pub ack: Ack,
}

/// Posts acks from the adapter's notification context into the worker.
///
/// Cheap to clone; safe to call from any thread.
#[derive(Debug, Clone)]
pub struct AckSender {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl AckSender {
    /// Returns false if the worker has gone away.
    pub fn send(&self, id: OperationId, ack: Ack) -> bool {
        self.tx.send(ChannelEvent { id, ack }).is_ok()
    }
}

/// Receiving half, owned by the worker.
pub type AckReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

/// Create the ack path. Hand the sender to the adapter and the receiver
/// to [`crate::Peripheral::new`].
pub fn ack_channel() -> (AckSender, AckReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AckSender { tx }, rx)
}
