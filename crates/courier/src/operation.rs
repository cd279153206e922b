//! Pending operations: one caller request plus its in-flight progress.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;

use courier_core::{chunk, ChunkError, EndpointAddress, OperationError, WriteMode};

/// Identity assigned by the queue at enqueue time. Acks are keyed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Write,
    SignalRead,
    Read,
    MtuRequest,
}

/// Success payload handed to a completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Every chunk of a write was acknowledged.
    Written,
    /// Signal strength in dBm.
    Rssi(i32),
    /// Characteristic value.
    Value(Bytes),
    /// Negotiated MTU.
    Mtu(u16),
}

pub type OperationResult = Result<Response, OperationError>;

/// Invoked exactly once per enqueued operation, by the dispatcher.
pub type Callback = Box<dyn FnOnce(OperationResult) + Send + 'static>;

/// The unit of work a caller asks for. Write carries its chunk progress.
#[derive(Debug)]
pub enum Operation {
    Write(WriteProgress),
    SignalRead,
    Read { address: EndpointAddress },
    MtuRequest { mtu: u16 },
}

impl Operation {
    /// Build a write, splitting the payload up front so a zero chunk size
    /// fails before anything is enqueued.
    pub fn write(
        address: EndpointAddress,
        payload: Bytes,
        max_chunk_size: usize,
        mode: WriteMode,
    ) -> Result<Self, ChunkError> {
        let chunks = chunk::split(&payload, max_chunk_size)?;
        Ok(Operation::Write(WriteProgress {
            address,
            mode,
            total_len: payload.len(),
            remaining: chunks.into(),
            cursor: 0,
            chunk_interval: None,
        }))
    }

    /// Pause `interval` between this write's chunks instead of the
    /// queue-wide interval. A zero interval disables pacing for the write.
    /// Has no effect on other kinds.
    pub fn with_chunk_interval(mut self, interval: Duration) -> Self {
        if let Operation::Write(w) = &mut self {
            w.chunk_interval = Some(interval);
        }
        self
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Write(_) => OperationKind::Write,
            Operation::SignalRead => OperationKind::SignalRead,
            Operation::Read { .. } => OperationKind::Read,
            Operation::MtuRequest { .. } => OperationKind::MtuRequest,
        }
    }

    /// Endpoint that must resolve before the operation can become active.
    pub fn address(&self) -> Option<EndpointAddress> {
        match self {
            Operation::Write(w) => Some(w.address),
            Operation::Read { address } => Some(*address),
            Operation::SignalRead | Operation::MtuRequest { .. } => None,
        }
    }
}

/// Chunk bookkeeping for a write.
///
/// Invariant: `cursor <= total_len`, and `cursor` equals the summed length
/// of the chunks already popped from `remaining`.
#[derive(Debug)]
pub struct WriteProgress {
    pub address: EndpointAddress,
    pub mode: WriteMode,
    /// Overrides the queue-wide pause between chunks.
    pub chunk_interval: Option<Duration>,
    total_len: usize,
    remaining: VecDeque<Bytes>,
    cursor: usize,
}

impl WriteProgress {
    /// Chunk to submit next. `None` once every chunk is acknowledged.
    pub fn next_chunk(&self) -> Option<&Bytes> {
        self.remaining.front()
    }

    /// Record an ack for the chunk returned by `next_chunk`. Returns true
    /// when the write is complete.
    pub fn acknowledge(&mut self) -> bool {
        if let Some(chunk) = self.remaining.pop_front() {
            self.cursor += chunk.len();
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty() && self.cursor == self.total_len
    }

    pub fn bytes_sent(&self) -> usize {
        self.cursor
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }
}

/// An operation waiting in (or at the head of) the queue.
pub struct PendingOperation {
    pub id: OperationId,
    pub op: Operation,
    callback: Callback,
}

impl PendingOperation {
    pub fn new(id: OperationId, op: Operation, callback: Callback) -> Self {
        Self { id, op, callback }
    }

    pub fn kind(&self) -> OperationKind {
        self.op.kind()
    }

    /// Consume the operation into its completion.
    pub fn finish(self, result: OperationResult) -> Completion {
        Completion {
            id: self.id,
            kind: self.op.kind(),
            result,
            callback: self.callback,
            fired: None,
        }
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

/// A finished operation and the callback that reports it.
pub struct Completion {
    pub id: OperationId,
    pub kind: OperationKind,
    pub result: OperationResult,
    callback: Callback,
    fired: Option<oneshot::Sender<()>>,
}

impl Completion {
    /// Run the caller's callback.
    pub fn complete(self) {
        let Completion {
            result,
            callback,
            fired,
            ..
        } = self;
        callback(result);
        if let Some(fired) = fired {
            let _ = fired.send(());
        }
    }

    /// Resolves once the callback has run, or the completion was dropped
    /// without running it.
    pub(crate) fn on_fired(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.fired = Some(tx);
        rx
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
