//! Operation queue: the single-flight state machine.
//!
//! Operations run strictly in FIFO order. The head of the queue is the
//! only one that may be active, and at most one submission is awaiting an
//! ack at any instant. Completions are collected into an outbox while the
//! queue mutates; the owner hands them to a dispatcher afterwards, so no
//! callback ever observes a half-updated queue.
//!
//! After an operation finishes the queue holds: the next head is not
//! activated until the owner calls [`OperationQueue::advance`], which it
//! does once the finished operation's callback has fired.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use courier_core::OperationError;

use crate::channel::{Ack, ChannelAdapter, ChannelEvent, Rejected};
use crate::operation::{
    Callback, Completion, Operation, OperationId, OperationKind, OperationResult,
    PendingOperation, Response,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the queue for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub connection: ConnectionState,
    pub active: Option<ActiveStatus>,
    /// Operations waiting behind the active one.
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveStatus {
    pub id: OperationId,
    pub kind: OperationKind,
    pub awaiting_ack: bool,
    /// Write progress; `None` for request-style operations.
    pub bytes_sent: Option<usize>,
    pub total_len: Option<usize>,
}

/// The head operation once it has been handed to the channel.
struct ActiveSlot<E> {
    id: OperationId,
    endpoint: Option<E>,
    awaiting_ack: bool,
    /// Sequence number of the submission awaiting an ack.
    submission: u64,
}

enum Step {
    Finish(OperationResult),
    /// Submit the next chunk, after the pause if one applies.
    NextChunk(Option<Duration>),
}

pub struct OperationQueue<C: ChannelAdapter> {
    channel: C,
    queue: VecDeque<PendingOperation>,
    active: Option<ActiveSlot<C::Endpoint>>,
    state: ConnectionState,
    next_id: u64,
    chunk_interval: Option<Duration>,
    outbox: Vec<Completion>,
    pacing: Option<(OperationId, Duration)>,
    /// Set when an operation finishes; cleared by `advance`.
    held: bool,
    submissions: u64,
    completed: u64,
    failed: u64,
}

impl<C: ChannelAdapter> OperationQueue<C> {
    pub fn new(channel: C, chunk_interval: Option<Duration>) -> Self {
        Self {
            channel,
            queue: VecDeque::new(),
            active: None,
            state: ConnectionState::Disconnected,
            next_id: 1,
            chunk_interval,
            outbox: Vec::new(),
            pacing: None,
            held: false,
            submissions: 0,
            completed: 0,
            failed: 0,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    // ── Caller side ───────────────────────────────────────────────────────────

    /// Append an operation. If the queue is idle it starts immediately.
    ///
    /// While not connected the operation is failed with `NotConnected`
    /// instead of being queued.
    pub fn enqueue(&mut self, op: Operation, callback: Callback) -> OperationId {
        if self.state != ConnectionState::Connected {
            tracing::debug!(
                kind = ?op.kind(),
                state = ?self.state,
                "operation refused, not connected"
            );
            return self.refuse(op, callback, OperationError::NotConnected);
        }

        let pending = PendingOperation::new(self.allocate_id(), op, callback);
        let id = pending.id;
        tracing::debug!(
            %id,
            kind = ?pending.kind(),
            ahead = self.queue.len(),
            "operation enqueued"
        );
        self.queue.push_back(pending);
        self.activate_next();
        id
    }

    /// Fail an operation without queueing it. It still gets an id and
    /// exactly one completion.
    pub fn refuse(
        &mut self,
        op: Operation,
        callback: Callback,
        error: OperationError,
    ) -> OperationId {
        let pending = PendingOperation::new(self.allocate_id(), op, callback);
        let id = pending.id;
        self.failed += 1;
        self.outbox.push(pending.finish(Err(error)));
        id
    }

    fn allocate_id(&mut self) -> OperationId {
        let id = OperationId(self.next_id);
        self.next_id += 1;
        id
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_connected(&mut self) {
        tracing::info!("peer connected, queue accepting operations");
        self.state = ConnectionState::Connected;
    }

    /// Fail the active operation and everything queued behind it, in order.
    pub fn on_disconnected(&mut self) {
        tracing::info!(pending = self.queue.len(), "peer disconnected, draining queue");
        self.state = ConnectionState::Disconnected;
        self.drain(OperationError::Disconnected);
    }

    /// Fail every pending operation with `error` and clear the queue.
    pub fn drain(&mut self, error: OperationError) {
        self.active = None;
        self.pacing = None;
        while let Some(pending) = self.queue.pop_front() {
            self.failed += 1;
            self.outbox.push(pending.finish(Err(error.clone())));
        }
    }

    // ── Channel side ──────────────────────────────────────────────────────────

    /// Apply an ack from the channel. Acks that do not belong to the
    /// submission currently awaiting one are ignored.
    pub fn on_event(&mut self, event: ChannelEvent) {
        let ChannelEvent { id, ack } = event;
        let awaiting = self
            .active
            .as_ref()
            .is_some_and(|slot| slot.id == id && slot.awaiting_ack);
        if !awaiting {
            tracing::debug!(%id, ?ack, "stale ack ignored");
            return;
        }
        let Some(head) = self.queue.front_mut() else {
            return;
        };

        let step = match (&mut head.op, ack) {
            (_, Ack::Failed { status }) => {
                Step::Finish(Err(OperationError::AckError { status }))
            }
            (Operation::Write(w), Ack::ChunkWritten) => {
                if w.acknowledge() {
                    Step::Finish(Ok(Response::Written))
                } else {
                    tracing::debug!(
                        %id,
                        sent = w.bytes_sent(),
                        total = w.total_len(),
                        "chunk acknowledged"
                    );
                    let pause = w.chunk_interval.or(self.chunk_interval);
                    Step::NextChunk(pause.filter(|d| !d.is_zero()))
                }
            }
            (Operation::SignalRead, Ack::SignalStrength(dbm)) => {
                Step::Finish(Ok(Response::Rssi(dbm)))
            }
            (Operation::Read { .. }, Ack::Value(value)) => {
                Step::Finish(Ok(Response::Value(value)))
            }
            (Operation::MtuRequest { .. }, Ack::Mtu(mtu)) => {
                Step::Finish(Ok(Response::Mtu(mtu)))
            }
            (op, ack) => {
                tracing::warn!(
                    %id,
                    kind = ?op.kind(),
                    ?ack,
                    "ack does not match active operation, ignored"
                );
                return;
            }
        };

        if let Some(slot) = self.active.as_mut() {
            slot.awaiting_ack = false;
        }

        match step {
            Step::Finish(result) => self.finish_head(result),
            Step::NextChunk(Some(delay)) => self.pacing = Some((id, delay)),
            Step::NextChunk(None) => self.continue_head(),
        }
    }

    /// Submit the next chunk of a paced write.
    pub fn resume(&mut self, id: OperationId) {
        let paused = self
            .active
            .as_ref()
            .is_some_and(|slot| slot.id == id && !slot.awaiting_ack);
        if paused {
            self.continue_head();
        }
    }

    /// Fail the active operation if `submission` is still awaiting its ack.
    pub fn on_timeout(&mut self, id: OperationId, submission: u64) {
        let current = self.active.as_ref().is_some_and(|slot| {
            slot.id == id && slot.awaiting_ack && slot.submission == submission
        });
        if !current {
            return;
        }
        tracing::warn!(%id, "no ack before deadline, failing operation");
        self.finish_head(Err(OperationError::Timeout));
    }

    /// Release the hold placed by the last finished operation and start the
    /// next head, if any.
    pub fn advance(&mut self) {
        self.held = false;
        self.activate_next();
    }

    // ── Owner side ────────────────────────────────────────────────────────────

    /// Completions produced since the last call, in completion order.
    pub fn take_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.outbox)
    }

    /// Pause requested between two chunks of the active write.
    pub fn take_pacing(&mut self) -> Option<(OperationId, Duration)> {
        self.pacing.take()
    }

    /// The submission currently awaiting an ack, if any.
    pub fn awaiting_ack(&self) -> Option<(OperationId, u64)> {
        self.active
            .as_ref()
            .filter(|slot| slot.awaiting_ack)
            .map(|slot| (slot.id, slot.submission))
    }

    pub fn status(&self) -> QueueStatus {
        let active = self.active.as_ref().zip(self.queue.front()).map(|(slot, head)| {
            let (bytes_sent, total_len) = match &head.op {
                Operation::Write(w) => (Some(w.bytes_sent()), Some(w.total_len())),
                _ => (None, None),
            };
            ActiveStatus {
                id: slot.id,
                kind: head.kind(),
                awaiting_ack: slot.awaiting_ack,
                bytes_sent,
                total_len,
            }
        });
        QueueStatus {
            connection: self.state,
            queued: self.queue.len() - usize::from(active.is_some()),
            active,
            completed: self.completed,
            failed: self.failed,
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Activate the head unless something is active or the queue is held.
    /// A head that fails to resolve or is rejected fails in place and holds
    /// the queue like any other finished operation.
    fn activate_next(&mut self) {
        while self.active.is_none() && !self.held {
            let Some(head) = self.queue.front() else {
                return;
            };
            let id = head.id;

            let endpoint = match head.op.address() {
                Some(address) => match self.channel.resolve(&address) {
                    Some(endpoint) => Some(endpoint),
                    None => {
                        tracing::warn!(%id, %address, "endpoint did not resolve");
                        self.finish_head(Err(OperationError::AddressResolutionFailed(address)));
                        continue;
                    }
                },
                None => None,
            };

            self.active = Some(ActiveSlot {
                id,
                endpoint,
                awaiting_ack: false,
                submission: 0,
            });
            tracing::debug!(%id, kind = ?head.kind(), "operation active");

            if let Err(rejected) = self.submit_head() {
                tracing::warn!(%id, reason = %rejected, "submission rejected");
                self.finish_head(Err(OperationError::SubmissionRejected(rejected.reason)));
            }
        }
    }

    fn continue_head(&mut self) {
        if let Err(rejected) = self.submit_head() {
            let id = self.active.as_ref().map(|slot| slot.id);
            tracing::warn!(id = ?id, reason = %rejected, "submission rejected mid-write");
            self.finish_head(Err(OperationError::SubmissionRejected(rejected.reason)));
        }
    }

    /// Hand the head's next unit of work to the channel.
    fn submit_head(&mut self) -> Result<(), Rejected> {
        let (Some(head), Some(slot)) = (self.queue.front(), self.active.as_mut()) else {
            return Ok(());
        };
        let id = head.id;

        match (&head.op, slot.endpoint.as_ref()) {
            (Operation::Write(w), Some(endpoint)) => {
                let Some(chunk) = w.next_chunk() else {
                    return Ok(());
                };
                tracing::debug!(
                    %id,
                    offset = w.bytes_sent(),
                    len = chunk.len(),
                    "submitting chunk"
                );
                self.channel.submit_chunk(id, endpoint, chunk.clone(), w.mode)?;
            }
            (Operation::Read { .. }, Some(endpoint)) => self.channel.submit_read(id, endpoint)?,
            (Operation::SignalRead, _) => self.channel.submit_signal_read(id)?,
            (Operation::MtuRequest { mtu }, _) => self.channel.submit_mtu_request(id, *mtu)?,
            (Operation::Write(_) | Operation::Read { .. }, None) => {
                return Err(Rejected::new("endpoint not resolved"));
            }
        }

        self.submissions += 1;
        slot.awaiting_ack = true;
        slot.submission = self.submissions;
        Ok(())
    }

    fn finish_head(&mut self, result: OperationResult) {
        self.active = None;
        self.held = true;
        let Some(head) = self.queue.pop_front() else {
            return;
        };
        match &result {
            Ok(_) => {
                self.completed += 1;
                tracing::debug!(id = %head.id, kind = ?head.kind(), "operation complete");
            }
            Err(e) => {
                self.failed += 1;
                tracing::debug!(id = %head.id, kind = ?head.kind(), error = %e, "operation failed");
            }
        }
        self.outbox.push(head.finish(result));
    }
}
