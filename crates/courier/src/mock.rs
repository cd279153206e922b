//! Scriptable in-memory channel for tests and host simulations.
//!
//! Records every accepted submission in order and tracks how many are
//! outstanding. Clones share state, so a test can keep one clone while the
//! worker owns another.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::Notify;

use courier_core::{EndpointAddress, WriteMode};

use crate::channel::{Ack, AckSender, ChannelAdapter, ChannelEvent, Rejected};
use crate::operation::OperationId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Chunk {
        id: OperationId,
        address: EndpointAddress,
        data: Bytes,
        mode: WriteMode,
    },
    SignalRead {
        id: OperationId,
    },
    Read {
        id: OperationId,
        address: EndpointAddress,
    },
    MtuRequest {
        id: OperationId,
        mtu: u16,
    },
}

impl Submission {
    pub fn id(&self) -> OperationId {
        match self {
            Submission::Chunk { id, .. }
            | Submission::SignalRead { id }
            | Submission::Read { id, .. }
            | Submission::MtuRequest { id, .. } => *id,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    submissions: Vec<Submission>,
    unresolvable: HashSet<EndpointAddress>,
    reject: VecDeque<String>,
    outstanding: usize,
    max_outstanding: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    submitted: Arc<Notify>,
    acks: Option<AckSender>,
}

impl MockChannel {
    /// A channel whose acks are fed to the queue by hand.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that also posts every [`MockChannel::ack`] to a worker.
    pub fn with_acks(acks: AckSender) -> Self {
        Self {
            acks: Some(acks),
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn make_unresolvable(&self, address: EndpointAddress) {
        self.state().unresolvable.insert(address);
    }

    /// Reject the next submission with `reason`.
    pub fn reject_next(&self, reason: &str) {
        self.state().reject.push_back(reason.to_string());
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Lengths of every submitted write chunk, in order.
    pub fn chunk_lengths(&self) -> Vec<usize> {
        self.state()
            .submissions
            .iter()
            .filter_map(|s| match s {
                Submission::Chunk { data, .. } => Some(data.len()),
                _ => None,
            })
            .collect()
    }

    /// Highest number of submissions ever awaiting an ack at once.
    pub fn max_outstanding(&self) -> usize {
        self.state().max_outstanding
    }

    /// Answer the most recent submission. The event is posted to the worker
    /// when one is attached and returned either way.
    pub fn ack(&self, ack: Ack) -> ChannelEvent {
        let id = {
            let mut state = self.state();
            state.outstanding = state.outstanding.saturating_sub(1);
            state
                .submissions
                .last()
                .map(Submission::id)
                .unwrap_or(OperationId(0))
        };
        if let Some(acks) = &self.acks {
            acks.send(id, ack.clone());
        }
        ChannelEvent { id, ack }
    }

    /// Wait until at least `count` submissions have been recorded.
    pub async fn wait_for_submissions(&self, count: usize) {
        loop {
            let notified = self.submitted.notified();
            if self.state().submissions.len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn record(&mut self, submission: Submission) -> Result<(), Rejected> {
        {
            let mut state = self.state();
            if let Some(reason) = state.reject.pop_front() {
                return Err(Rejected::new(reason));
            }
            state.submissions.push(submission);
            state.outstanding += 1;
            state.max_outstanding = state.max_outstanding.max(state.outstanding);
        }
        self.submitted.notify_waiters();
        Ok(())
    }
}

impl ChannelAdapter for MockChannel {
    type Endpoint = EndpointAddress;

    fn resolve(&mut self, address: &EndpointAddress) -> Option<EndpointAddress> {
        (!self.state().unresolvable.contains(address)).then_some(*address)
    }

    fn submit_chunk(
        &mut self,
        id: OperationId,
        endpoint: &EndpointAddress,
        chunk: Bytes,
        mode: WriteMode,
    ) -> Result<(), Rejected> {
        self.record(Submission::Chunk {
            id,
            address: *endpoint,
            data: chunk,
            mode,
        })
    }

    fn submit_signal_read(&mut self, id: OperationId) -> Result<(), Rejected> {
        self.record(Submission::SignalRead { id })
    }

    fn submit_read(&mut self, id: OperationId, endpoint: &EndpointAddress) -> Result<(), Rejected> {
        self.record(Submission::Read {
            id,
            address: *endpoint,
        })
    }

    fn submit_mtu_request(&mut self, id: OperationId, mtu: u16) -> Result<(), Rejected> {
        self.record(Submission::MtuRequest { id, mtu })
    }
}
