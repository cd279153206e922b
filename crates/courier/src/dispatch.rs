//! Completion dispatch: runs callbacks off the worker and off the channel.
//!
//! The worker hands every finished operation to a [`CompletionSink`] once
//! the queue has settled. The sink decides where callbacks run; the
//! default [`TaskDispatcher`] runs them in order on a dedicated task.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::operation::Completion;

/// Receives each completion exactly once, in completion order.
///
/// The queue does not start the next operation until the last delivered
/// completion has been run or dropped. A sink that holds completions
/// indefinitely stalls the queue.
pub trait CompletionSink: Send + 'static {
    fn deliver(&self, completion: Completion);
}

/// Hosts that run their own loop can take completions off a channel and
/// call [`Completion::complete`] themselves.
impl CompletionSink for mpsc::UnboundedSender<Completion> {
    fn deliver(&self, completion: Completion) {
        if let Err(mpsc::error::SendError(completion)) = self.send(completion) {
            tracing::warn!(id = %completion.id, "completion receiver dropped, callback not run");
        }
    }
}

/// Runs callbacks on a dedicated tokio task.
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    tx: mpsc::UnboundedSender<Completion>,
}

impl TaskDispatcher {
    /// Spawn the callback task. It exits once every dispatcher clone is
    /// dropped and the backlog has been delivered.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let task = tokio::spawn(async move {
            while let Some(completion) = rx.recv().await {
                let id = completion.id;
                if catch_unwind(AssertUnwindSafe(|| completion.complete())).is_err() {
                    tracing::warn!(%id, "completion callback panicked");
                }
            }
            tracing::debug!("dispatcher drained, exiting");
        });
        (Self { tx }, task)
    }
}

impl CompletionSink for TaskDispatcher {
    fn deliver(&self, completion: Completion) {
        self.tx.deliver(completion);
    }
}
