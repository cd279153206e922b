//! Peripheral worker: the single serialization point for one peer.
//!
//! The worker task owns the operation queue and the channel adapter.
//! Callers reach it through a [`PeripheralHandle`]; the adapter's
//! notification path reaches it through an [`AckSender`]. Both feed
//! unbounded channels, so neither side ever blocks on the other.
//!
//! [`AckSender`]: crate::channel::AckSender

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use courier_core::config::QueueConfig;
use courier_core::{ChunkError, EndpointAddress, OperationError, WriteMode};

use crate::channel::{AckReceiver, ChannelAdapter};
use crate::dispatch::CompletionSink;
use crate::operation::{Callback, Operation, OperationId, OperationResult};
use crate::queue::{OperationQueue, QueueStatus};

/// Synchronous errors returned to the caller before anything is queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CourierError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("peripheral worker has shut down")]
    WorkerClosed,
}

enum Command {
    Submit { op: Operation, callback: Callback },
    Connecting,
    Connected,
    Disconnected,
    Status(oneshot::Sender<QueueStatus>),
}

/// Deadline armed for one submission.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    id: OperationId,
    submission: u64,
    at: Instant,
}

pub struct Peripheral<C: ChannelAdapter, S: CompletionSink> {
    queue: OperationQueue<C>,
    sink: S,
    commands: mpsc::UnboundedReceiver<Command>,
    events: AckReceiver,
    shutdown: broadcast::Receiver<()>,
    operation_timeout: Option<Duration>,
    deadline: Option<Deadline>,
    pacing: Option<(OperationId, Instant)>,
    /// Fires once the last delivered callback has run.
    delivery: Option<oneshot::Receiver<()>>,
}

impl<C: ChannelAdapter, S: CompletionSink> Peripheral<C, S> {
    pub fn new(
        channel: C,
        events: AckReceiver,
        sink: S,
        config: &QueueConfig,
    ) -> (Self, PeripheralHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown) = broadcast::channel(1);
        let worker = Self {
            queue: OperationQueue::new(channel, config.chunk_interval()),
            sink,
            commands,
            events,
            shutdown,
            operation_timeout: config.operation_timeout(),
            deadline: None,
            pacing: None,
            delivery: None,
        };
        let handle = PeripheralHandle {
            commands: command_tx,
            shutdown: shutdown_tx,
            default_max_chunk_size: config.default_max_chunk_size,
        };
        (worker, handle)
    }

    /// Build the worker and run it on the current tokio runtime.
    pub fn spawn(
        channel: C,
        events: AckReceiver,
        sink: S,
        config: &QueueConfig,
    ) -> (PeripheralHandle, JoinHandle<anyhow::Result<()>>) {
        let (worker, handle) = Self::new(channel, events, sink, config);
        (handle, tokio::spawn(worker.run()))
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            let deadline_at = self.deadline.map(|d| d.at);
            let pacing_at = self.pacing.map(|(_, at)| at);

            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("peripheral worker shutting down");
                    self.close();
                    return Ok(());
                }

                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        tracing::info!("all handles dropped, peripheral worker exiting");
                        self.close();
                        return Ok(());
                    };
                    self.handle_command(cmd);
                }

                Some(event) = self.events.recv() => {
                    self.queue.on_event(event);
                }

                _ = sleep_until(deadline_at), if deadline_at.is_some() => {
                    if let Some(d) = self.deadline.take() {
                        self.queue.on_timeout(d.id, d.submission);
                    }
                }

                _ = sleep_until(pacing_at), if pacing_at.is_some() => {
                    if let Some((id, _)) = self.pacing.take() {
                        self.queue.resume(id);
                    }
                }

                _ = fired(&mut self.delivery), if self.delivery.is_some() => {
                    self.delivery = None;
                }
            }

            self.settle();
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { op, callback } => {
                self.queue.enqueue(op, callback);
            }
            Command::Connecting => self.queue.on_connecting(),
            Command::Connected => self.queue.on_connected(),
            Command::Disconnected => self.queue.on_disconnected(),
            Command::Status(reply) => {
                let _ = reply.send(self.queue.status());
            }
        }
    }

    /// Fail everything still pending, including submissions that were sent
    /// but not yet read from the command channel.
    fn close(&mut self) {
        self.commands.close();
        self.queue.drain(OperationError::Disconnected);
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Submit { op, callback } => {
                    self.queue.refuse(op, callback, OperationError::Disconnected);
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.queue.status());
                }
                Command::Connecting | Command::Connected | Command::Disconnected => {}
            }
        }
        self.settle();
    }

    /// Hand completions to the sink and re-arm timers once the queue has
    /// finished mutating. The queue only advances to the next operation
    /// after the previous batch of callbacks has run.
    fn settle(&mut self) {
        self.deliver_completions();
        if self.delivery.is_none() {
            self.queue.advance();
            self.deliver_completions();
        }

        if let Some((id, delay)) = self.queue.take_pacing() {
            self.pacing = Some((id, Instant::now() + delay));
        }

        self.deadline = match (self.queue.awaiting_ack(), self.operation_timeout) {
            (Some((id, submission)), Some(timeout)) => match self.deadline {
                Some(d) if d.id == id && d.submission == submission => Some(d),
                _ => Some(Deadline {
                    id,
                    submission,
                    at: Instant::now() + timeout,
                }),
            },
            _ => None,
        };
    }

    fn deliver_completions(&mut self) {
        let mut completions = self.queue.take_completions();
        if let Some(last) = completions.last_mut() {
            self.delivery = Some(last.on_fired());
        }
        for completion in completions {
            self.sink.deliver(completion);
        }
    }
}

async fn fired(delivery: &mut Option<oneshot::Receiver<()>>) {
    match delivery {
        Some(rx) => {
            let _ = rx.await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Cloneable caller-side handle. Every method returns immediately;
/// outcomes arrive through the supplied callback.
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: broadcast::Sender<()>,
    /// Chunk size for writes that do not name one.
    default_max_chunk_size: usize,
}

impl PeripheralHandle {
    /// Queue a chunked write. A zero `max_chunk_size` is rejected here and
    /// nothing is queued.
    pub fn write<F>(
        &self,
        address: EndpointAddress,
        payload: impl Into<Bytes>,
        max_chunk_size: usize,
        mode: WriteMode,
        callback: F,
    ) -> Result<(), CourierError>
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        let op = Operation::write(address, payload.into(), max_chunk_size, mode)?;
        self.submit(op, Box::new(callback))
    }

    /// Queue a write chunked at the configured `default_max_chunk_size`.
    pub fn write_default<F>(
        &self,
        address: EndpointAddress,
        payload: impl Into<Bytes>,
        mode: WriteMode,
        callback: F,
    ) -> Result<(), CourierError>
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        let max_chunk_size = self.default_max_chunk_size;
        self.write(address, payload, max_chunk_size, mode, callback)
    }

    /// Queue a write that pauses `chunk_interval` between its chunks,
    /// overriding the queue-wide interval for this write only. A zero
    /// interval sends chunks back to back.
    pub fn write_paced<F>(
        &self,
        address: EndpointAddress,
        payload: impl Into<Bytes>,
        max_chunk_size: usize,
        mode: WriteMode,
        chunk_interval: Duration,
        callback: F,
    ) -> Result<(), CourierError>
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        let op = Operation::write(address, payload.into(), max_chunk_size, mode)?
            .with_chunk_interval(chunk_interval);
        self.submit(op, Box::new(callback))
    }

    pub fn read_signal_strength<F>(&self, callback: F) -> Result<(), CourierError>
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        self.submit(Operation::SignalRead, Box::new(callback))
    }

    pub fn read<F>(&self, address: EndpointAddress, callback: F) -> Result<(), CourierError>
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        self.submit(Operation::Read { address }, Box::new(callback))
    }

    pub fn request_mtu<F>(&self, mtu: u16, callback: F) -> Result<(), CourierError>
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        self.submit(Operation::MtuRequest { mtu }, Box::new(callback))
    }

    /// Like [`write`](Self::write), resolved through a oneshot.
    pub async fn write_async(
        &self,
        address: EndpointAddress,
        payload: impl Into<Bytes>,
        max_chunk_size: usize,
        mode: WriteMode,
    ) -> Result<OperationResult, CourierError> {
        let (tx, rx) = oneshot::channel();
        self.write(address, payload, max_chunk_size, mode, move |r| {
            let _ = tx.send(r);
        })?;
        rx.await.map_err(|_| CourierError::WorkerClosed)
    }

    pub async fn read_signal_strength_async(&self) -> Result<OperationResult, CourierError> {
        let (tx, rx) = oneshot::channel();
        self.read_signal_strength(move |r| {
            let _ = tx.send(r);
        })?;
        rx.await.map_err(|_| CourierError::WorkerClosed)
    }

    pub fn on_connecting(&self) -> Result<(), CourierError> {
        self.send(Command::Connecting)
    }

    pub fn on_connected(&self) -> Result<(), CourierError> {
        self.send(Command::Connected)
    }

    /// Fails the active operation and every queued one with `Disconnected`.
    pub fn on_disconnected(&self) -> Result<(), CourierError> {
        self.send(Command::Disconnected)
    }

    pub async fn status(&self) -> Result<QueueStatus, CourierError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx))?;
        rx.await.map_err(|_| CourierError::WorkerClosed)
    }

    /// Stop the worker. Pending operations fail with `Disconnected`.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    fn submit(&self, op: Operation, callback: Callback) -> Result<(), CourierError> {
        self.send(Command::Submit { op, callback })
    }

    fn send(&self, cmd: Command) -> Result<(), CourierError> {
        self.commands
            .send(cmd)
            .map_err(|_| CourierError::WorkerClosed)
    }
}
