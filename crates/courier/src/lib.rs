//! courier: single-peer operation queue with chunked writes.
//!
//! One [`Peripheral`] worker per connected peer serializes every operation
//! against a [`ChannelAdapter`] that allows a single outstanding request.
//! Writes are split into chunks and driven one ack at a time; completions
//! are delivered exactly once through a [`CompletionSink`].

pub mod channel;
pub mod dispatch;
pub mod mock;
pub mod operation;
pub mod peripheral;
pub mod queue;

pub use channel::{ack_channel, Ack, AckReceiver, AckSender, ChannelAdapter, ChannelEvent, Rejected};
pub use dispatch::{CompletionSink, TaskDispatcher};
pub use operation::{
    Callback, Completion, Operation, OperationId, OperationKind, OperationResult, Response,
};
pub use peripheral::{CourierError, Peripheral, PeripheralHandle};
pub use queue::{ActiveStatus, ConnectionState, OperationQueue, QueueStatus};

pub use courier_core::{EndpointAddress, OperationError, WriteMode};
