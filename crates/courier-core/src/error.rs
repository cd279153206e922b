//! Error kinds surfaced to callers.

use crate::address::EndpointAddress;

/// Caller errors detected before an operation is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("maximum chunk size must be positive")]
    ZeroChunkSize,
}

/// Terminal failure of a single operation. Delivered through that
/// operation's own completion callback; never retried by the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The endpoint does not exist on the current connection.
    #[error("endpoint {0} not found on the current connection")]
    AddressResolutionFailed(EndpointAddress),

    /// The channel refused to accept the chunk or request.
    #[error("channel rejected submission: {0}")]
    SubmissionRejected(String),

    /// The peer or the channel reported failure for the in-flight request.
    #[error("channel reported failure (status {status})")]
    AckError { status: i32 },

    /// The connection dropped while the operation was queued or active.
    #[error("peer disconnected")]
    Disconnected,

    /// The operation was submitted while no connection was established.
    #[error("peer not connected")]
    NotConnected,

    /// No acknowledgment arrived before the configured deadline.
    #[error("operation timed out waiting for acknowledgment")]
    Timeout,
}
