//! courier-core: shared types for the peripheral operation queue:
//! endpoint addressing, write modes, payload chunking, error kinds and
//! configuration. The `courier` crate depends on this one.

pub mod address;
pub mod chunk;
pub mod config;
pub mod error;

pub use address::{EndpointAddress, WriteMode};
pub use chunk::split;
pub use config::CourierConfig;
pub use error::{ChunkError, OperationError};
