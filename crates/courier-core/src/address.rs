//! Endpoint addressing on the remote peer.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A (service, characteristic) pair naming one target on the peer.
///
/// Addresses are plain identifiers. They are resolved against the live
/// connection each time an operation becomes active, so a handle from a
/// previous connection is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl EndpointAddress {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// How a chunk is written to a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Acknowledged write. The peer confirms every chunk.
    #[default]
    WithResponse,
    /// Unacknowledged write. The adapter reports completion once the chunk
    /// has been handed to the radio.
    WithoutResponse,
}
