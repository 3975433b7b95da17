//! Kernel error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::sim::event::Operation;
use crate::sim::queue::QueueError;
use crate::sim::types::DeviceId;

/// Errors raised by devices and the supervisor.
///
/// `OrderingViolation` and `UnregisteredDevice` mean a scheduler invariant
/// broke and the run cannot be trusted; drivers must not continue after
/// them.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid argument on {device_id}: {reason}")]
    InvalidArgument { device_id: DeviceId, reason: String },

    #[error(
        "ordering violation on {device_id}: event at {event_time}s is behind local time {local_time}s"
    )]
    OrderingViolation {
        device_id: DeviceId,
        event_time: f64,
        local_time: f64,
    },

    #[error("ordering violation: {device_id} popped at {time}s but never registered")]
    UnregisteredDevice { device_id: DeviceId, time: f64 },

    #[error("{device_id} is not connected to {peer_id}")]
    UnknownPeer { device_id: DeviceId, peer_id: DeviceId },

    #[error("no device {0} in the simulation")]
    UnknownDevice(DeviceId),

    #[error("device {0} is already registered")]
    DuplicateDevice(DeviceId),

    #[error("unknown message kind {0:?}")]
    UnknownMessageKind(String),

    #[error("unknown schedule operation {0:?}")]
    UnknownOperation(String),

    #[error("{device_id} ({device_type}) does not support operation {operation}")]
    UnsupportedOperation {
        device_id: DeviceId,
        device_type: &'static str,
        operation: Operation,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SimError {
    /// Shorthand for [`SimError::InvalidArgument`].
    pub fn invalid_argument(device_id: &DeviceId, reason: impl Into<String>) -> Self {
        SimError::InvalidArgument {
            device_id: device_id.clone(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for scheduler invariant violations.
    pub fn is_ordering_violation(&self) -> bool {
        matches!(
            self,
            SimError::OrderingViolation { .. } | SimError::UnregisteredDevice { .. }
        )
    }
}
