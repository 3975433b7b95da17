//! Messages exchanged between devices.
//!
//! Inside a run messages only travel as typed [`Message`] values, so the
//! kind is always valid. Kinds coming from outside the process (numeric
//! codes or names) go through `MessageKind::try_from(u8)` or
//! `str::parse`, which are the only places
//! [`SimError::UnknownMessageKind`] is raised.

use std::fmt;
use std::str::FromStr;

use crate::error::SimError;

use super::types::DeviceId;

/// The five message kinds of the protocol.
///
/// Sign conventions of [`Message::value`] per kind:
/// - `Register`: `> 0` registers the sender, `<= 0` unregisters it.
/// - `Power`: new flow from the sender's perspective, positive when the
///   sender is receiving.
/// - `Price`: the sender's local price.
/// - `Request` / `Allocate`: positive when the sender offers to provide,
///   negative when it wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Register,
    Power,
    Price,
    Request,
    Allocate,
}

impl MessageKind {
    /// All kinds in protocol order.
    pub const ALL: [MessageKind; 5] = [
        MessageKind::Register,
        MessageKind::Power,
        MessageKind::Price,
        MessageKind::Request,
        MessageKind::Allocate,
    ];

    /// Numeric protocol code (1 to 5).
    pub fn code(self) -> u8 {
        match self {
            MessageKind::Register => 1,
            MessageKind::Power => 2,
            MessageKind::Price => 3,
            MessageKind::Request => 4,
            MessageKind::Allocate => 5,
        }
    }

    /// Upper-case protocol name.
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Register => "REGISTER",
            MessageKind::Power => "POWER",
            MessageKind::Price => "PRICE",
            MessageKind::Request => "REQUEST",
            MessageKind::Allocate => "ALLOCATE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = SimError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| SimError::UnknownMessageKind(code.to_string()))
    }
}

impl FromStr for MessageKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| SimError::UnknownMessageKind(s.to_string()))
    }
}

/// An immutable message: send time, sender, kind and signed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    timestamp: f64,
    sender_id: DeviceId,
    kind: MessageKind,
    value: f64,
}

impl Message {
    /// Creates a message stamped with the sender's local time in seconds.
    pub fn new(timestamp: f64, sender_id: DeviceId, kind: MessageKind, value: f64) -> Self {
        Self {
            timestamp,
            sender_id,
            kind,
            value,
        }
    }

    /// Time of send, in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Identifier of the sending device.
    pub fn sender_id(&self) -> &DeviceId {
        &self.sender_id
    }

    /// Message kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Signed payload.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} at {:.3}s value={}",
            self.kind, self.sender_id, self.timestamp, self.value
        )
    }
}

/// A message addressed to a device, waiting for delivery by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: DeviceId,
    pub message: Message,
}
