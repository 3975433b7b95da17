//! Scheduled device events and the operations a schedule may name.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::SimError;

use super::message::Message;

/// Operations that can be placed on a device schedule.
///
/// Each device kind declares which of these it supports; schedules naming
/// an unsupported operation are rejected when the device is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Enter operation and start drawing power.
    TurnOn,
    /// Leave operation and release all power.
    TurnOff,
}

impl Operation {
    /// Schedule tag of the operation.
    pub fn name(self) -> &'static str {
        match self {
            Operation::TurnOn => "turn_on",
            Operation::TurnOff => "turn_off",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turn_on" => Ok(Operation::TurnOn),
            "turn_off" => Ok(Operation::TurnOff),
            other => Err(SimError::UnknownOperation(other.to_string())),
        }
    }
}

/// Per-device event identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// What an event does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Read a message received earlier (deferred by the receiver's latency).
    ReadMessage(Message),
    /// Run a scheduled operation.
    Run(Operation),
}

/// A scheduled callback.
///
/// Equality and hashing use only the [`EventId`], so re-adding an event with
/// the same id to a device queue supersedes the pending one.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    action: Action,
}

impl Event {
    /// Creates an event.
    pub fn new(id: EventId, action: Action) -> Self {
        Self { id, action }
    }

    /// Event identity.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The action to run.
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Consumes the event, returning its action.
    pub fn into_action(self) -> Action {
        self.action
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::queue::PriorityQueue;

    #[test]
    fn operation_names_parse() {
        assert_eq!("turn_on".parse::<Operation>().ok(), Some(Operation::TurnOn));
        assert_eq!("turn_off".parse::<Operation>().ok(), Some(Operation::TurnOff));
        assert!(matches!(
            "explode".parse::<Operation>(),
            Err(SimError::UnknownOperation(name)) if name == "explode"
        ));
    }

    #[test]
    fn same_id_replaces_in_queue() {
        let mut queue = PriorityQueue::new();
        queue.insert(Event::new(EventId(1), Action::Run(Operation::TurnOn)), 10.0);
        queue.insert(Event::new(EventId(1), Action::Run(Operation::TurnOff)), 5.0);

        assert_eq!(queue.len(), 1);
        let (event, time) = queue.pop().expect("one event queued");
        assert_eq!(time, 5.0);
        assert_eq!(event.action(), &Action::Run(Operation::TurnOff));
    }
}
