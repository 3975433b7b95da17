//! Common types and traits for device variants.

use std::collections::BTreeSet;

use crate::error::SimError;
use crate::sim::event::Operation;
use crate::sim::message::Envelope;
use crate::sim::queue::PriorityQueue;
use crate::sim::types::DeviceId;

use super::core::DeviceCore;

/// Receiver of "my next event is at `time`" reports.
///
/// The supervisor's global queue implements this; a device reports through
/// it every time its own queue changes.
pub trait EventRegistrar {
    fn register_event(&mut self, device_id: &DeviceId, time: f64);
}

impl EventRegistrar for PriorityQueue<DeviceId> {
    fn register_event(&mut self, device_id: &DeviceId, time: f64) {
        self.insert(device_id.clone(), time);
    }
}

/// What a device may touch while it runs: the set of device ids known to
/// the supervisor, the global event queue, and an outbox of messages the
/// supervisor delivers once the device has drained its events.
pub struct Context<'a> {
    directory: &'a BTreeSet<DeviceId>,
    events: &'a mut PriorityQueue<DeviceId>,
    outbox: &'a mut Vec<Envelope>,
}

impl<'a> Context<'a> {
    pub fn new(
        directory: &'a BTreeSet<DeviceId>,
        events: &'a mut PriorityQueue<DeviceId>,
        outbox: &'a mut Vec<Envelope>,
    ) -> Self {
        Self {
            directory,
            events,
            outbox,
        }
    }

    /// Returns `true` if the supervisor registry holds `device_id`.
    pub fn knows(&self, device_id: &DeviceId) -> bool {
        self.directory.contains(device_id)
    }

    /// Queues a message for delivery.
    pub fn post(&mut self, envelope: Envelope) {
        self.outbox.push(envelope);
    }
}

impl EventRegistrar for Context<'_> {
    fn register_event(&mut self, device_id: &DeviceId, time: f64) {
        self.events.register_event(device_id, time);
    }
}

/// The capability interface every device variant implements.
///
/// The base agent ([`Device`](super::Device)) owns the queue, clock and
/// energy accounting and calls these hooks. Message hooks only ever run for
/// senders in the device's connected set.
pub trait DeviceBehavior {
    /// Human-readable kind name (`"grid_controller"`, `"light"`, ...).
    fn device_type(&self) -> &'static str;

    /// A POWER message arrived. `value` is the new flow from the sender's
    /// perspective: positive when the sender receives.
    fn process_power_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        value: f64,
    ) -> Result<(), SimError>;

    /// A PRICE message arrived.
    fn process_price_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        price: f64,
    ) -> Result<(), SimError>;

    /// A REQUEST message arrived: positive when the sender offers to
    /// provide, negative when it wants to receive.
    fn process_request_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError>;

    /// An ALLOCATE message arrived, same sign convention as REQUEST.
    fn process_allocate_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError>;

    /// Variant statistics reported when the device finishes.
    fn device_specific_calcs(&self, _core: &DeviceCore) {}

    /// Whether `operation` may appear on this device's schedule.
    fn supports(&self, _operation: Operation) -> bool {
        false
    }

    /// Runs a scheduled operation.
    fn run_operation(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        operation: Operation,
    ) -> Result<(), SimError> {
        Err(SimError::UnsupportedOperation {
            device_id: core.id().clone(),
            device_type: self.device_type(),
            operation,
        })
    }

    /// Called after a REGISTER message added `peer` to the connected set.
    fn on_peer_registered(
        &mut self,
        _core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        _peer: &DeviceId,
    ) -> Result<(), SimError> {
        Ok(())
    }

    /// Power this device would draw at `price` while operating, for demand
    /// curves. `None` for devices that do not consume.
    fn demand_at_price(&self, _price: f64) -> Option<f64> {
        None
    }
}
