//! State shared by every device: clock, event queue, peers and energy
//! accounting.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::SimError;
use crate::sim::event::{Action, Event, EventId};
use crate::sim::message::{Envelope, Message, MessageKind};
use crate::sim::queue::PriorityQueue;
use crate::sim::types::{DeviceId, SECONDS_PER_HOUR};
use crate::telemetry::Telemetry;

use super::types::{Context, EventRegistrar};

/// Levels closer to zero than this are rounding residue (W).
const FLOW_RESIDUE_W: f64 = 1e-9;

/// Base agent state, handed to [`DeviceBehavior`](super::DeviceBehavior)
/// hooks so variants can change power levels and send messages.
///
/// Power levels are non-negative and may flow both ways at once. Energy is
/// integrated separately per direction: each direction remembers when its
/// own level last changed.
#[derive(Debug)]
pub struct DeviceCore {
    id: DeviceId,
    device_type: &'static str,
    time: f64,
    latency: f64,
    connected: BTreeSet<DeviceId>,
    power_in: f64,
    power_out: f64,
    energy_in_wh: f64,
    energy_out_wh: f64,
    last_power_in_change: f64,
    last_power_out_change: f64,
    queue: PriorityQueue<Event>,
    next_event_id: u64,
    telemetry: Telemetry,
}

impl DeviceCore {
    pub(crate) fn new(
        id: DeviceId,
        device_type: &'static str,
        time: f64,
        latency: f64,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            id,
            device_type,
            time,
            latency,
            connected: BTreeSet::new(),
            power_in: 0.0,
            power_out: 0.0,
            energy_in_wh: 0.0,
            energy_out_wh: 0.0,
            last_power_in_change: time,
            last_power_out_change: time,
            queue: PriorityQueue::new(),
            next_event_id: 0,
            telemetry,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn device_type(&self) -> &'static str {
        self.device_type
    }

    /// Local time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Delay before this device reads a received message, in seconds.
    pub fn latency(&self) -> f64 {
        self.latency
    }

    /// Watts flowing into the device.
    pub fn power_in(&self) -> f64 {
        self.power_in
    }

    /// Watts flowing out of the device.
    pub fn power_out(&self) -> f64 {
        self.power_out
    }

    /// Energy received so far, in watt-hours.
    pub fn energy_in(&self) -> f64 {
        self.energy_in_wh
    }

    /// Energy delivered so far, in watt-hours.
    pub fn energy_out(&self) -> f64 {
        self.energy_out_wh
    }

    pub fn is_connected(&self, peer_id: &DeviceId) -> bool {
        self.connected.contains(peer_id)
    }

    /// Connected peers in identifier order.
    pub fn connected(&self) -> impl Iterator<Item = &DeviceId> {
        self.connected.iter()
    }

    /// Connected peers whose identifier carries `prefix`.
    pub fn connected_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a DeviceId> + 'a {
        self.connected.iter().filter(move |id| id.has_prefix(prefix))
    }

    /// Sets the absolute inbound level, booking energy at the previous level
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidArgument`] if `level` is negative or not
    /// finite.
    pub fn set_power_in(&mut self, level: f64) -> Result<(), SimError> {
        self.check_level(level, "power in")?;
        self.integrate_power_in();
        self.power_in = level;
        Ok(())
    }

    /// Sets the absolute outbound level, booking energy at the previous
    /// level first.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidArgument`] if `level` is negative or not
    /// finite.
    pub fn set_power_out(&mut self, level: f64) -> Result<(), SimError> {
        self.check_level(level, "power out")?;
        self.integrate_power_out();
        self.power_out = level;
        Ok(())
    }

    /// Applies a change on one link from `previous` to `new` signed flow
    /// (positive into this device, negative out of it).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidArgument`] if `previous` removes more than
    /// the device currently carries in either direction. Levels are left
    /// unchanged in that case.
    pub fn recalc_power(&mut self, previous: f64, new: f64) -> Result<(), SimError> {
        let (prev_in, prev_out) = split_flow(previous);
        let (new_in, new_out) = split_flow(new);
        let power_in = settle(self.power_in - prev_in + new_in);
        let power_out = settle(self.power_out - prev_out + new_out);
        if power_in < 0.0 || power_out < 0.0 {
            return Err(SimError::invalid_argument(
                &self.id,
                format!(
                    "link change {previous} -> {new} leaves power in {power_in}, out {power_out}"
                ),
            ));
        }

        self.integrate_power_in();
        self.integrate_power_out();
        self.power_in = power_in;
        self.power_out = power_out;
        Ok(())
    }

    /// Books energy at both current levels up to local time.
    pub(crate) fn integrate_energy(&mut self) {
        self.integrate_power_in();
        self.integrate_power_out();
    }

    fn integrate_power_in(&mut self) {
        let elapsed = self.time - self.last_power_in_change;
        if elapsed > 0.0 {
            self.energy_in_wh += self.power_in * elapsed / SECONDS_PER_HOUR;
        }
        self.last_power_in_change = self.time;
    }

    fn integrate_power_out(&mut self) {
        let elapsed = self.time - self.last_power_out_change;
        if elapsed > 0.0 {
            self.energy_out_wh += self.power_out * elapsed / SECONDS_PER_HOUR;
        }
        self.last_power_out_change = self.time;
    }

    fn check_level(&self, level: f64, what: &str) -> Result<(), SimError> {
        if level >= 0.0 && level.is_finite() {
            Ok(())
        } else {
            Err(SimError::invalid_argument(
                &self.id,
                format!("{what} level must be non-negative, got {level}"),
            ))
        }
    }

    /// Returns a fresh identity for an event on this device's queue.
    pub fn next_event_id(&mut self) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;
        id
    }

    /// Queues `event` at `time` and reports the earliest pending time.
    ///
    /// An event with the same id already queued is superseded.
    pub fn add_event(&mut self, event: Event, time: f64, registrar: &mut dyn EventRegistrar) {
        self.queue.insert(event, time);
        if let Some(next) = self.queue.peek_priority() {
            registrar.register_event(&self.id, next);
        }
    }

    /// Queues `action` at `time` under a fresh id.
    pub fn schedule(
        &mut self,
        action: Action,
        time: f64,
        registrar: &mut dyn EventRegistrar,
    ) -> EventId {
        let id = self.next_event_id();
        self.add_event(Event::new(id, action), time, registrar);
        id
    }

    /// Fire time of the earliest pending event.
    pub fn next_event_time(&self) -> Option<f64> {
        self.queue.peek_priority()
    }

    pub fn has_upcoming_event(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) fn queue_mut(&mut self) -> &mut PriorityQueue<Event> {
        &mut self.queue
    }

    /// Moves local time forward.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OrderingViolation`] if `new_time` is earlier than
    /// local time.
    pub(crate) fn update_time(&mut self, new_time: f64) -> Result<(), SimError> {
        if new_time < self.time {
            return Err(SimError::OrderingViolation {
                device_id: self.id.clone(),
                event_time: new_time,
                local_time: self.time,
            });
        }
        self.time = new_time;
        Ok(())
    }

    /// Adds `peer_id` locally without any message.
    pub(crate) fn connect(&mut self, peer_id: DeviceId) {
        self.connected.insert(peer_id);
    }

    /// Registers (`value > 0`) or unregisters (`value <= 0`) a peer.
    ///
    /// Returns `true` if the connected set changed. Unregistering an unknown
    /// peer is reported and ignored.
    pub fn register_device(&mut self, peer_id: &DeviceId, value: f64) -> bool {
        if value > 0.0 {
            let added = self.connected.insert(peer_id.clone());
            if added {
                self.log("register", format!("registered {peer_id}"), None);
            }
            added
        } else if self.connected.remove(peer_id) {
            self.log("register", format!("unregistered {peer_id}"), None);
            true
        } else {
            warn!(device = %self.id, peer = %peer_id, "no such device to unregister");
            self.log(
                "register",
                format!("no such device to unregister: {peer_id}"),
                None,
            );
            false
        }
    }

    /// Sends a message stamped with local time to a connected peer.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownPeer`] if `to` is not connected.
    pub fn send_message(
        &self,
        ctx: &mut Context<'_>,
        to: &DeviceId,
        kind: MessageKind,
        value: f64,
    ) -> Result<(), SimError> {
        if !self.connected.contains(to) {
            return Err(SimError::UnknownPeer {
                device_id: self.id.clone(),
                peer_id: to.clone(),
            });
        }
        self.log("send", format!("{kind} to {to}"), Some(value));
        ctx.post(Envelope {
            to: to.clone(),
            message: Message::new(self.time, self.id.clone(), kind, value),
        });
        Ok(())
    }

    /// Emits a notation stamped with local time and this device's id.
    pub fn log(&self, tag: &str, message: impl Into<String>, value: Option<f64>) {
        self.telemetry
            .record(self.time, self.id.as_str(), tag, message, value);
    }
}

/// Splits a signed link flow into its (inbound, outbound) magnitudes.
fn split_flow(flow: f64) -> (f64, f64) {
    if flow >= 0.0 { (flow, 0.0) } else { (0.0, -flow) }
}

/// Zeroes floating-point residue left by adding and removing link flows.
fn settle(level: f64) -> f64 {
    if level.abs() < FLOW_RESIDUE_W { 0.0 } else { level }
}
