//! The supervisor: device registry and the global event loop.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::devices::{Context, Device, EventRegistrar};
use crate::error::SimError;
use crate::sim::message::Envelope;
use crate::telemetry::Telemetry;

use super::energy::EnergyReport;
use super::observer::SupervisorObserver;
use super::queue::PriorityQueue;
use super::types::DeviceId;

/// Default tolerance for the end-of-run energy balance (Wh).
pub const DEFAULT_TOLERANCE_WH: f64 = 1e-6;

const SUPERVISOR_ID: &str = "supervisor";

/// Owns every device and orders their events on one global clock.
///
/// The global queue holds at most one entry per device: the time of its
/// earliest pending local event. [`Supervisor::occur_next_event`] pops the
/// globally earliest entry, moves that device to the entry's time and lets
/// it drain everything due then. Messages the device sends are delivered
/// afterwards, which schedules a read on each receiver.
pub struct Supervisor {
    devices: BTreeMap<DeviceId, Device>,
    directory: BTreeSet<DeviceId>,
    events: PriorityQueue<DeviceId>,
    observers: Vec<Box<dyn SupervisorObserver>>,
    telemetry: Telemetry,
    tolerance_wh: f64,
    last_time: Option<f64>,
    events_processed: u64,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            directory: BTreeSet::new(),
            events: PriorityQueue::new(),
            observers: Vec::new(),
            telemetry: Telemetry::default(),
            tolerance_wh: DEFAULT_TOLERANCE_WH,
            last_time: None,
            events_processed: 0,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Sets the energy-balance tolerance checked by [`Supervisor::finish_all`].
    pub fn with_tolerance(mut self, tolerance_wh: f64) -> Self {
        self.tolerance_wh = tolerance_wh;
        self
    }

    pub fn attach_observer(&mut self, observer: Box<dyn SupervisorObserver>) {
        self.observers.push(observer);
    }

    /// Adds a device to the registry. Queues nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DuplicateDevice`] if the identifier is taken.
    pub fn register_device(&mut self, device: Device) -> Result<(), SimError> {
        let id = device.id().clone();
        if self.devices.contains_key(&id) {
            return Err(SimError::DuplicateDevice(id));
        }
        debug!(device = %id, device_type = device.device_type(), "registered device");
        self.directory.insert(id.clone());
        self.devices.insert(id, device);
        Ok(())
    }

    /// Sets `device_id`'s next event time, superseding any earlier entry.
    pub fn register_event(&mut self, device_id: &DeviceId, time: f64) {
        self.events.insert(device_id.clone(), time);
    }

    /// Looks up a registered device.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownDevice`] if no such device is registered.
    pub fn get_device(&self, device_id: &DeviceId) -> Result<&Device, SimError> {
        self.devices
            .get(device_id)
            .ok_or_else(|| SimError::UnknownDevice(device_id.clone()))
    }

    /// Registered devices in identifier order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn has_next_event(&self) -> bool {
        !self.events.is_empty()
    }

    /// The globally earliest `(device, time)` entry, without removing it.
    pub fn peek_next_event(&self) -> Option<(&DeviceId, f64)> {
        self.events.peek().ok()
    }

    /// Time of the last processed event.
    pub fn current_time(&self) -> Option<f64> {
        self.last_time
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Processes the globally earliest entry.
    ///
    /// # Errors
    ///
    /// - [`SimError::Queue`] if no event is pending.
    /// - [`SimError::UnregisteredDevice`] if the entry names a device that
    ///   was never registered.
    /// - Any error raised while the device drains its events or its
    ///   messages are delivered. None of these leave a trustworthy run.
    pub fn occur_next_event(&mut self) -> Result<(), SimError> {
        let (device_id, time) = self.events.pop()?;
        if !self.devices.contains_key(&device_id) {
            return Err(SimError::UnregisteredDevice { device_id, time });
        }

        if let Some(last) = self.last_time {
            if time > last {
                self.notify_time_advanced(last);
            }
        }
        self.last_time = Some(time);

        let mut outbox = Vec::new();
        let device = self
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| SimError::UnknownDevice(device_id.clone()))?;
        device.update_time(time)?;
        let mut ctx = Context::new(&self.directory, &mut self.events, &mut outbox);
        device.process_events(&mut ctx)?;

        match device.next_event_time() {
            Some(next) => self.events.insert(device_id, next),
            None if self.events.contains(&device_id) => self.events.remove(&device_id)?,
            None => {}
        }

        self.deliver(outbox)?;
        self.events_processed += 1;
        Ok(())
    }

    /// Hands each message to its receiver.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownDevice`] for an unregistered receiver.
    pub fn deliver(&mut self, outbox: Vec<Envelope>) -> Result<(), SimError> {
        for Envelope { to, message } in outbox {
            let receiver = self
                .devices
                .get_mut(&to)
                .ok_or_else(|| SimError::UnknownDevice(to.clone()))?;
            receiver.receive_message(message, &mut self.events);
        }
        Ok(())
    }

    /// Runs `f` against a registered device outside the event loop, then
    /// delivers whatever it sent.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownDevice`] if the device is not registered,
    /// or the error returned by `f`.
    pub fn with_device<R, F>(&mut self, device_id: &DeviceId, f: F) -> Result<R, SimError>
    where
        F: FnOnce(&mut Device, &mut Context<'_>) -> Result<R, SimError>,
    {
        let mut outbox = Vec::new();
        let device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| SimError::UnknownDevice(device_id.clone()))?;
        let mut ctx = Context::new(&self.directory, &mut self.events, &mut outbox);
        let result = f(device, &mut ctx)?;
        self.deliver(outbox)?;
        Ok(result)
    }

    /// Connects `device_id` to `peers` and sends each a REGISTER.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownDevice`] if the device or a peer is not
    /// registered.
    pub fn engage(&mut self, device_id: &DeviceId, peers: &[DeviceId]) -> Result<(), SimError> {
        if let Some(missing) = peers.iter().find(|p| !self.directory.contains(*p)) {
            return Err(SimError::UnknownDevice(missing.clone()));
        }
        self.with_device(device_id, |device, ctx| device.engage(peers, ctx))
    }

    /// Finishes every device at `end_time` and checks the energy balance.
    ///
    /// An imbalance beyond the tolerance is logged, not returned as an error.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OrderingViolation`] if a device's local time is
    /// already past `end_time`.
    pub fn finish_all(&mut self, end_time: f64) -> Result<EnergyReport, SimError> {
        if let Some(last) = self.last_time {
            self.notify_time_advanced(last);
        }
        for device in self.devices.values_mut() {
            device.finish(end_time)?;
        }
        for observer in &mut self.observers {
            observer.on_finish(end_time, &mut self.devices.values());
        }

        let report = EnergyReport::from_devices(end_time, self.devices.values());
        self.telemetry.record(
            end_time,
            SUPERVISOR_ID,
            "energy",
            "total Wh in",
            Some(report.total_in_wh),
        );
        self.telemetry.record(
            end_time,
            SUPERVISOR_ID,
            "energy",
            "total Wh out",
            Some(report.total_out_wh),
        );
        info!(
            end_time,
            total_in_wh = report.total_in_wh,
            total_out_wh = report.total_out_wh,
            "simulation finished"
        );
        if !report.is_balanced(self.tolerance_wh) {
            warn!(
                imbalance_wh = report.imbalance_wh(),
                tolerance_wh = self.tolerance_wh,
                "energy in and out do not balance"
            );
        }
        Ok(report)
    }

    /// Total power every end-use device would draw at each price.
    pub fn demand_curve(&self, prices: &[f64]) -> Vec<(f64, f64)> {
        prices
            .iter()
            .map(|&price| {
                let demand = self
                    .devices
                    .values()
                    .filter_map(|d| d.demand_at_price(price))
                    .sum();
                (price, demand)
            })
            .collect()
    }

    fn notify_time_advanced(&mut self, time: f64) {
        for observer in &mut self.observers {
            observer.on_time_advanced(time, &mut self.devices.values());
        }
    }
}

impl EventRegistrar for Supervisor {
    fn register_event(&mut self, device_id: &DeviceId, time: f64) {
        Supervisor::register_event(self, device_id, time);
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("devices", &self.directory)
            .field("pending", &self.events.len())
            .field("last_time", &self.last_time)
            .finish_non_exhaustive()
    }
}
