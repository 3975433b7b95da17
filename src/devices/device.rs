//! The base agent: event draining, message dispatch and lifecycle.

use std::fmt;

use tracing::debug;

use crate::error::SimError;
use crate::sim::event::{Action, Operation};
use crate::sim::message::{Message, MessageKind};
use crate::sim::schedule::ScheduleEntry;
use crate::sim::types::DeviceId;
use crate::telemetry::Telemetry;

use super::core::DeviceCore;
use super::types::{Context, DeviceBehavior, EventRegistrar};

/// A simulated device: shared [`DeviceCore`] state plus a variant behavior.
///
/// Devices are owned by the supervisor and never hold references to each
/// other; peers are addressed by [`DeviceId`].
pub struct Device {
    core: DeviceCore,
    behavior: Box<dyn DeviceBehavior>,
}

impl Device {
    /// Starts building a device with the given identity and behavior.
    pub fn builder(id: impl Into<DeviceId>, behavior: impl DeviceBehavior + 'static) -> DeviceBuilder {
        Self::boxed_builder(id, Box::new(behavior))
    }

    /// Like [`Device::builder`], for a behavior chosen at runtime.
    pub fn boxed_builder(id: impl Into<DeviceId>, behavior: Box<dyn DeviceBehavior>) -> DeviceBuilder {
        DeviceBuilder {
            id: id.into(),
            behavior,
            time: 0.0,
            latency: 0.0,
            connections: Vec::new(),
            schedule: Vec::new(),
            telemetry: Telemetry::default(),
        }
    }

    pub fn id(&self) -> &DeviceId {
        self.core.id()
    }

    pub fn device_type(&self) -> &'static str {
        self.core.device_type()
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    /// Fire time of the earliest pending local event.
    pub fn next_event_time(&self) -> Option<f64> {
        self.core.next_event_time()
    }

    pub fn has_upcoming_event(&self) -> bool {
        self.core.has_upcoming_event()
    }

    /// Power the device would draw at `price` while operating.
    pub fn demand_at_price(&self, price: f64) -> Option<f64> {
        self.behavior.demand_at_price(price)
    }

    /// Advances local time. Only the supervisor calls this.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OrderingViolation`] if `new_time` is behind local
    /// time.
    pub fn update_time(&mut self, new_time: f64) -> Result<(), SimError> {
        self.core.update_time(new_time)
    }

    /// Runs every local event due at the current local time, in queue order.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OrderingViolation`] if the earliest pending event
    /// is behind local time, or the first error raised by an event.
    pub fn process_events(&mut self, ctx: &mut Context<'_>) -> Result<(), SimError> {
        if let Some(next) = self.core.next_event_time() {
            if next < self.core.time() {
                return Err(SimError::OrderingViolation {
                    device_id: self.core.id().clone(),
                    event_time: next,
                    local_time: self.core.time(),
                });
            }
        }

        while self.core.next_event_time() == Some(self.core.time()) {
            let (event, _) = self.core.queue_mut().pop()?;
            self.execute(event.into_action(), ctx)?;
        }
        Ok(())
    }

    fn execute(&mut self, action: Action, ctx: &mut Context<'_>) -> Result<(), SimError> {
        match action {
            Action::ReadMessage(message) => self.read_message(message, ctx),
            Action::Run(operation) => self.run_operation(operation, ctx),
        }
    }

    /// Runs a schedulable operation immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnsupportedOperation`] if the variant has no such
    /// operation.
    pub fn run_operation(
        &mut self,
        operation: Operation,
        ctx: &mut Context<'_>,
    ) -> Result<(), SimError> {
        self.behavior.run_operation(&mut self.core, ctx, operation)
    }

    /// Defers reading `message` until its send time plus this device's
    /// latency.
    pub fn receive_message(&mut self, message: Message, registrar: &mut dyn EventRegistrar) {
        let read_at = message.timestamp() + self.core.latency();
        self.core
            .schedule(Action::ReadMessage(message), read_at, registrar);
    }

    /// Dispatches a message by kind.
    ///
    /// REGISTER is always processed; the sender must be a connected peer or
    /// a device the supervisor knows. Every other kind is dropped unless the
    /// sender is connected.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownDevice`] for a REGISTER from a device that
    /// does not exist, or whatever the variant hook returns.
    pub fn read_message(&mut self, message: Message, ctx: &mut Context<'_>) -> Result<(), SimError> {
        let sender = message.sender_id();
        let value = message.value();
        let kind = message.kind();

        if kind != MessageKind::Register && !self.core.is_connected(sender) {
            debug!(device = %self.core.id(), %sender, %kind, "dropped message from unregistered sender");
            self.core.log(
                "dropped",
                format!("ignored {kind} from unregistered {sender}"),
                Some(value),
            );
            return Ok(());
        }

        let core = &mut self.core;
        let behavior = &mut self.behavior;
        match kind {
            MessageKind::Register => {
                if !core.is_connected(sender) && !ctx.knows(sender) {
                    return Err(SimError::UnknownDevice(sender.clone()));
                }
                let changed = core.register_device(sender, value);
                if changed && value > 0.0 {
                    behavior.on_peer_registered(core, ctx, sender)?;
                }
                Ok(())
            }
            MessageKind::Power => behavior.process_power_message(core, ctx, sender, value),
            MessageKind::Price => behavior.process_price_message(core, ctx, sender, value),
            MessageKind::Request => behavior.process_request_message(core, ctx, sender, value),
            MessageKind::Allocate => behavior.process_allocate_message(core, ctx, sender, value),
        }
    }

    /// Connects to each peer locally and sends it REGISTER(1).
    ///
    /// # Errors
    ///
    /// Propagates send failures.
    pub fn engage(&mut self, peers: &[DeviceId], ctx: &mut Context<'_>) -> Result<(), SimError> {
        for peer in peers {
            self.core.connect(peer.clone());
            self.core
                .send_message(ctx, peer, MessageKind::Register, 1.0)?;
        }
        Ok(())
    }

    /// Closes the device at `end_time`: drops both power levels to zero and
    /// reports accumulated energy.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OrderingViolation`] if `end_time` is behind local
    /// time.
    pub fn finish(&mut self, end_time: f64) -> Result<(), SimError> {
        self.core.update_time(end_time)?;
        self.core.set_power_in(0.0)?;
        self.core.set_power_out(0.0)?;
        self.core
            .log("power calcs", "sum Wh in", Some(self.core.energy_in()));
        self.core
            .log("power calcs", "sum Wh out", Some(self.core.energy_out()));
        self.behavior.device_specific_calcs(&self.core);
        Ok(())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", self.core.id())
            .field("device_type", &self.core.device_type())
            .field("time", &self.core.time())
            .field("power_in", &self.core.power_in())
            .field("power_out", &self.core.power_out())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Device`]; see [`Device::builder`].
pub struct DeviceBuilder {
    id: DeviceId,
    behavior: Box<dyn DeviceBehavior>,
    time: f64,
    latency: f64,
    connections: Vec<DeviceId>,
    schedule: Vec<ScheduleEntry>,
    telemetry: Telemetry,
}

impl DeviceBuilder {
    /// Initial local time in seconds (default 0).
    pub fn time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Message read latency in seconds (default 0).
    pub fn latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    /// Peers known from the start, without any REGISTER exchange.
    pub fn connect<I, P>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<DeviceId>,
    {
        self.connections.extend(peers.into_iter().map(Into::into));
        self
    }

    /// Scheduled operations, hour offsets from time zero.
    pub fn schedule(mut self, entries: impl IntoIterator<Item = ScheduleEntry>) -> Self {
        self.schedule.extend(entries);
        self
    }

    pub fn telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Validates the settings and queues the schedule, reporting the first
    /// pending time to `registrar`.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidArgument`] for a negative latency or initial
    ///   time, or a schedule entry earlier than the initial time.
    /// - [`SimError::UnsupportedOperation`] if the variant cannot run a
    ///   scheduled operation.
    pub fn build(self, registrar: &mut dyn EventRegistrar) -> Result<Device, SimError> {
        let device_type = self.behavior.device_type();
        if !(self.latency >= 0.0 && self.latency.is_finite()) {
            return Err(SimError::invalid_argument(
                &self.id,
                format!("latency must be non-negative, got {}", self.latency),
            ));
        }
        if !(self.time >= 0.0 && self.time.is_finite()) {
            return Err(SimError::invalid_argument(
                &self.id,
                format!("initial time must be non-negative, got {}", self.time),
            ));
        }
        for entry in &self.schedule {
            if !self.behavior.supports(entry.operation) {
                return Err(SimError::UnsupportedOperation {
                    device_id: self.id.clone(),
                    device_type,
                    operation: entry.operation,
                });
            }
            if entry.time_seconds() < self.time {
                return Err(SimError::invalid_argument(
                    &self.id,
                    format!(
                        "{} at hour {} is before the initial time {}s",
                        entry.operation, entry.hour, self.time
                    ),
                ));
            }
        }

        let mut core = DeviceCore::new(
            self.id,
            device_type,
            self.time,
            self.latency,
            self.telemetry,
        );
        for peer in self.connections {
            core.connect(peer);
        }
        for entry in &self.schedule {
            core.schedule(Action::Run(entry.operation), entry.time_seconds(), registrar);
        }
        core.log("init", format!("initialize {device_type}"), None);

        Ok(Device {
            core,
            behavior: self.behavior,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::sim::message::Envelope;
    use crate::sim::queue::PriorityQueue;

    /// Records which hooks ran.
    #[derive(Default)]
    struct Probe {
        calls: Vec<(MessageKind, f64)>,
    }

    impl DeviceBehavior for Probe {
        fn device_type(&self) -> &'static str {
            "probe"
        }

        fn process_power_message(
            &mut self,
            _core: &mut DeviceCore,
            _ctx: &mut Context<'_>,
            _sender: &DeviceId,
            value: f64,
        ) -> Result<(), SimError> {
            self.calls.push((MessageKind::Power, value));
            Ok(())
        }

        fn process_price_message(
            &mut self,
            _core: &mut DeviceCore,
            _ctx: &mut Context<'_>,
            _sender: &DeviceId,
            price: f64,
        ) -> Result<(), SimError> {
            self.calls.push((MessageKind::Price, price));
            Ok(())
        }

        fn process_request_message(
            &mut self,
            _core: &mut DeviceCore,
            _ctx: &mut Context<'_>,
            _sender: &DeviceId,
            amount: f64,
        ) -> Result<(), SimError> {
            self.calls.push((MessageKind::Request, amount));
            Ok(())
        }

        fn process_allocate_message(
            &mut self,
            _core: &mut DeviceCore,
            _ctx: &mut Context<'_>,
            _sender: &DeviceId,
            amount: f64,
        ) -> Result<(), SimError> {
            self.calls.push((MessageKind::Allocate, amount));
            Ok(())
        }

        fn supports(&self, operation: Operation) -> bool {
            operation == Operation::TurnOn
        }

        fn run_operation(
            &mut self,
            _core: &mut DeviceCore,
            _ctx: &mut Context<'_>,
            _operation: Operation,
        ) -> Result<(), SimError> {
            Ok(())
        }
    }

    struct Harness {
        directory: BTreeSet<DeviceId>,
        events: PriorityQueue<DeviceId>,
        outbox: Vec<Envelope>,
    }

    impl Harness {
        fn new(known: &[&str]) -> Self {
            Self {
                directory: known.iter().map(|id| DeviceId::from(*id)).collect(),
                events: PriorityQueue::new(),
                outbox: Vec::new(),
            }
        }

        fn ctx(&mut self) -> Context<'_> {
            Context::new(&self.directory, &mut self.events, &mut self.outbox)
        }
    }

    fn probe_device(h: &mut Harness) -> Device {
        let (telemetry, _) = Telemetry::memory();
        Device::builder("eud_1", Probe::default())
            .telemetry(telemetry)
            .build(&mut h.events)
            .expect("valid device")
    }

    #[test]
    fn build_rejects_negative_latency() {
        let mut h = Harness::new(&[]);
        let result = Device::builder("eud_1", Probe::default())
            .latency(-1.0)
            .build(&mut h.events);
        assert!(matches!(result, Err(SimError::InvalidArgument { .. })));
    }

    #[test]
    fn build_rejects_unsupported_schedule() {
        let mut h = Harness::new(&[]);
        let result = Device::builder("eud_1", Probe::default())
            .schedule([ScheduleEntry::new(1.0, Operation::TurnOff)])
            .build(&mut h.events);
        assert!(matches!(
            result,
            Err(SimError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn build_queues_schedule_and_reports_it() {
        let mut h = Harness::new(&[]);
        let device = Device::builder("eud_1", Probe::default())
            .schedule([ScheduleEntry::new(2.0, Operation::TurnOn)])
            .telemetry(Telemetry::memory().0)
            .build(&mut h.events)
            .expect("valid device");
        assert_eq!(device.next_event_time(), Some(7200.0));
        assert_eq!(h.events.priority_of(device.id()), Some(7200.0));
    }

    #[test]
    fn receive_defers_by_latency() {
        let mut h = Harness::new(&["gc_1"]);
        let (telemetry, _) = Telemetry::memory();
        let mut device = Device::builder("eud_1", Probe::default())
            .latency(2.5)
            .telemetry(telemetry)
            .build(&mut h.events)
            .expect("valid device");
        let msg = Message::new(10.0, DeviceId::from("gc_1"), MessageKind::Price, 0.1);
        device.receive_message(msg, &mut h.events);
        assert_eq!(device.next_event_time(), Some(12.5));
    }

    #[test]
    fn unregistered_sender_is_dropped() {
        let mut h = Harness::new(&["gc_1"]);
        let mut device = probe_device(&mut h);
        let msg = Message::new(0.0, DeviceId::from("gc_1"), MessageKind::Power, -5.0);
        device.read_message(msg, &mut h.ctx()).expect("soft drop");
        assert_eq!(device.core().power_in(), 0.0);
        assert!(h.outbox.is_empty());
    }

    #[test]
    fn register_then_dispatch() {
        let mut h = Harness::new(&["gc_1"]);
        let mut device = probe_device(&mut h);
        let gc = DeviceId::from("gc_1");
        device
            .read_message(Message::new(0.0, gc.clone(), MessageKind::Register, 1.0), &mut h.ctx())
            .expect("register");
        assert!(device.core().is_connected(&gc));
        device
            .read_message(Message::new(0.0, gc, MessageKind::Price, 0.3), &mut h.ctx())
            .expect("price");
    }

    #[test]
    fn register_from_nonexistent_device_fails() {
        let mut h = Harness::new(&[]);
        let mut device = probe_device(&mut h);
        let msg = Message::new(0.0, DeviceId::from("gc_9"), MessageKind::Register, 1.0);
        assert!(matches!(
            device.read_message(msg, &mut h.ctx()),
            Err(SimError::UnknownDevice(_))
        ));
    }

    #[test]
    fn process_events_rejects_stale_queue() {
        let mut h = Harness::new(&[]);
        let mut device = probe_device(&mut h);
        device.update_time(100.0).expect("forward");
        device
            .core_mut()
            .schedule(Action::Run(Operation::TurnOn), 50.0, &mut h.events);
        assert!(matches!(
            device.process_events(&mut h.ctx()),
            Err(SimError::OrderingViolation { .. })
        ));
    }

    #[test]
    fn engage_sends_register() {
        let mut h = Harness::new(&["gc_1"]);
        let mut device = probe_device(&mut h);
        device
            .engage(&[DeviceId::from("gc_1")], &mut h.ctx())
            .expect("engage");
        assert_eq!(h.outbox.len(), 1);
        assert_eq!(h.outbox[0].message.kind(), MessageKind::Register);
        assert_eq!(h.outbox[0].message.value(), 1.0);
    }

    #[test]
    fn finish_zeroes_power_and_integrates() {
        let mut h = Harness::new(&[]);
        let mut device = probe_device(&mut h);
        device.core_mut().set_power_in(50.0).expect("level");
        device.finish(3600.0).expect("finish");
        assert_eq!(device.core().power_in(), 0.0);
        assert!((device.core().energy_in() - 50.0).abs() < 1e-9);
        assert!(device.finish(10.0).is_err());
    }
}
