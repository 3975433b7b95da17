//! End-use devices: consumers that follow a price-driven load curve.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::SimError;
use crate::sim::event::Operation;
use crate::sim::message::MessageKind;
use crate::sim::types::{DeviceId, GRID_CONTROLLER_PREFIX};

use super::core::DeviceCore;
use super::types::{Context, DeviceBehavior};

/// A consumer's control law.
pub trait LoadCurve {
    fn device_type(&self) -> &'static str;

    /// Watts the device wants at `price`; zero whenever it is not operating.
    fn desired_power_level(&self, price: f64, in_operation: bool) -> f64;

    /// Reacts to a change of the power actually drawn.
    fn on_power_changed(&self, _core: &DeviceCore, _power_in: f64) {}
}

/// A consuming device driven by a [`LoadCurve`].
///
/// Whenever price, allocation or operating state changes the device
/// recomputes its desired level and, if it differs from what it draws now,
/// tells its grid controller the new inbound level.
#[derive(Debug, Clone)]
pub struct Eud<C> {
    curve: C,
    allocated: BTreeMap<DeviceId, f64>,
    price: f64,
    in_operation: bool,
}

impl<C: LoadCurve> Eud<C> {
    pub fn new(curve: C) -> Self {
        Self {
            curve,
            allocated: BTreeMap::new(),
            price: 0.0,
            in_operation: false,
        }
    }

    pub fn curve(&self) -> &C {
        &self.curve
    }

    /// Last price received.
    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn in_operation(&self) -> bool {
        self.in_operation
    }

    /// Inbound power allocated by `peer`.
    pub fn allocated(&self, peer: &DeviceId) -> Option<f64> {
        self.allocated.get(peer).copied()
    }

    fn turn_on(&mut self, core: &mut DeviceCore, ctx: &mut Context<'_>) -> Result<(), SimError> {
        self.in_operation = true;
        core.log("turn on", format!("turn on device {}", core.id()), Some(1.0));
        self.modulate_power(core, ctx)
    }

    fn turn_off(&mut self, core: &mut DeviceCore, ctx: &mut Context<'_>) -> Result<(), SimError> {
        self.in_operation = false;
        if let Some(gc) = supplier(core) {
            if core.power_in() > 0.0 {
                core.send_message(ctx, &gc, MessageKind::Power, 0.0)?;
            }
        }
        core.set_power_in(0.0)?;
        self.curve.on_power_changed(core, 0.0);
        core.log("turn off", format!("turn off device {}", core.id()), Some(0.0));
        Ok(())
    }

    /// Moves the inbound level to the curve's desired level.
    ///
    /// Without a connected grid controller the device cannot be supplied and
    /// switches itself off.
    ///
    /// # Errors
    ///
    /// Propagates send failures.
    pub fn modulate_power(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
    ) -> Result<(), SimError> {
        let desired = self.curve.desired_power_level(self.price, self.in_operation);
        let power_seek = desired - core.power_in();
        if power_seek == 0.0 {
            return Ok(());
        }

        match supplier(core) {
            Some(gc) => {
                core.log("power seek", format!("seek {power_seek} W from {gc}"), Some(power_seek));
                core.recalc_power(core.power_in(), desired)?;
                self.curve.on_power_changed(core, desired);
                core.send_message(ctx, &gc, MessageKind::Power, desired)
            }
            None => {
                debug!(device = %core.id(), "no grid controller connected");
                self.turn_off(core, ctx)
            }
        }
    }
}

/// Sends a REQUEST to receive `amount` watts (`amount <= 0`) from a
/// connected grid controller.
///
/// # Errors
///
/// Returns [`SimError::InvalidArgument`] if `amount` is positive or
/// `target` is not a connected grid controller.
pub fn send_request(
    core: &DeviceCore,
    ctx: &mut Context<'_>,
    target: &DeviceId,
    amount: f64,
) -> Result<(), SimError> {
    if amount > 0.0 {
        return Err(SimError::invalid_argument(
            core.id(),
            "an end-use device cannot offer to provide power",
        ));
    }
    if !target.has_prefix(GRID_CONTROLLER_PREFIX) || !core.is_connected(target) {
        return Err(SimError::invalid_argument(
            core.id(),
            format!("{target} is not a connected grid controller"),
        ));
    }
    core.send_message(ctx, target, MessageKind::Request, amount)
}

fn supplier(core: &DeviceCore) -> Option<DeviceId> {
    core.connected_with_prefix(GRID_CONTROLLER_PREFIX)
        .next()
        .cloned()
}

impl<C: LoadCurve> DeviceBehavior for Eud<C> {
    fn device_type(&self) -> &'static str {
        self.curve.device_type()
    }

    /// A non-positive value is the level the sender now provides. Positive
    /// values ask this device to supply power and are answered with zero.
    fn process_power_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        value: f64,
    ) -> Result<(), SimError> {
        if value <= 0.0 {
            core.set_power_in(-value)?;
            self.curve.on_power_changed(core, -value);
            self.modulate_power(core, ctx)
        } else {
            core.log("power", format!("ignored positive power message from {sender}"), Some(value));
            core.send_message(ctx, sender, MessageKind::Power, 0.0)
        }
    }

    fn process_price_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        _sender: &DeviceId,
        price: f64,
    ) -> Result<(), SimError> {
        self.price = price;
        core.log("price", "received price", Some(price));
        self.modulate_power(core, ctx)
    }

    fn process_request_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError> {
        core.log("request", format!("ignored request from {sender}"), Some(amount));
        Ok(())
    }

    fn process_allocate_message(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError> {
        if amount < 0.0 {
            return Err(SimError::invalid_argument(
                core.id(),
                format!("{sender} allocated {amount} W to receive from a consumer"),
            ));
        }
        self.allocated.insert(sender.clone(), amount);
        core.log("allocate", format!("allocated by {sender}"), Some(amount));
        self.modulate_power(core, ctx)
    }

    fn supports(&self, operation: Operation) -> bool {
        matches!(operation, Operation::TurnOn | Operation::TurnOff)
    }

    fn run_operation(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        operation: Operation,
    ) -> Result<(), SimError> {
        match operation {
            Operation::TurnOn => self.turn_on(core, ctx),
            Operation::TurnOff => self.turn_off(core, ctx),
        }
    }

    fn demand_at_price(&self, price: f64) -> Option<f64> {
        Some(self.curve.desired_power_level(price, true))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::devices::FixedConsumption;
    use crate::sim::message::Envelope;
    use crate::sim::queue::PriorityQueue;
    use crate::telemetry::Telemetry;

    fn core(connected: &[&str]) -> DeviceCore {
        let mut core = DeviceCore::new(
            DeviceId::from("eud_1"),
            "fixed_consumption",
            0.0,
            0.0,
            Telemetry::memory().0,
        );
        for peer in connected {
            core.connect(DeviceId::from(*peer));
        }
        core
    }

    struct Parts {
        directory: BTreeSet<DeviceId>,
        events: PriorityQueue<DeviceId>,
        outbox: Vec<Envelope>,
    }

    impl Parts {
        fn new() -> Self {
            Self {
                directory: BTreeSet::new(),
                events: PriorityQueue::new(),
                outbox: Vec::new(),
            }
        }

        fn ctx(&mut self) -> Context<'_> {
            Context::new(&self.directory, &mut self.events, &mut self.outbox)
        }
    }

    #[test]
    fn turn_on_asks_supplier_for_desired_level() {
        let mut core = core(&["gc_1"]);
        let mut parts = Parts::new();
        let mut eud = Eud::new(FixedConsumption::new(75.0));
        eud.run_operation(&mut core, &mut parts.ctx(), Operation::TurnOn)
            .expect("turn on");

        assert_eq!(core.power_in(), 75.0);
        assert_eq!(parts.outbox.len(), 1);
        assert_eq!(parts.outbox[0].to.as_str(), "gc_1");
        assert_eq!(parts.outbox[0].message.kind(), MessageKind::Power);
        assert_eq!(parts.outbox[0].message.value(), 75.0);
    }

    #[test]
    fn no_supplier_forces_off() {
        let mut core = core(&[]);
        let mut parts = Parts::new();
        let mut eud = Eud::new(FixedConsumption::new(75.0));
        eud.run_operation(&mut core, &mut parts.ctx(), Operation::TurnOn)
            .expect("turn on");
        assert!(!eud.in_operation());
        assert_eq!(core.power_in(), 0.0);
        assert!(parts.outbox.is_empty());
    }

    #[test]
    fn positive_power_answered_with_zero() {
        let mut core = core(&["gc_1"]);
        let mut parts = Parts::new();
        let mut eud = Eud::new(FixedConsumption::new(75.0));
        let gc = DeviceId::from("gc_1");
        eud.process_power_message(&mut core, &mut parts.ctx(), &gc, 20.0)
            .expect("soft");
        assert_eq!(core.power_in(), 0.0);
        assert_eq!(parts.outbox[0].message.value(), 0.0);
    }

    #[test]
    fn reduced_supply_is_booked_then_sought_back() {
        let mut core = core(&["gc_1"]);
        let mut parts = Parts::new();
        let mut eud = Eud::new(FixedConsumption::new(75.0));
        let gc = DeviceId::from("gc_1");
        eud.run_operation(&mut core, &mut parts.ctx(), Operation::TurnOn)
            .expect("turn on");

        core.update_time(600.0).expect("forward");
        eud.process_power_message(&mut core, &mut parts.ctx(), &gc, -30.0)
            .expect("supplied 30");

        // the device re-asks for the missing 45 W at the full level
        assert_eq!(parts.outbox.len(), 2);
        assert_eq!(parts.outbox[1].message.kind(), MessageKind::Power);
        assert_eq!(parts.outbox[1].message.value(), 75.0);
        assert_eq!(core.power_in(), 75.0);
        assert!((core.energy_in() - 75.0 * 600.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn negative_allocate_rejected() {
        let mut core = core(&["gc_1"]);
        let mut parts = Parts::new();
        let mut eud = Eud::new(FixedConsumption::new(75.0));
        let gc = DeviceId::from("gc_1");
        let result = eud.process_allocate_message(&mut core, &mut parts.ctx(), &gc, -10.0);
        assert!(matches!(result, Err(SimError::InvalidArgument { .. })));

        eud.process_allocate_message(&mut core, &mut parts.ctx(), &gc, 10.0)
            .expect("receive allocation");
        assert_eq!(eud.allocated(&gc), Some(10.0));
    }

    #[test]
    fn request_must_target_connected_gc() {
        let core = core(&["gc_1", "um_1"]);
        let mut parts = Parts::new();
        let gc = DeviceId::from("gc_1");
        assert!(send_request(&core, &mut parts.ctx(), &gc, 5.0).is_err());
        assert!(send_request(&core, &mut parts.ctx(), &DeviceId::from("um_1"), -5.0).is_err());
        assert!(send_request(&core, &mut parts.ctx(), &DeviceId::from("gc_2"), -5.0).is_err());
        send_request(&core, &mut parts.ctx(), &gc, -5.0).expect("valid request");
        assert_eq!(parts.outbox[0].message.kind(), MessageKind::Request);
    }
}
