//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use lpdm_sim::devices::{Context, Device, DeviceBehavior, DeviceCore};
use lpdm_sim::sim::Supervisor;
use lpdm_sim::sim::event::Operation;
use lpdm_sim::sim::message::MessageKind;
use lpdm_sim::sim::types::DeviceId;
use lpdm_sim::telemetry::{MemorySink, Telemetry};
use lpdm_sim::SimError;

/// Telemetry that collects in memory, with the sink for inspection.
pub fn memory_telemetry() -> (Telemetry, Arc<MemorySink>) {
    Telemetry::memory()
}

/// One message hook invocation seen by a [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub time: f64,
    pub kind: MessageKind,
    pub sender: String,
    pub value: f64,
}

/// A device behavior that records every hook call and, on `turn_on`,
/// sends `PRICE(0.2)` to every connected peer.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub calls: Arc<Mutex<Vec<Call>>>,
    /// Take a non-positive POWER value as the new inbound level.
    pub accept_power: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that consumes whatever a POWER message provides.
    pub fn consumer() -> Self {
        Self {
            accept_power: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(&self, core: &DeviceCore, kind: MessageKind, sender: &DeviceId, value: f64) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                time: core.time(),
                kind,
                sender: sender.to_string(),
                value,
            });
        }
    }
}

impl DeviceBehavior for Recorder {
    fn device_type(&self) -> &'static str {
        "recorder"
    }

    fn process_power_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        value: f64,
    ) -> Result<(), SimError> {
        self.push(core, MessageKind::Power, sender, value);
        if self.accept_power && value <= 0.0 {
            core.set_power_in(-value)?;
        }
        Ok(())
    }

    fn process_price_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        price: f64,
    ) -> Result<(), SimError> {
        self.push(core, MessageKind::Price, sender, price);
        Ok(())
    }

    fn process_request_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError> {
        self.push(core, MessageKind::Request, sender, amount);
        Ok(())
    }

    fn process_allocate_message(
        &mut self,
        core: &mut DeviceCore,
        _ctx: &mut Context<'_>,
        sender: &DeviceId,
        amount: f64,
    ) -> Result<(), SimError> {
        self.push(core, MessageKind::Allocate, sender, amount);
        Ok(())
    }

    fn supports(&self, operation: Operation) -> bool {
        operation == Operation::TurnOn
    }

    fn run_operation(
        &mut self,
        core: &mut DeviceCore,
        ctx: &mut Context<'_>,
        _operation: Operation,
    ) -> Result<(), SimError> {
        let peers: Vec<DeviceId> = core.connected().cloned().collect();
        for peer in &peers {
            core.send_message(ctx, peer, MessageKind::Price, 0.2)?;
        }
        Ok(())
    }
}

/// Builds and registers a device in one step.
pub fn add(supervisor: &mut Supervisor, builder: lpdm_sim::devices::DeviceBuilder) -> DeviceId {
    let device: Device = builder.build(supervisor).expect("device builds");
    let id = device.id().clone();
    supervisor.register_device(device).expect("unique id");
    id
}

/// Processes every pending event.
pub fn run_all(supervisor: &mut Supervisor) {
    while supervisor.has_next_event() {
        supervisor.occur_next_event().expect("event processes");
    }
}
