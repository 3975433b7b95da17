//! Builds a supervisor from a scenario and drives it to completion.

use std::sync::Arc;

use tracing::info;

use crate::config::{DeviceConfig, ScenarioConfig};
use crate::devices::Device;
use crate::error::SimError;
use crate::sim::types::DeviceId;
use crate::sim::{EnergyReport, PowerFlowRecorder, PowerFlowSample, Supervisor};
use crate::telemetry::{MemorySink, Notation, Telemetry};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub report: EnergyReport,
    pub notations: Vec<Notation>,
    pub power_flow: Vec<PowerFlowSample>,
    /// `(price, watts)` pairs summed over every end-use device.
    pub demand_curve: Vec<(f64, f64)>,
    pub end_time: f64,
    pub events_processed: u64,
}

impl SimulationResult {
    /// Whether total energy in and out agree within `tolerance_wh`.
    pub fn is_balanced(&self, tolerance_wh: f64) -> bool {
        self.report.is_balanced(tolerance_wh)
    }
}

/// Creates the device described by `cfg`.
///
/// # Errors
///
/// Returns whatever [`crate::devices::DeviceBuilder::build`] rejects.
pub fn build_device(
    cfg: &DeviceConfig,
    telemetry: &Telemetry,
    supervisor: &mut Supervisor,
) -> Result<Device, SimError> {
    let builder = Device::boxed_builder(cfg.id.as_str(), cfg.behavior());
    builder
        .time(cfg.time)
        .latency(cfg.latency)
        .schedule(cfg.schedule.iter().copied())
        .telemetry(telemetry.clone())
        .build(supervisor)
}

/// Registers every configured device, then engages each with its
/// configured connections.
///
/// # Errors
///
/// Returns the first validation or construction failure.
pub fn build_supervisor(config: &ScenarioConfig, telemetry: Telemetry) -> Result<Supervisor, SimError> {
    if let Some(first) = config.validate().into_iter().next() {
        return Err(first.into());
    }

    let mut supervisor = Supervisor::new()
        .with_telemetry(telemetry.clone())
        .with_tolerance(config.simulation.tolerance_wh);
    for cfg in &config.devices {
        let device = build_device(cfg, &telemetry, &mut supervisor)?;
        supervisor.register_device(device)?;
    }
    for cfg in &config.devices {
        if cfg.connections.is_empty() {
            continue;
        }
        let peers: Vec<DeviceId> = cfg.connections.iter().map(|p| DeviceId::from(p.as_str())).collect();
        supervisor.engage(&DeviceId::from(cfg.id.as_str()), &peers)?;
    }
    Ok(supervisor)
}

/// Processes events until none is due by `end_time`, then finishes every
/// device at `end_time`.
///
/// # Errors
///
/// Returns the first fatal simulation error.
pub fn drive(supervisor: &mut Supervisor, end_time: f64) -> Result<EnergyReport, SimError> {
    while let Some(time) = supervisor.peek_next_event().map(|(_, time)| time) {
        if time > end_time {
            break;
        }
        supervisor.occur_next_event()?;
    }
    supervisor.finish_all(end_time)
}

/// Runs a scenario end to end, collecting notations and power flow.
///
/// # Errors
///
/// Returns the first configuration or simulation error.
pub fn run_scenario(config: &ScenarioConfig) -> Result<SimulationResult, SimError> {
    let sink = Arc::new(MemorySink::forwarding());
    run_with_sink(config, sink)
}

/// Like [`run_scenario`], recording notations into `sink`.
///
/// # Errors
///
/// Returns the first configuration or simulation error.
pub fn run_with_sink(
    config: &ScenarioConfig,
    sink: Arc<MemorySink>,
) -> Result<SimulationResult, SimError> {
    let telemetry = Telemetry::new(sink.clone());
    let mut supervisor = build_supervisor(config, telemetry)?;
    let recorder = PowerFlowRecorder::new();
    supervisor.attach_observer(Box::new(recorder.clone()));

    let end_time = config.end_time();
    info!(devices = supervisor.device_count(), end_time, "starting simulation");
    let report = drive(&mut supervisor, end_time)?;
    let demand_curve = supervisor.demand_curve(&config.simulation.demand_prices);

    Ok(SimulationResult {
        report,
        notations: sink.notations(),
        power_flow: recorder.samples(),
        demand_curve,
        end_time,
        events_processed: supervisor.events_processed(),
    })
}
