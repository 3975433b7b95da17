//! Observers notified as the global clock advances.

use std::sync::{Arc, Mutex, PoisonError};

use crate::devices::Device;

/// Callback attached to a supervisor.
///
/// `on_time_advanced` runs once the clock is about to move past `time`,
/// after every event at `time` has been processed.
pub trait SupervisorObserver {
    fn on_time_advanced(&mut self, time: f64, devices: &mut dyn Iterator<Item = &Device>);

    /// Runs once after every device has finished.
    fn on_finish(&mut self, _end_time: f64, _devices: &mut dyn Iterator<Item = &Device>) {}
}

/// Power levels of one device at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFlowSample {
    pub time: f64,
    pub device_id: String,
    pub power_in: f64,
    pub power_out: f64,
}

/// Records every device's power levels at each clock advance.
///
/// Clones share the same buffer, so keep one and hand another to the
/// supervisor.
#[derive(Debug, Clone, Default)]
pub struct PowerFlowRecorder {
    samples: Arc<Mutex<Vec<PowerFlowSample>>>,
}

impl PowerFlowRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the samples recorded so far.
    pub fn samples(&self) -> Vec<PowerFlowSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, time: f64, devices: &mut dyn Iterator<Item = &Device>) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.extend(devices.map(|d| PowerFlowSample {
            time,
            device_id: d.id().to_string(),
            power_in: d.core().power_in(),
            power_out: d.core().power_out(),
        }));
    }
}

impl SupervisorObserver for PowerFlowRecorder {
    fn on_time_advanced(&mut self, time: f64, devices: &mut dyn Iterator<Item = &Device>) {
        self.record(time, devices);
    }

    fn on_finish(&mut self, end_time: f64, devices: &mut dyn Iterator<Item = &Device>) {
        self.record(end_time, devices);
    }
}
