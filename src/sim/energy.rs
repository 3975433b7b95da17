//! End-of-run energy totals and the global balance check.

use std::fmt;

use crate::devices::Device;

/// Energy accumulated by one device over the run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEnergy {
    pub device_id: String,
    pub device_type: &'static str,
    /// Energy received (Wh).
    pub energy_in_wh: f64,
    /// Energy delivered (Wh).
    pub energy_out_wh: f64,
}

/// Totals across every device once the run has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyReport {
    /// Simulation end time (s).
    pub end_time: f64,
    pub devices: Vec<DeviceEnergy>,
    /// Sum of energy received by all devices (Wh).
    pub total_in_wh: f64,
    /// Sum of energy delivered by all devices (Wh).
    pub total_out_wh: f64,
}

impl EnergyReport {
    /// Collects per-device energies from finished devices.
    pub fn from_devices<'a>(end_time: f64, devices: impl IntoIterator<Item = &'a Device>) -> Self {
        let devices: Vec<DeviceEnergy> = devices
            .into_iter()
            .map(|d| DeviceEnergy {
                device_id: d.id().to_string(),
                device_type: d.device_type(),
                energy_in_wh: d.core().energy_in(),
                energy_out_wh: d.core().energy_out(),
            })
            .collect();
        let total_in_wh = devices.iter().map(|d| d.energy_in_wh).sum();
        let total_out_wh = devices.iter().map(|d| d.energy_out_wh).sum();
        Self {
            end_time,
            devices,
            total_in_wh,
            total_out_wh,
        }
    }

    /// Energy received minus energy delivered (Wh).
    pub fn imbalance_wh(&self) -> f64 {
        self.total_in_wh - self.total_out_wh
    }

    /// Whether the totals agree within `tolerance_wh`.
    pub fn is_balanced(&self, tolerance_wh: f64) -> bool {
        self.imbalance_wh().abs() <= tolerance_wh
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceEnergy> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }
}

impl fmt::Display for EnergyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Energy Report ({:.0} s) ---", self.end_time)?;
        for d in &self.devices {
            writeln!(
                f,
                "{:<12} {:<18} in {:>10.3} Wh   out {:>10.3} Wh",
                d.device_id, d.device_type, d.energy_in_wh, d.energy_out_wh
            )?;
        }
        writeln!(f, "Total energy in:   {:.3} Wh", self.total_in_wh)?;
        writeln!(f, "Total energy out:  {:.3} Wh", self.total_out_wh)?;
        write!(f, "Imbalance:         {:.6} Wh", self.imbalance_wh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(pairs: &[(f64, f64)]) -> EnergyReport {
        let devices: Vec<DeviceEnergy> = pairs
            .iter()
            .enumerate()
            .map(|(i, &(energy_in_wh, energy_out_wh))| DeviceEnergy {
                device_id: format!("eud_{i}"),
                device_type: "light",
                energy_in_wh,
                energy_out_wh,
            })
            .collect();
        EnergyReport {
            end_time: 3600.0,
            total_in_wh: devices.iter().map(|d| d.energy_in_wh).sum(),
            total_out_wh: devices.iter().map(|d| d.energy_out_wh).sum(),
            devices,
        }
    }

    #[test]
    fn balanced_within_tolerance() {
        let r = report(&[(50.0, 0.0), (0.0, 49.9995)]);
        assert!(r.is_balanced(1e-3));
        assert!(!r.is_balanced(1e-6));
        assert!((r.imbalance_wh() - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn display_lists_devices_and_totals() {
        let s = report(&[(50.0, 0.0), (0.0, 50.0)]).to_string();
        assert!(s.contains("eud_0"));
        assert!(s.contains("Total energy in:   50.000 Wh"));
        assert!(s.contains("Imbalance"));
    }
}
