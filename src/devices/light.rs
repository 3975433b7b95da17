//! Dimmable light load curve.

use serde::Deserialize;

use super::core::DeviceCore;
use super::eud::LoadCurve;

/// A light that dims linearly as price rises and shuts off above a cutoff.
///
/// Power levels are fractions of `max_operating_power`; prices are per
/// energy unit as broadcast by the grid controller.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Light {
    pub max_operating_power: f64,
    pub power_level_max: f64,
    pub power_level_low: f64,
    pub price_dim_start: f64,
    pub price_dim_end: f64,
    pub price_off: f64,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            max_operating_power: 100.0,
            power_level_max: 1.0,
            power_level_low: 0.2,
            price_dim_start: 0.1,
            price_dim_end: 0.2,
            price_off: 0.3,
        }
    }
}

impl Light {
    /// Fraction of full brightness when drawing `power_in` watts.
    pub fn brightness(&self, power_in: f64) -> f64 {
        if self.max_operating_power > 0.0 {
            power_in / self.max_operating_power
        } else {
            0.0
        }
    }
}

impl LoadCurve for Light {
    fn device_type(&self) -> &'static str {
        "light"
    }

    fn desired_power_level(&self, price: f64, in_operation: bool) -> f64 {
        if !in_operation {
            return 0.0;
        }
        let level = if price <= self.price_dim_start {
            self.power_level_max
        } else if price <= self.price_dim_end {
            let ratio = (price - self.price_dim_start) / (self.price_dim_end - self.price_dim_start);
            self.power_level_max - (self.power_level_max - self.power_level_low) * ratio
        } else if price <= self.price_off {
            self.power_level_low
        } else {
            0.0
        };
        level * self.max_operating_power
    }

    fn on_power_changed(&self, core: &DeviceCore, power_in: f64) {
        let brightness = self.brightness(power_in);
        core.log(
            "brightness",
            format!("brightness changed to {brightness}"),
            Some(brightness),
        );
    }
}
