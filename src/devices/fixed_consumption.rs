//! Constant load curve.

use super::eud::LoadCurve;

/// Draws a fixed level whenever operating, whatever the price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedConsumption {
    power_level: f64,
}

impl FixedConsumption {
    pub fn new(power_level: f64) -> Self {
        Self { power_level }
    }

    pub fn power_level(&self) -> f64 {
        self.power_level
    }
}

impl LoadCurve for FixedConsumption {
    fn device_type(&self) -> &'static str {
        "fixed_consumption"
    }

    fn desired_power_level(&self, _price: f64, in_operation: bool) -> f64 {
        if in_operation { self.power_level } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_price() {
        let load = FixedConsumption::new(40.0);
        assert_eq!(load.desired_power_level(0.0, true), 40.0);
        assert_eq!(load.desired_power_level(99.0, true), 40.0);
        assert_eq!(load.desired_power_level(0.0, false), 0.0);
    }
}
