//! Devices: the base agent and its variants.

pub mod core;
pub mod device;
/// End-use device family and the load-curve hook.
pub mod eud;
pub mod fixed_consumption;
/// Grid controller variant.
pub mod grid_controller;
/// Price-dimmed light load curve.
pub mod light;
pub mod types;
pub mod utility_meter;

// Re-export the main types for convenience
pub use self::core::DeviceCore;
pub use device::{Device, DeviceBuilder};
pub use eud::{Eud, LoadCurve, send_request};
pub use fixed_consumption::FixedConsumption;
pub use grid_controller::GridController;
pub use light::Light;
pub use types::{Context, DeviceBehavior, EventRegistrar};
pub use utility_meter::UtilityMeter;
