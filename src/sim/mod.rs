/// End-of-run energy accounting.
pub mod energy;
/// Scheduled events and schedulable operations.
pub mod event;
pub mod message;
pub mod observer;
/// Time-keyed priority queue with lazy deletion.
pub mod queue;
/// Device scheduling utilities.
pub mod schedule;
pub mod supervisor;
pub mod types;

pub use energy::{DeviceEnergy, EnergyReport};
pub use observer::{PowerFlowRecorder, PowerFlowSample, SupervisorObserver};
pub use supervisor::Supervisor;
