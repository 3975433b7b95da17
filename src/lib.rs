//! Discrete-event simulator for price-based local power distribution.
//!
//! Devices (grid controllers, utility meters, end-use loads) negotiate power
//! and price by message while a [`sim::Supervisor`] advances one global
//! clock to the next pending event.

/// TOML scenario configuration and presets.
pub mod config;
pub mod devices;
pub mod error;
pub mod io;
/// Scenario construction and the driving loop.
pub mod runner;
/// Simulation kernel: queue, messages, events, supervisor.
pub mod sim;
pub mod telemetry;

pub use error::SimError;
