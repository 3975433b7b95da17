//! Core simulation types: device identifiers and time units.

use std::borrow::Borrow;
use std::fmt;

/// Seconds in one simulated hour. Local clocks run in seconds; energy is
/// reported in watt-hours.
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Identifier prefix of grid controllers.
pub const GRID_CONTROLLER_PREFIX: &str = "gc";
/// Identifier prefix of end-use (consuming) devices.
pub const EUD_PREFIX: &str = "eud";
/// Identifier prefix of utility meters.
pub const UTILITY_METER_PREFIX: &str = "um";

/// Converts an hour offset to simulation seconds.
pub fn hours_to_seconds(hours: f64) -> f64 {
    hours * SECONDS_PER_HOUR
}

/// Unique device identifier.
///
/// The prefix before the first `_` encodes the device kind (`gc_1`,
/// `eud_4`, `um_main`), so peers can be located by kind without asking the
/// supervisor.
///
/// # Examples
///
/// ```
/// use lpdm_sim::sim::types::DeviceId;
///
/// let id = DeviceId::from("eud_light_2");
/// assert_eq!(id.prefix(), "eud");
/// assert!(id.has_prefix("eud"));
/// assert!(!id.has_prefix("gc"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the kind prefix (text before the first `_`, or the whole id).
    pub fn prefix(&self) -> &str {
        self.0.split('_').next().unwrap_or(&self.0)
    }

    /// Returns `true` if the kind prefix equals `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefix() == prefix
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
