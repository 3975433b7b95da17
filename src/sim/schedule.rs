//! Device schedules described as data.

use serde::Deserialize;

use crate::error::SimError;

use super::event::Operation;
use super::types::hours_to_seconds;

/// One scheduled operation at an hour offset from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEntry {
    /// Hour offset (fractional hours allowed).
    pub hour: f64,
    /// Operation to run.
    pub operation: Operation,
}

impl ScheduleEntry {
    /// Creates an entry.
    pub fn new(hour: f64, operation: Operation) -> Self {
        Self { hour, operation }
    }

    /// Resolves an `(hour, operation_name)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownOperation`] if the name is not a known
    /// operation tag.
    pub fn parse(hour: f64, operation_name: &str) -> Result<Self, SimError> {
        Ok(Self::new(hour, operation_name.parse()?))
    }

    /// Absolute fire time in seconds.
    pub fn time_seconds(&self) -> f64 {
        hours_to_seconds(self.hour)
    }
}

/// Resolves a list of `(hour, operation_name)` pairs, failing on the first
/// unknown tag.
///
/// # Errors
///
/// Returns [`SimError::UnknownOperation`] for an unrecognized name.
pub fn parse_schedule(pairs: &[(f64, &str)]) -> Result<Vec<ScheduleEntry>, SimError> {
    pairs
        .iter()
        .map(|&(hour, name)| ScheduleEntry::parse(hour, name))
        .collect()
}
