//! TOML-based scenario configuration and preset definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::devices::{
    DeviceBehavior, Eud, FixedConsumption, GridController, Light, UtilityMeter,
};
use crate::sim::event::Operation;
use crate::sim::schedule::ScheduleEntry;
use crate::sim::types::{
    EUD_PREFIX, GRID_CONTROLLER_PREFIX, UTILITY_METER_PREFIX, hours_to_seconds,
};

/// Price used by grid controllers and utility meters that set none.
pub const DEFAULT_PRICE: f64 = 0.1;

/// Top-level scenario configuration parsed from TOML.
///
/// Load from TOML with [`ScenarioConfig::from_toml_file`] or pick a
/// built-in with [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Run length and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Every device in the network.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Run length and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Simulated duration in hours (must be > 0).
    pub hours: f64,
    /// Allowed difference between total energy in and out (Wh).
    pub tolerance_wh: f64,
    /// Prices at which the demand curve is sampled.
    pub demand_prices: Vec<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            hours: 24.0,
            tolerance_wh: 1e-6,
            demand_prices: (0..=8).map(|i| f64::from(i) * 0.05).collect(),
        }
    }
}

/// Device variant selected by `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    GridController,
    UtilityMeter,
    Light,
    FixedConsumption,
}

impl DeviceKind {
    /// Identifier prefix devices of this kind must carry.
    pub fn id_prefix(self) -> &'static str {
        match self {
            DeviceKind::GridController => GRID_CONTROLLER_PREFIX,
            DeviceKind::UtilityMeter => UTILITY_METER_PREFIX,
            DeviceKind::Light | DeviceKind::FixedConsumption => EUD_PREFIX,
        }
    }
}

/// One device entry (`[[devices]]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Kind-prefixed identifier, e.g. `"gc_1"` or `"eud_4"`.
    pub id: String,
    pub kind: DeviceKind,
    /// Message read latency (s).
    #[serde(default)]
    pub latency: f64,
    /// Initial local time (s).
    #[serde(default)]
    pub time: f64,
    /// Peers this device registers with at start.
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    /// Price for grid controllers and utility meters.
    #[serde(default)]
    pub price: Option<f64>,
    /// Constant draw for fixed consumption devices (W).
    #[serde(default)]
    pub power: Option<f64>,
    /// Load curve parameters for lights.
    #[serde(default)]
    pub light: Option<Light>,
}

impl DeviceConfig {
    /// The device behavior this entry describes.
    pub fn behavior(&self) -> Box<dyn DeviceBehavior> {
        let price = self.price.unwrap_or(DEFAULT_PRICE);
        match self.kind {
            DeviceKind::GridController => Box::new(GridController::new(price)),
            DeviceKind::UtilityMeter => Box::new(UtilityMeter::new(price)),
            DeviceKind::Light => Box::new(Eud::new(self.light.unwrap_or_default())),
            DeviceKind::FixedConsumption => {
                Box::new(Eud::new(FixedConsumption::new(self.power.unwrap_or(0.0))))
            }
        }
    }

    /// Creates an entry with defaults for everything but id and kind.
    pub fn new(id: &str, kind: DeviceKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            latency: 0.0,
            time: 0.0,
            connections: Vec::new(),
            schedule: Vec::new(),
            price: None,
            power: None,
            light: None,
        }
    }

    pub fn connect(mut self, peers: &[&str]) -> Self {
        self.connections = peers.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn schedule(mut self, entries: &[(f64, Operation)]) -> Self {
        self.schedule = entries
            .iter()
            .map(|&(hour, op)| ScheduleEntry::new(hour, op))
            .collect();
        self
    }

    pub fn latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, Error)]
#[error("config error: {field} - {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"devices[2].latency"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// One light behind a grid controller fed by a utility meter, lit from
    /// 06:00 to 18:00.
    pub fn single_light() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            devices: vec![
                DeviceConfig::new("um_1", DeviceKind::UtilityMeter).price(0.1),
                DeviceConfig::new("gc_1", DeviceKind::GridController).connect(&["um_1"]),
                DeviceConfig::new("eud_1", DeviceKind::Light)
                    .connect(&["gc_1"])
                    .schedule(&[(6.0, Operation::TurnOn), (18.0, Operation::TurnOff)]),
            ],
        }
    }

    /// A small office: three lights on staggered hours, an always-on
    /// server rack and a desk load, with non-zero message latencies.
    pub fn office() -> Self {
        Self {
            simulation: SimulationConfig {
                tolerance_wh: 0.05,
                ..SimulationConfig::default()
            },
            devices: vec![
                DeviceConfig::new("um_1", DeviceKind::UtilityMeter).price(0.15),
                DeviceConfig::new("gc_1", DeviceKind::GridController)
                    .latency(0.1)
                    .connect(&["um_1"]),
                DeviceConfig::new("eud_1", DeviceKind::Light)
                    .connect(&["gc_1"])
                    .schedule(&[(7.0, Operation::TurnOn), (19.0, Operation::TurnOff)]),
                DeviceConfig::new("eud_2", DeviceKind::Light)
                    .latency(0.2)
                    .connect(&["gc_1"])
                    .schedule(&[(8.5, Operation::TurnOn), (17.5, Operation::TurnOff)]),
                DeviceConfig {
                    light: Some(Light {
                        max_operating_power: 60.0,
                        ..Light::default()
                    }),
                    ..DeviceConfig::new("eud_3", DeviceKind::Light)
                        .connect(&["gc_1"])
                        .schedule(&[(9.0, Operation::TurnOn), (12.0, Operation::TurnOff)])
                },
                DeviceConfig::new("eud_4", DeviceKind::FixedConsumption)
                    .power(250.0)
                    .connect(&["gc_1"])
                    .schedule(&[(0.0, Operation::TurnOn)]),
                DeviceConfig::new("eud_5", DeviceKind::FixedConsumption)
                    .power(80.0)
                    .latency(0.5)
                    .connect(&["gc_1"])
                    .schedule(&[
                        (9.0, Operation::TurnOn),
                        (12.0, Operation::TurnOff),
                        (13.0, Operation::TurnOn),
                        (17.0, Operation::TurnOff),
                    ]),
            ],
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["single_light", "office"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "single_light" => Ok(Self::single_light()),
            "office" => Ok(Self::office()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Simulation end time in seconds.
    pub fn end_time(&self) -> f64 {
        hours_to_seconds(self.simulation.hours)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if !(s.hours > 0.0 && s.hours.is_finite()) {
            errors.push(ConfigError::new("simulation.hours", "must be > 0"));
        }
        if !non_negative(s.tolerance_wh) {
            errors.push(ConfigError::new("simulation.tolerance_wh", "must be >= 0"));
        }
        if self.devices.is_empty() {
            errors.push(ConfigError::new("devices", "at least one device is required"));
        }

        let mut ids = BTreeSet::new();
        for (i, d) in self.devices.iter().enumerate() {
            if !ids.insert(d.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("devices[{i}].id"),
                    format!("duplicate id \"{}\"", d.id),
                ));
            }
        }

        for (i, d) in self.devices.iter().enumerate() {
            validate_device(i, d, &ids, self.end_time(), &mut errors);
        }
        validate_start_times(&self.devices, &mut errors);

        errors
    }
}

fn validate_device(
    i: usize,
    d: &DeviceConfig,
    ids: &BTreeSet<&str>,
    end_time: f64,
    errors: &mut Vec<ConfigError>,
) {
    let field = |name: &str| format!("devices[{i}].{name}");
    let prefix = d.kind.id_prefix();

    if d.id.split('_').next() != Some(prefix) {
        errors.push(ConfigError::new(
            field("id"),
            format!("\"{}\" must start with \"{prefix}_\"", d.id),
        ));
    }
    if !non_negative(d.latency) {
        errors.push(ConfigError::new(field("latency"), "must be >= 0"));
    }
    if !non_negative(d.time) || d.time > end_time {
        errors.push(ConfigError::new(field("time"), "must be within the run"));
    }

    for peer in &d.connections {
        if peer == &d.id {
            errors.push(ConfigError::new(field("connections"), "cannot connect to itself"));
        } else if !ids.contains(peer.as_str()) {
            errors.push(ConfigError::new(
                field("connections"),
                format!("unknown device \"{peer}\""),
            ));
        }
    }

    let behavior = d.behavior();
    for (j, entry) in d.schedule.iter().enumerate() {
        if !behavior.supports(entry.operation) {
            errors.push(ConfigError::new(
                format!("devices[{i}].schedule[{j}].operation"),
                format!("{:?} devices cannot {}", d.kind, entry.operation),
            ));
        }
        if entry.time_seconds() < d.time || !entry.hour.is_finite() {
            errors.push(ConfigError::new(
                format!("devices[{i}].schedule[{j}].hour"),
                "must not be before the device's initial time",
            ));
        }
    }

    match d.kind {
        DeviceKind::GridController | DeviceKind::UtilityMeter => {
            if d.price.is_some_and(|p| !non_negative(p)) {
                errors.push(ConfigError::new(field("price"), "must be >= 0"));
            }
        }
        _ if d.price.is_some() => {
            errors.push(ConfigError::new(
                field("price"),
                "only grid controllers and utility meters set a price",
            ));
        }
        _ => {}
    }

    match (d.kind, d.power) {
        (DeviceKind::FixedConsumption, None) => {
            errors.push(ConfigError::new(field("power"), "required for fixed_consumption"));
        }
        (DeviceKind::FixedConsumption, Some(p)) if !non_negative(p) => {
            errors.push(ConfigError::new(field("power"), "must be >= 0"));
        }
        (DeviceKind::FixedConsumption, Some(_)) | (_, None) => {}
        (_, Some(_)) => {
            errors.push(ConfigError::new(
                field("power"),
                "only fixed_consumption devices set a power level",
            ));
        }
    }

    match (d.kind, &d.light) {
        (DeviceKind::Light, Some(light)) => validate_light(&field("light"), light, errors),
        (_, Some(_)) => {
            errors.push(ConfigError::new(field("light"), "only lights take a light table"));
        }
        _ => {}
    }
}

/// Connected devices must start on the same clock: a message stamped by the
/// earlier peer would be read behind the later one's local time.
fn validate_start_times(devices: &[DeviceConfig], errors: &mut Vec<ConfigError>) {
    let index: BTreeMap<&str, usize> = devices
        .iter()
        .enumerate()
        .map(|(i, d)| (d.id.as_str(), i))
        .collect();

    let mut late = BTreeMap::new();
    for (i, d) in devices.iter().enumerate() {
        for peer in &d.connections {
            let Some(&j) = index.get(peer.as_str()) else {
                continue;
            };
            let (earlier, later) = if d.time < devices[j].time { (i, j) } else { (j, i) };
            if devices[later].time > devices[earlier].time {
                late.entry(later).or_insert(earlier);
            }
        }
    }

    for (later, earlier) in late {
        errors.push(ConfigError::new(
            format!("devices[{later}].time"),
            format!(
                "starts at {}s but connected device \"{}\" starts at {}s",
                devices[later].time, devices[earlier].id, devices[earlier].time
            ),
        ));
    }
}

fn non_negative(x: f64) -> bool {
    x >= 0.0 && x.is_finite()
}

fn validate_light(field: &str, light: &Light, errors: &mut Vec<ConfigError>) {
    if !non_negative(light.max_operating_power) {
        errors.push(ConfigError::new(
            format!("{field}.max_operating_power"),
            "must be >= 0",
        ));
    }
    for (name, level) in [
        ("power_level_max", light.power_level_max),
        ("power_level_low", light.power_level_low),
    ] {
        if !(0.0..=1.0).contains(&level) {
            errors.push(ConfigError::new(format!("{field}.{name}"), "must be in [0.0, 1.0]"));
        }
    }
    if !(light.price_dim_start < light.price_dim_end && light.price_dim_end <= light.price_off) {
        errors.push(ConfigError::new(
            format!("{field}.price_dim_start"),
            "must satisfy price_dim_start < price_dim_end <= price_off",
        ));
    }
}
