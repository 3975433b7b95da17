//! CSV export for notations, power flow and demand curves.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::PowerFlowSample;
use crate::telemetry::Notation;

const NOTATION_HEADER: [&str; 5] = ["time_s", "device_id", "tag", "message", "value"];
const POWER_FLOW_HEADER: [&str; 4] = ["time_s", "device_id", "power_in_w", "power_out_w"];
const DEMAND_HEADER: [&str; 2] = ["price", "demand_w"];

fn create(path: &Path) -> io::Result<io::BufWriter<File>> {
    Ok(io::BufWriter::new(File::create(path)?))
}

/// Exports device notations to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_notations(notations: &[Notation], path: &Path) -> io::Result<()> {
    write_notations(notations, create(path)?)
}

/// Writes device notations as CSV to any writer, one row per notation in
/// emission order. Notations without a value leave the last column empty.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_notations(notations: &[Notation], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(NOTATION_HEADER)?;
    for n in notations {
        wtr.write_record(&[
            format!("{:.3}", n.time),
            n.device_id.clone(),
            n.tag.clone(),
            n.message.clone(),
            n.value.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Exports power-flow samples to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_power_flow(samples: &[PowerFlowSample], path: &Path) -> io::Result<()> {
    write_power_flow(samples, create(path)?)
}

/// Writes power-flow samples as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_power_flow(samples: &[PowerFlowSample], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(POWER_FLOW_HEADER)?;
    for s in samples {
        wtr.write_record(&[
            format!("{:.3}", s.time),
            s.device_id.clone(),
            format!("{:.4}", s.power_in),
            format!("{:.4}", s.power_out),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Exports a `(price, demand)` curve to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_demand_curve(curve: &[(f64, f64)], path: &Path) -> io::Result<()> {
    write_demand_curve(curve, create(path)?)
}

/// Writes a `(price, demand)` curve as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_demand_curve(curve: &[(f64, f64)], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(DEMAND_HEADER)?;
    for (price, demand) in curve {
        wtr.write_record(&[format!("{price:.4}"), format!("{demand:.4}")])?;
    }
    wtr.flush()?;
    Ok(())
}
