//! LPDM simulator entry point: CLI wiring and config-driven runs.

use std::path::Path;
use std::process;

use tracing_subscriber::EnvFilter;

use lpdm_sim::config::ScenarioConfig;
use lpdm_sim::io::export::{export_demand_curve, export_notations, export_power_flow};
use lpdm_sim::runner::run_scenario;

/// Preset used when neither `--scenario` nor `--preset` is given.
const DEFAULT_PRESET: &str = "single_light";

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    notations_out: Option<String>,
    power_flow_out: Option<String>,
    demand_out: Option<String>,
}

fn print_help() {
    eprintln!("lpdm-sim: price-based local power distribution simulator");
    eprintln!();
    eprintln!("Usage: lpdm-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>         Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>           Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --notations-out <path>    Export device notations to CSV");
    eprintln!("  --power-flow-out <path>   Export the power-flow time series to CSV");
    eprintln!("  --demand-out <path>       Export the demand curve to CSV");
    eprintln!("  --help                    Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the {DEFAULT_PRESET} preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

/// Returns the value following flag `args[*i]`, advancing `i`.
fn flag_value(args: &[String], i: &mut usize, what: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {} requires a {what} argument", args[*i - 1]);
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        notations_out: None,
        power_flow_out: None,
        demand_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(flag_value(&args, &mut i, "path")),
            "--preset" => cli.preset = Some(flag_value(&args, &mut i, "name")),
            "--notations-out" => cli.notations_out = Some(flag_value(&args, &mut i, "path")),
            "--power-flow-out" => cli.power_flow_out = Some(flag_value(&args, &mut i, "path")),
            "--demand-out" => cli.demand_out = Some(flag_value(&args, &mut i, "path")),
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.scenario_path.is_some() && cli.preset.is_some() {
        eprintln!("error: --scenario and --preset are mutually exclusive");
        process::exit(1);
    }

    cli
}

fn write_or_exit(result: std::io::Result<()>, what: &str, path: &str) {
    if let Err(e) = result {
        eprintln!("error: failed to write {what} CSV: {e}");
        process::exit(1);
    }
    eprintln!("{what} written to {path}");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();

    // Load config: --scenario takes priority, then --preset, then the default preset
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else {
        ScenarioConfig::from_preset(cli.preset.as_deref().unwrap_or(DEFAULT_PRESET))
    };
    let scenario = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let result = match run_scenario(&scenario) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: simulation failed: {e}");
            process::exit(1);
        }
    };

    println!("{}", result.report);
    println!("Events processed:  {}", result.events_processed);
    if !result.is_balanced(scenario.simulation.tolerance_wh) {
        println!(
            "warning: imbalance exceeds tolerance of {} Wh",
            scenario.simulation.tolerance_wh
        );
    }

    if let Some(ref path) = cli.notations_out {
        write_or_exit(export_notations(&result.notations, Path::new(path)), "Notations", path);
    }
    if let Some(ref path) = cli.power_flow_out {
        write_or_exit(export_power_flow(&result.power_flow, Path::new(path)), "Power flow", path);
    }
    if let Some(ref path) = cli.demand_out {
        write_or_exit(export_demand_curve(&result.demand_curve, Path::new(path)), "Demand curve", path);
    }
}
