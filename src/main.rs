//! Phasecollect - coherent dual-radio capture
//!
//! Entry point for the command-line tool.

use anyhow::{bail, Context, Result};
use phasecollect::capture::csv;
use phasecollect::{
    estimate_phase, estimate_sample_offsets, CaptureSession, PhaseStore, PhaseVector,
    SessionConfig, SimSignal, SimulatedRadio,
};
use std::path::PathBuf;
use tracing::{info, warn};

/// Largest sample lag searched when checking alignment
const MAX_LAG: usize = 64;

/// Offsets injected by `simulate` unless `--phases` is given
const DEFAULT_PHASES: [f64; 4] = [0.0, 0.262, 0.524, 0.785];

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("phasecollect=info".parse()?)
                .add_directive("phasecollect_core=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "simulate" => simulate(&args[1..]),
        "estimate" => estimate(&args[1..]),
        "config" => config(&args[1..]),
        "--version" | "-v" => {
            println!("phasecollect {} ({})", phasecollect::VERSION, phasecollect::BUILD_DATE);
            Ok(())
        }
        "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Usage: phasecollect COMMAND [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  simulate              Run captures on the simulated radio pair");
    println!("    -c, --config FILE   Session config (default: {})", SessionConfig::path().display());
    println!("    -o, --csv FILE      Append every capture to FILE");
    println!("    -n, --repeat N      Number of captures (default: 1)");
    println!("    -p, --phases A,B,C,D  Phase of each channel in radians");
    println!("        --concurrent    Issue receive and fire from two threads");
    println!("  estimate FILE         Estimate phase offsets of a capture CSV");
    println!("  config                Print the effective session config");
    println!("    -c, --config FILE   Read FILE instead of the default path");
    println!("    -w, --write FILE    Save the effective config to FILE");
    println!();
    println!("  -v, --version         Show version");
    println!("  -h, --help            Show this help");
    println!();
    println!("Log verbosity follows RUST_LOG, e.g. RUST_LOG=phasecollect_core=debug");
}

/// Value following an option flag
fn option_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    match args.get(i + 1) {
        Some(value) => Ok(value),
        None => bail!("{} requires a value", flag),
    }
}

fn load_config(path: Option<PathBuf>) -> SessionConfig {
    match path {
        Some(path) => SessionConfig::load_from(&path),
        None => SessionConfig::load(),
    }
}

fn parse_phases(value: &str) -> Result<[f64; 4]> {
    let parsed = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid phase list: {}", value))?;
    match <[f64; 4]>::try_from(parsed) {
        Ok(phases) => Ok(phases),
        Err(v) => bail!("expected 4 phases, got {}", v.len()),
    }
}

fn simulate(args: &[String]) -> Result<()> {
    let mut config_path = None;
    let mut csv_path = None;
    let mut concurrent = false;
    let mut repeat = 1usize;
    let mut phases = DEFAULT_PHASES;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(option_value(args, i, "--config")?));
                i += 2;
            }
            "--csv" | "-o" => {
                csv_path = Some(PathBuf::from(option_value(args, i, "--csv")?));
                i += 2;
            }
            "--repeat" | "-n" => {
                let value = option_value(args, i, "--repeat")?;
                repeat = value
                    .parse()
                    .with_context(|| format!("invalid repeat count: {}", value))?;
                i += 2;
            }
            "--phases" | "-p" => {
                phases = parse_phases(option_value(args, i, "--phases")?)?;
                i += 2;
            }
            "--concurrent" => {
                concurrent = true;
                i += 1;
            }
            other => bail!("unknown simulate option: {}", other),
        }
    }

    let mut config = load_config(config_path);
    if csv_path.is_some() {
        config.csv_path = csv_path;
    }
    config.concurrent |= concurrent;
    config.validate()?;

    let (master, slave) = SimulatedRadio::pair(SimSignal::default());
    master.set_phase_offsets([phases[0], phases[1]]);
    slave.set_phase_offsets([phases[2], phases[3]]);
    let injected = PhaseVector::from_array(phases.map(|p| p - phases[0]));

    info!(
        repeat,
        concurrent = config.concurrent,
        num_samples = config.stream.num_samples,
        "Starting simulated capture"
    );

    let mut session = CaptureSession::from_config(&master, &slave, &config);
    let mut store = PhaseStore::new();

    for run in 1..=repeat {
        let capture = if config.concurrent {
            session.acquire_concurrent()
        } else {
            session.acquire()
        }
        .with_context(|| format!("capture {} failed", run))?;

        if let Some(path) = &config.csv_path {
            let rows = capture.write_csv(path)?;
            info!(path = %path.display(), rows, "Capture appended");
        }

        let channels = capture.demux()?;
        let offsets = estimate_sample_offsets(&channels, MAX_LAG)?;
        if !offsets.is_aligned() {
            warn!(lags = ?offsets.lags, "Capture {} is not sample-aligned", run);
        }

        let estimate = estimate_phase(&channels)?;
        println!("capture {:>3}: {}", run, estimate);
        store.record(estimate);
    }

    if let Some(summary) = store.summary() {
        println!();
        println!("injected:      {}", injected);
        println!("median of {:>3}: {}", summary.count, summary.median());
        if summary.count > 1 {
            println!("mean:          {}", summary.mean());
        }
    }
    Ok(())
}

fn estimate(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("estimate requires a CSV file");
    };
    let path = PathBuf::from(path);

    let channels = csv::read_csv(&path).with_context(|| format!("reading {}", path.display()))?;
    let offsets = estimate_sample_offsets(&channels, MAX_LAG)?;
    let estimate = estimate_phase(&channels)?;

    println!("pairs:       {}", channels.pairs());
    println!("phase:       {}", estimate);
    println!("sample lags: {:?}", offsets.lags);
    println!(
        "confidence:  [{:.3}, {:.3}, {:.3}, {:.3}]",
        offsets.confidence[0], offsets.confidence[1], offsets.confidence[2], offsets.confidence[3]
    );
    Ok(())
}

fn config(args: &[String]) -> Result<()> {
    let mut config_path = None;
    let mut write_path = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(option_value(args, i, "--config")?));
                i += 2;
            }
            "--write" | "-w" => {
                write_path = Some(PathBuf::from(option_value(args, i, "--write")?));
                i += 2;
            }
            other => bail!("unknown config option: {}", other),
        }
    }

    let config = load_config(config_path);
    if let Err(e) = config.validate() {
        warn!(error = %e, "Session config is not valid");
    }
    println!("{}", serde_json::to_string_pretty(&config)?);

    if let Some(path) = write_path {
        config.save(&path)?;
    }
    Ok(())
}
