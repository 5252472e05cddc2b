use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use imu_calibration::{CalibrationPipeline, CalibrationSettings, Recording};

/// Derive accelerometer, magnetometer and gyroscope calibration from a recording
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the JSON recording
    input: PathBuf,

    /// TOML settings file; command-line overrides take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recording sample rate in Hz
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Gyroscope overflow culling threshold in rotations per second
    #[arg(long)]
    overflow_threshold: Option<f64>,

    /// Polar divisions for cloud regularization (0 disables it)
    #[arg(long)]
    regularization_divisions: Option<usize>,

    /// Fixed-point divisor applied to every raw value
    #[arg(long)]
    input_precision: Option<f64>,

    /// Write the calibration to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn load_settings(args: &Args) -> anyhow::Result<CalibrationSettings> {
    let mut settings = match args.config.as_ref() {
        Some(path) => CalibrationSettings::from_toml_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => CalibrationSettings::default(),
    };

    if let Some(rate) = args.sample_rate {
        settings.gyro.sample_rate = rate;
    }
    if let Some(threshold) = args.overflow_threshold {
        settings.gyro.overflow_threshold = threshold;
    }
    if let Some(divisions) = args.regularization_divisions {
        settings.ellipsoid.regularization_divisions = divisions;
    }
    if let Some(precision) = args.input_precision {
        settings.input_precision = precision;
    }

    settings.validate()?;
    Ok(settings)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = load_settings(&args)?;
    log::debug!("Settings: {settings:?}");

    let recording = Recording::from_path(&args.input, settings.input_precision)
        .with_context(|| format!("reading recording {}", args.input.display()))?;
    log::info!("Loaded {} samples from {}", recording.len(), args.input.display());

    let result = CalibrationPipeline::new(settings).run_recording(&recording)?;

    let report = result.gyro.report;
    log::info!(
        "Gyro points culled by overflow protection: {} of {}",
        report.culled,
        report.pairs
    );
    if report.degenerate > 0 {
        log::warn!("Pairs with parallel reference vectors: {}", report.degenerate);
    }
    log::info!("Gyro mean squared residual: {:.6}", report.mean_squared_residual);

    let json = if args.pretty {
        serde_json::to_string_pretty(&result.output)?
    } else {
        serde_json::to_string(&result.output)?
    };

    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            log::info!("Calibration written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
