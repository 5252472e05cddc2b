//! Error types for the calibration library

use thiserror::Error;

/// Errors raised while loading a recording or fitting calibration parameters
///
/// Input-shape problems are reported eagerly with a descriptive variant.
/// Degenerate geometry inside a fit (zero vectors, parallel reference
/// vectors) is handled by total functions and never surfaces here, except
/// when a linear system has no solution at all.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Stream length mismatch: accel={accel}, mag={mag}, gyro={gyro}")]
    LengthMismatch { accel: usize, mag: usize, gyro: usize },

    #[error("Point clouds differ in length: from={from}, to={to}")]
    CloudMismatch { from: usize, to: usize },

    #[error("Not enough samples for {stage}: need at least {required}, got {actual}")]
    InsufficientSamples {
        stage: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("Degenerate fit: {0}")]
    DegenerateFit(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recording parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, CalibrationError>;
