//! End-to-end calibration of a recorded motion sequence

use nalgebra::Vector3;

use crate::ellipsoid::{EllipsoidFit, MIN_ELLIPSOID_SAMPLES, fit_ellipsoid};
use crate::error::{CalibrationError, Result};
use crate::gyro::{GyroReconciler, GyroReconciliation};
use crate::recording::Recording;
use crate::types::{CalibrationOutput, CalibrationSettings};

/// Everything the pipeline derives from a recording
///
/// `output` is the calibration artifact; the per-sensor fits carry the
/// corrected streams and diagnostics for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub output: CalibrationOutput,
    pub accel: EllipsoidFit,
    pub mag: EllipsoidFit,
    pub gyro: GyroReconciliation,
}

/// Accelerometer, magnetometer and gyroscope calibration in sequence
///
/// The accelerometer and magnetometer are fit independently; the gyroscope
/// is then reconciled against their corrected streams.
///
/// # Example
/// ```no_run
/// use imu_calibration::{CalibrationPipeline, CalibrationSettings, Recording};
///
/// let settings = CalibrationSettings::default();
/// let recording = Recording::from_path("calibration.json", settings.input_precision)?;
///
/// let result = CalibrationPipeline::new(settings).run_recording(&recording)?;
/// println!("{}", serde_json::to_string_pretty(&result.output)?);
/// println!("culled gyro pairs: {}", result.gyro.report.culled);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationPipeline {
    settings: CalibrationSettings,
}

impl CalibrationPipeline {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> CalibrationSettings {
        self.settings
    }

    /// Calibrate all three sensors from equal-length raw streams
    ///
    /// # Arguments
    /// * `accel` - Raw accelerometer readings
    /// * `mag` - Raw magnetometer readings
    /// * `gyro` - Raw gyroscope readings, axis scaled by rate
    pub fn run(
        &self,
        accel: &[Vector3<f64>],
        mag: &[Vector3<f64>],
        gyro: &[Vector3<f64>],
    ) -> Result<CalibrationResult> {
        self.settings.validate()?;
        if accel.len() != mag.len() || accel.len() != gyro.len() {
            return Err(CalibrationError::LengthMismatch {
                accel: accel.len(),
                mag: mag.len(),
                gyro: gyro.len(),
            });
        }
        if accel.len() < MIN_ELLIPSOID_SAMPLES {
            return Err(CalibrationError::InsufficientSamples {
                stage: "calibration",
                required: MIN_ELLIPSOID_SAMPLES,
                actual: accel.len(),
            });
        }

        let accel_fit = fit_ellipsoid(accel, &self.settings.ellipsoid)?;
        log::debug!("Accelerometer fit: {:?}", accel_fit.record);

        let mag_fit = fit_ellipsoid(mag, &self.settings.ellipsoid)?;
        log::debug!("Magnetometer fit: {:?}", mag_fit.record);

        let gyro_fit = GyroReconciler::new(self.settings.gyro).reconcile(
            &accel_fit.fitted,
            &mag_fit.fitted,
            gyro,
        )?;
        log::debug!("Gyroscope fit: {:?}", gyro_fit.record);

        Ok(CalibrationResult {
            output: CalibrationOutput {
                accel: accel_fit.record,
                mag: mag_fit.record,
                gyro: gyro_fit.record,
            },
            accel: accel_fit,
            mag: mag_fit,
            gyro: gyro_fit,
        })
    }

    /// Calibrate from a loaded recording
    pub fn run_recording(&self, recording: &Recording) -> Result<CalibrationResult> {
        self.run(&recording.accel, &recording.mag, &recording.gyro)
    }
}
