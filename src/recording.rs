//! Loading of recorded calibration sequences
//!
//! A recording is a JSON array of fixed-point samples taken at a constant
//! rate while the device is turned through many orientations:
//!
//! ```json
//! [
//!   {"accel": [12, -250, 30], "mag": [80, 4, -150], "gyro": [1, 0, 0], "gyro_mag": 25},
//!   ...
//! ]
//! ```
//!
//! The gyroscope is stored as a direction plus a separate magnitude. Every
//! value is divided by the input precision on load.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::Vector3Ext;

/// One recorded instant, as stored on disk
///
/// Values are fixed-point counts; integral and fractional JSON numbers are
/// both accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Accelerometer counts
    pub accel: [f64; 3],
    /// Magnetometer counts
    pub mag: [f64; 3],
    /// Gyroscope rotation axis, not necessarily unit length
    pub gyro: [f64; 3],
    /// Gyroscope rotation rate
    pub gyro_mag: f64,
}

impl RawSample {
    /// Accelerometer reading in real units
    pub fn accel(&self, precision: f64) -> Vector3<f64> {
        to_vector(self.accel, precision)
    }

    /// Magnetometer reading in real units
    pub fn mag(&self, precision: f64) -> Vector3<f64> {
        to_vector(self.mag, precision)
    }

    /// Gyroscope reading in real units, the unit axis scaled by the rate
    pub fn gyro(&self, precision: f64) -> Vector3<f64> {
        to_vector(self.gyro, precision).safe_normalize() * (self.gyro_mag / precision)
    }
}

fn to_vector(counts: [f64; 3], precision: f64) -> Vector3<f64> {
    Vector3::from(counts) / precision
}

/// Three equal-length sensor streams in real units, in recording order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recording {
    pub accel: Vec<Vector3<f64>>,
    pub mag: Vec<Vector3<f64>>,
    pub gyro: Vec<Vector3<f64>>,
}

impl Recording {
    /// Convert fixed-point samples using the given precision divisor
    ///
    /// # Example
    /// ```
    /// use imu_calibration::{RawSample, Recording};
    ///
    /// let sample = RawSample {
    ///     accel: [0.0, 0.0, 256.0],
    ///     mag: [128.0, 0.0, 0.0],
    ///     gyro: [0.0, 3.0, 4.0],
    ///     gyro_mag: 64.0,
    /// };
    /// let recording = Recording::from_samples(&[sample], 256.0);
    ///
    /// assert_eq!(recording.accel[0].z, 1.0);
    /// assert_eq!(recording.mag[0].x, 0.5);
    /// assert!((recording.gyro[0].magnitude() - 0.25).abs() < 1e-12);
    /// ```
    pub fn from_samples(samples: &[RawSample], precision: f64) -> Self {
        Self {
            accel: samples.iter().map(|s| s.accel(precision)).collect(),
            mag: samples.iter().map(|s| s.mag(precision)).collect(),
            gyro: samples.iter().map(|s| s.gyro(precision)).collect(),
        }
    }

    /// Parse a JSON recording from a reader
    pub fn from_reader<R: Read>(reader: R, precision: f64) -> Result<Self> {
        let samples: Vec<RawSample> = serde_json::from_reader(reader)?;
        log::debug!("Loaded {} samples", samples.len());
        Ok(Self::from_samples(&samples, precision))
    }

    /// Parse a JSON recording from a file
    pub fn from_path<P: AsRef<Path>>(path: P, precision: f64) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), precision)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.accel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accel.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalibrationError;

    #[test]
    fn test_from_reader_scales_by_precision() {
        let json = r#"[
            {"accel": [256, -512, 0], "mag": [0, 128, 64], "gyro": [10, 0, 0], "gyro_mag": 128},
            {"accel": [0, 0, 256], "mag": [-64, 0, 0], "gyro": [0, 0, -7], "gyro_mag": 32}
        ]"#;

        let recording = Recording::from_reader(json.as_bytes(), 256.0).unwrap();

        assert_eq!(recording.len(), 2);
        assert_eq!(recording.accel[0], Vector3::new(1.0, -2.0, 0.0));
        assert_eq!(recording.mag[0], Vector3::new(0.0, 0.5, 0.25));
        assert_eq!(recording.gyro[0], Vector3::new(0.5, 0.0, 0.0));
        assert_eq!(recording.gyro[1], Vector3::new(0.0, 0.0, -0.125));
    }

    #[test]
    fn test_zero_gyro_axis_stays_zero() {
        let sample = RawSample {
            accel: [0.0, 0.0, 1.0],
            mag: [1.0, 0.0, 0.0],
            gyro: [0.0, 0.0, 0.0],
            gyro_mag: 100.0,
        };
        assert_eq!(sample.gyro(256.0), Vector3::zeros());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let json = r#"[{"accel": [1, 2], "mag": [0, 0, 0], "gyro": [0, 0, 0], "gyro_mag": 0}]"#;
        let result = Recording::from_reader(json.as_bytes(), 256.0);
        assert!(matches!(result, Err(CalibrationError::Json(_))));
    }

    #[test]
    fn test_accepts_fractional_counts() {
        let json = r#"[{"accel": [128.5, 0, 0], "mag": [0, 0, 0], "gyro": [0, 1, 0], "gyro_mag": 0.5}]"#;
        let recording = Recording::from_reader(json.as_bytes(), 2.0).unwrap();

        assert_eq!(recording.accel[0], Vector3::new(64.25, 0.0, 0.0));
        assert_eq!(recording.gyro[0], Vector3::new(0.0, 0.25, 0.0));
    }

    #[test]
    fn test_empty_recording() {
        let recording = Recording::from_reader("[]".as_bytes(), 256.0).unwrap();
        assert!(recording.is_empty());
    }
}
