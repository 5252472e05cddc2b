//! Core types and settings for the calibration library

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::calibration::adjust;
use crate::error::{CalibrationError, Result};
use crate::math::geometric_mean;

/// Affine correction for one sensor
///
/// A fit maps a raw reading onto normalized space with
/// `((raw - center) * rescale) * normalize`. The per-axis `rescale` carries
/// the shape correction only: its components multiply to one, while the
/// overall magnitude lives in `normalize`. Keeping the two apart means a
/// gyroscope count-to-rate factor is never confused with axis asymmetry.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_calibration::FitRecord;
///
/// let fit = FitRecord::from_scale(Vector3::new(1.0, 1.0, 1.0), Vector3::new(0.5, 0.5, 0.5)).unwrap();
/// assert!((fit.normalize - 0.5).abs() < 1e-12);
/// let corrected = fit.apply(Vector3::new(3.0, 1.0, 1.0));
/// assert!((corrected - Vector3::new(1.0, 0.0, 0.0)).magnitude() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRecord {
    /// Raw-space point subtracted before scaling
    pub center: Vector3<f64>,
    /// Per-axis shape correction, volume preserving
    pub rescale: Vector3<f64>,
    /// Geometric mean of the raw per-axis scale factors
    pub normalize: f64,
}

impl FitRecord {
    /// The correction that leaves every reading untouched
    pub fn identity() -> Self {
        Self {
            center: Vector3::zeros(),
            rescale: Vector3::new(1.0, 1.0, 1.0),
            normalize: 1.0,
        }
    }

    /// Build a fit from a center and raw per-axis scale factors
    ///
    /// The geometric mean of `scale` is divided out into `normalize`.
    /// Fails when the scale factors multiply to zero or to a non-finite value,
    /// since no volume-normalized rescale exists in that case.
    pub fn from_scale(center: Vector3<f64>, scale: Vector3<f64>) -> Result<Self> {
        let normalize = geometric_mean(&scale);
        if normalize == 0.0 || !normalize.is_finite() {
            return Err(CalibrationError::DegenerateFit(format!(
                "scale factors {:?} have no finite non-zero geometric mean",
                scale.as_slice()
            )));
        }

        Ok(Self {
            center,
            rescale: scale / normalize,
            normalize,
        })
    }

    /// Per-axis gain applied after the center is removed
    pub fn sensitivity(&self) -> Vector3<f64> {
        self.rescale * self.normalize
    }

    /// Apply this fit to a single reading
    pub fn apply(&self, reading: Vector3<f64>) -> Vector3<f64> {
        adjust(reading, self)
    }
}

impl Default for FitRecord {
    fn default() -> Self {
        Self::identity()
    }
}

/// The calibration artifact, keyed by sensor
///
/// Serializes as `{"accel": {...}, "mag": {...}, "gyro": {...}}` where each
/// entry carries `center`, `rescale` and `normalize`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutput {
    pub accel: FitRecord,
    pub mag: FitRecord,
    pub gyro: FitRecord,
}

/// Ellipsoid fitting settings
///
/// # Example
/// ```
/// use imu_calibration::EllipsoidSettings;
///
/// // Fit the raw cloud directly, without sector averaging
/// let settings = EllipsoidSettings { regularization_divisions: 0 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EllipsoidSettings {
    /// Number of polar divisions used to regularize the cloud (typically 8)
    ///
    /// The sphere around the cloud is split into `divisions` polar bands and
    /// `2 * divisions` azimuth slices; every non-empty sector contributes the
    /// mean of its samples. This keeps densely sampled poses from dominating
    /// the fit. Set to 0 to fit the raw cloud. Values above
    /// [`EllipsoidSettings::MAX_REGULARIZATION_DIVISIONS`] are rejected.
    pub regularization_divisions: usize,
}

impl Default for EllipsoidSettings {
    fn default() -> Self {
        Self {
            regularization_divisions: 8,
        }
    }
}

impl EllipsoidSettings {
    /// Finest regularization grid accepted: 1024 bands by 2048 slices
    pub const MAX_REGULARIZATION_DIVISIONS: usize = 1024;

    pub fn validate(&self) -> Result<()> {
        if self.regularization_divisions > Self::MAX_REGULARIZATION_DIVISIONS {
            return Err(CalibrationError::InvalidSettings(format!(
                "regularization_divisions must be at most {}, got {}",
                Self::MAX_REGULARIZATION_DIVISIONS,
                self.regularization_divisions
            )));
        }
        Ok(())
    }
}

/// Gyroscope reconciliation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GyroSettings {
    /// Recording sample rate in Hz (typically 5.0)
    pub sample_rate: f64,
    /// Overflow culling threshold in rotations per second (typically 0.9)
    ///
    /// A pair whose reference rotation has any component at or above this
    /// magnitude is assumed to have saturated the gyroscope and is left out
    /// of the fit.
    pub overflow_threshold: f64,
}

impl Default for GyroSettings {
    fn default() -> Self {
        Self {
            sample_rate: 5.0,
            overflow_threshold: 0.9,
        }
    }
}

/// Full pipeline configuration
///
/// Every field has a default, so a settings file only needs to name what it
/// changes.
///
/// # Example
/// ```
/// use imu_calibration::CalibrationSettings;
///
/// let settings = CalibrationSettings::from_toml_str(
///     "[gyro]\noverflow_threshold = 0.75\n",
/// ).unwrap();
/// assert_eq!(settings.gyro.overflow_threshold, 0.75);
/// assert_eq!(settings.gyro.sample_rate, 5.0);
/// assert_eq!(settings.ellipsoid.regularization_divisions, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Fixed-point divisor applied to every raw reading on load (typically 256)
    pub input_precision: f64,
    pub ellipsoid: EllipsoidSettings,
    pub gyro: GyroSettings,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            input_precision: 256.0,
            ellipsoid: EllipsoidSettings::default(),
            gyro: GyroSettings::default(),
        }
    }
}

impl CalibrationSettings {
    /// Parse settings from TOML text, filling unnamed fields with defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings that would make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        self.ellipsoid.validate()?;
        ensure_positive("input_precision", self.input_precision)?;
        ensure_positive("sample_rate", self.gyro.sample_rate)?;
        ensure_positive("overflow_threshold", self.gyro.overflow_threshold)
    }
}

fn ensure_positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(CalibrationError::InvalidSettings(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scale_divides_out_geometric_mean() {
        let fit = FitRecord::from_scale(Vector3::zeros(), Vector3::new(2.0, 4.0, 8.0)).unwrap();

        assert!((fit.normalize - 4.0).abs() < 1e-12);
        assert!((fit.rescale.x * fit.rescale.y * fit.rescale.z - 1.0).abs() < 1e-12);
        assert!((fit.sensitivity() - Vector3::new(2.0, 4.0, 8.0)).magnitude() < 1e-12);
    }

    #[test]
    fn test_from_scale_rejects_zero_axis() {
        let result = FitRecord::from_scale(Vector3::zeros(), Vector3::new(1.0, 0.0, 1.0));
        assert!(matches!(result, Err(CalibrationError::DegenerateFit(_))));
    }

    #[test]
    fn test_default_settings() {
        let settings = CalibrationSettings::default();
        assert_eq!(settings.input_precision, 256.0);
        assert_eq!(settings.ellipsoid.regularization_divisions, 8);
        assert_eq!(settings.gyro.sample_rate, 5.0);
        assert_eq!(settings.gyro.overflow_threshold, 0.9);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_from_toml() {
        let text = r#"
            input_precision = 1024.0

            [ellipsoid]
            regularization_divisions = 4

            [gyro]
            sample_rate = 50.0
        "#;
        let settings = CalibrationSettings::from_toml_str(text).unwrap();

        assert_eq!(settings.input_precision, 1024.0);
        assert_eq!(settings.ellipsoid.regularization_divisions, 4);
        assert_eq!(settings.gyro.sample_rate, 50.0);
        assert_eq!(settings.gyro.overflow_threshold, 0.9);
    }

    #[test]
    fn test_settings_validation() {
        let text = "[gyro]\nsample_rate = 0.0\n";
        let result = CalibrationSettings::from_toml_str(text);
        assert!(matches!(result, Err(CalibrationError::InvalidSettings(_))));
    }

    #[test]
    fn test_rejects_oversized_regularization_grid() {
        let text = "[ellipsoid]\nregularization_divisions = 4294967296\n";
        let result = CalibrationSettings::from_toml_str(text);
        assert!(matches!(result, Err(CalibrationError::InvalidSettings(_))));

        let limit = EllipsoidSettings {
            regularization_divisions: EllipsoidSettings::MAX_REGULARIZATION_DIVISIONS,
        };
        assert!(limit.validate().is_ok());
    }

    #[test]
    fn test_output_serializes_by_sensor_name() {
        let output = CalibrationOutput {
            accel: FitRecord::identity(),
            mag: FitRecord::identity(),
            gyro: FitRecord::identity(),
        };
        let json = serde_json::to_value(output).unwrap();

        for key in ["accel", "mag", "gyro"] {
            assert_eq!(json[key]["center"], serde_json::json!([0.0, 0.0, 0.0]));
            assert_eq!(json[key]["rescale"], serde_json::json!([1.0, 1.0, 1.0]));
            assert_eq!(json[key]["normalize"], serde_json::json!(1.0));
        }
    }
}
