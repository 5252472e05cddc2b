//! Application of fitted calibration parameters to sensor readings

use nalgebra::{Matrix3, Vector3};

use crate::types::FitRecord;

/// General affine correction: `misalignment * ((uncalibrated - offset) ∘ sensitivity)`
///
/// A [`FitRecord`] only carries per-axis terms, so [`adjust`] calls this
/// with an identity misalignment. Callers holding a full soft-iron or
/// cross-axis matrix for the same sensor can pass it here instead.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use imu_calibration::calibration::calibrate_inertial;
///
/// // Swap x and y after removing a magnetometer hard-iron offset
/// let swap = Matrix3::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
/// let corrected = calibrate_inertial(
///     Vector3::new(0.7, -0.1, 0.4),
///     swap,
///     Vector3::new(2.0, 2.0, 2.0),
///     Vector3::new(0.2, 0.4, 0.4),
/// );
/// assert!((corrected - Vector3::new(-1.0, 1.0, 0.0)).magnitude() < 1e-12);
/// ```
pub fn calibrate_inertial(
    uncalibrated: Vector3<f64>,
    misalignment: Matrix3<f64>,
    sensitivity: Vector3<f64>,
    offset: Vector3<f64>,
) -> Vector3<f64> {
    misalignment * (uncalibrated - offset).component_mul(&sensitivity)
}

/// Applies a fit to one reading: `((reading - center) * rescale) * normalize`
///
/// This is the correction a device driver applies at runtime. A fit carries
/// no cross-axis terms, so it is an inertial calibration with identity
/// misalignment.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_calibration::{FitRecord, adjust};
///
/// let reading = Vector3::new(0.2, -0.4, 0.9);
/// assert_eq!(adjust(reading, &FitRecord::identity()), reading);
/// ```
pub fn adjust(reading: Vector3<f64>, fit: &FitRecord) -> Vector3<f64> {
    calibrate_inertial(reading, Matrix3::identity(), fit.rescale, fit.center) * fit.normalize
}

/// Applies a fit to every reading of a stream, preserving order and length
pub fn adjust_all(readings: &[Vector3<f64>], fit: &FitRecord) -> Vec<Vector3<f64>> {
    readings.iter().map(|reading| adjust(*reading, fit)).collect()
}
