//! Gyroscope scale and bias reconciliation
//!
//! The gyroscope cannot be calibrated on its own: it has no fixed reference
//! like gravity. Instead, the rotation between consecutive samples is
//! computed twice, once from the gyroscope readings and once from the
//! calibrated accelerometer and magnetometer vectors, and a per-axis affine
//! fit maps the first onto the second.

use nalgebra::Vector3;

use crate::affine::pointcloud_fit;
use crate::calibration::adjust_all;
use crate::error::{CalibrationError, Result};
use crate::math::{Vector3Ext, axis_angle, try_rotation_from_two_vector_pairs};
use crate::types::{FitRecord, GyroSettings};

/// Diagnostics gathered while reconciling the gyroscope
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroReport {
    /// Number of consecutive sample pairs
    pub pairs: usize,
    /// Pairs excluded from the fit by overflow culling
    pub culled: usize,
    /// Pairs whose accelerometer and magnetometer vectors were parallel
    ///
    /// Their reference rotation falls back to zero and they are left out of
    /// the fit. They are not counted in `culled`.
    pub degenerate: usize,
    /// Mean squared distance between corrected and reference rotations over
    /// the pairs that took part in the fit
    pub mean_squared_residual: f64,
}

/// Output of [`GyroReconciler::reconcile`]
///
/// All streams have one entry per consecutive sample pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GyroReconciliation {
    /// The gyroscope calibration
    pub record: FitRecord,
    /// Observed pair rotations with the calibration applied, culled pairs included
    pub fitted: Vec<Vector3<f64>>,
    /// Reference pair rotations from the accelerometer and magnetometer
    pub calculated: Vec<Vector3<f64>>,
    /// Whether each pair took part in the fit
    ///
    /// A pair is left out when its reference rotation reaches the overflow
    /// threshold or when its reference vectors were parallel.
    pub used: Vec<bool>,
    pub report: GyroReport,
}

/// Gyroscope reconciliation against an accelerometer/magnetometer reference
///
/// # Example
/// ```
/// use imu_calibration::{GyroReconciler, GyroSettings};
///
/// let reconciler = GyroReconciler::new(GyroSettings {
///     sample_rate: 50.0,
///     ..Default::default()
/// });
/// assert_eq!(reconciler.settings().overflow_threshold, 0.9);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GyroReconciler {
    settings: GyroSettings,
}

impl GyroReconciler {
    pub fn new(settings: GyroSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> GyroSettings {
        self.settings
    }

    /// Fit the gyroscope scale and bias
    ///
    /// # Arguments
    /// * `accel` - Calibrated accelerometer stream
    /// * `mag` - Calibrated magnetometer stream
    /// * `gyro` - Raw gyroscope stream, each reading an axis scaled by its rate
    ///
    /// All three streams must have the same length, with at least two
    /// samples. Pairs whose reference rotation reaches the overflow threshold
    /// on any axis, or whose reference rotation is undefined, are left out of
    /// the fit but still appear, corrected, in the output.
    pub fn reconcile(
        &self,
        accel: &[Vector3<f64>],
        mag: &[Vector3<f64>],
        gyro: &[Vector3<f64>],
    ) -> Result<GyroReconciliation> {
        if accel.len() != mag.len() || accel.len() != gyro.len() {
            return Err(CalibrationError::LengthMismatch {
                accel: accel.len(),
                mag: mag.len(),
                gyro: gyro.len(),
            });
        }
        if gyro.len() < 2 {
            return Err(CalibrationError::InsufficientSamples {
                stage: "gyroscope reconciliation",
                required: 2,
                actual: gyro.len(),
            });
        }

        let observed = observed_rotations(gyro);
        let reference = reference_rotations(accel, mag, self.settings.sample_rate);
        let calculated: Vec<Vector3<f64>> = reference
            .iter()
            .map(|rotation| rotation.unwrap_or_else(Vector3::zeros))
            .collect();
        let in_range = overflow_mask(&calculated, self.settings.overflow_threshold);

        let degenerate = reference.iter().filter(|rotation| rotation.is_none()).count();
        let culled = reference
            .iter()
            .zip(&in_range)
            .filter(|(rotation, keep)| rotation.is_some() && !**keep)
            .count();
        let used: Vec<bool> = reference
            .iter()
            .zip(&in_range)
            .map(|(rotation, keep)| rotation.is_some() && *keep)
            .collect();

        let (observed_used, calculated_used): (Vec<_>, Vec<_>) = observed
            .iter()
            .zip(&calculated)
            .zip(&used)
            .filter(|(_, keep)| **keep)
            .map(|((o, c), _)| (*o, *c))
            .unzip();

        log::debug!(
            "Gyro pairs culled by overflow protection: {} of {}",
            culled,
            calculated.len()
        );
        if degenerate > 0 {
            log::warn!("{degenerate} sample pairs had parallel reference vectors and were left out of the fit");
        }

        let record = pointcloud_fit(&observed_used, &calculated_used)?;
        let fitted = adjust_all(&observed, &record);

        let mean_squared_residual = fitted
            .iter()
            .zip(&calculated)
            .zip(&used)
            .filter(|(_, keep)| **keep)
            .map(|((f, c), _)| (f - c).magnitude_squared())
            .sum::<f64>()
            / calculated_used.len() as f64;

        Ok(GyroReconciliation {
            record,
            fitted,
            calculated,
            used,
            report: GyroReport {
                pairs: observed.len(),
                culled,
                degenerate,
                mean_squared_residual,
            },
        })
    }
}

/// Midpoint rotation between each pair of consecutive gyroscope readings
///
/// The axis is the bisector of the two reading directions and the magnitude
/// is the mean of the two reading magnitudes.
pub fn observed_rotations(gyro: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    gyro.windows(2)
        .map(|pair| {
            let axis = (pair[0].safe_normalize() + pair[1].safe_normalize()).safe_normalize();
            let rate = (pair[0].magnitude() + pair[1].magnitude()) / 2.0;
            axis * rate
        })
        .collect()
}

/// Rotation between each pair of consecutive samples, seen through the
/// accelerometer and magnetometer vectors
///
/// Angles are converted from radians per sample interval to rotations per
/// second, the unit of the gyroscope stream. A pair whose vectors are
/// parallel at either instant has no defined rotation and yields `None`.
pub fn reference_rotations(
    accel: &[Vector3<f64>],
    mag: &[Vector3<f64>],
    sample_rate: f64,
) -> Vec<Option<Vector3<f64>>> {
    let to_rate = sample_rate / core::f64::consts::TAU;

    accel
        .windows(2)
        .zip(mag.windows(2))
        .map(|(a, m)| {
            try_rotation_from_two_vector_pairs(a[0], m[0], a[1], m[1])
                .map(|rotation| axis_angle(&rotation) * to_rate)
        })
        .collect()
}

/// Total version of [`reference_rotations`]
///
/// Degenerate pairs contribute a zero rotation. Returns the rotations and
/// the number of degenerate pairs.
pub fn calculated_rotations(
    accel: &[Vector3<f64>],
    mag: &[Vector3<f64>],
    sample_rate: f64,
) -> (Vec<Vector3<f64>>, usize) {
    let reference = reference_rotations(accel, mag, sample_rate);
    let degenerate = reference.iter().filter(|rotation| rotation.is_none()).count();
    let rotations = reference
        .into_iter()
        .map(|rotation| rotation.unwrap_or_else(Vector3::zeros))
        .collect();

    (rotations, degenerate)
}

/// Which pairs survive overflow culling
///
/// A pair is kept only when every component of its reference rotation is
/// strictly below `threshold` in magnitude.
pub fn overflow_mask(calculated: &[Vector3<f64>], threshold: f64) -> Vec<bool> {
    calculated
        .iter()
        .map(|rotation| rotation.iter().all(|component| component.abs() < threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    #[test]
    fn test_observed_rotation_averages_pair() {
        let gyro = vec![
            Vector3::new(0.2, 0.0, 0.0),
            Vector3::new(0.0, 0.4, 0.0),
            Vector3::new(0.0, 0.4, 0.0),
        ];

        let observed = observed_rotations(&gyro);

        assert_eq!(observed.len(), 2);
        let diagonal = Vector3::new(1.0, 1.0, 0.0).normalize();
        assert!((observed[0] - diagonal * 0.3).magnitude() < 1e-12);
        assert!((observed[1] - Vector3::new(0.0, 0.4, 0.0)).magnitude() < 1e-12);
    }

    #[test]
    fn test_observed_rotation_handles_zero_reading() {
        let gyro = vec![Vector3::zeros(), Vector3::new(0.0, 0.0, 0.6)];
        let observed = observed_rotations(&gyro);
        assert!((observed[0] - Vector3::new(0.0, 0.0, 0.3)).magnitude() < 1e-12);
    }

    #[test]
    fn test_calculated_rotation_in_rotations_per_second() {
        let gravity = Vector3::new(0.0, 0.0, 1.0);
        let field = Vector3::new(0.4, 0.0, -0.9);
        // A quarter turn about z within one sample at 5 Hz is 1.25 rotations per second
        let turn = Rotation3::from_axis_angle(&Vector3::z_axis(), core::f64::consts::FRAC_PI_2);

        let accel = vec![gravity, turn.inverse() * gravity];
        let mag = vec![field, turn.inverse() * field];
        let (calculated, degenerate) = calculated_rotations(&accel, &mag, 5.0);

        assert_eq!(degenerate, 0);
        assert!((calculated[0] - Vector3::new(0.0, 0.0, 1.25)).magnitude() < 1e-12);
    }

    #[test]
    fn test_calculated_rotation_counts_degenerate_pairs() {
        let v = Vector3::new(0.0, 0.0, 1.0);
        let accel = vec![v, v, v];
        let mag = vec![v, Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)];

        let (calculated, degenerate) = calculated_rotations(&accel, &mag, 5.0);

        assert_eq!(degenerate, 1);
        assert_eq!(calculated[0], Vector3::zeros());
        // The field swings from +x to +y in the body frame: a quarter turn about -z
        assert!((calculated[1] - Vector3::new(0.0, 0.0, -1.25)).magnitude() < 1e-12);
    }

    #[test]
    fn test_reference_rotation_undefined_for_parallel_vectors() {
        let v = Vector3::new(0.0, 0.0, 1.0);
        let accel = vec![v, v, v];
        let mag = vec![Vector3::new(1.0, 0.0, 0.0), v * 3.0, Vector3::new(0.0, 1.0, 0.0)];

        let reference = reference_rotations(&accel, &mag, 5.0);

        assert_eq!(reference, vec![None, None]);
    }

    #[test]
    fn test_overflow_mask_threshold_is_inclusive() {
        let calculated = vec![
            Vector3::new(0.5, -0.2, 0.1),
            Vector3::new(0.9, 0.0, 0.0),
            Vector3::new(0.0, -0.95, 0.0),
            Vector3::new(0.0, 0.0, 0.8999),
        ];

        assert_eq!(
            overflow_mask(&calculated, 0.9),
            vec![true, false, false, true]
        );
    }

    #[test]
    fn test_culling_is_monotonic_in_threshold() {
        let calculated: Vec<_> = (0..50)
            .map(|i| {
                let t = i as f64 * 0.37;
                Vector3::new(t.sin(), (1.7 * t).cos() * 0.8, (0.3 * t).sin() * 1.2)
            })
            .collect();

        let mut previous = 0;
        for threshold in [2.0, 1.2, 1.0, 0.9, 0.7, 0.5, 0.3, 0.1, 0.0] {
            let culled = overflow_mask(&calculated, threshold)
                .iter()
                .filter(|used| !**used)
                .count();
            assert!(culled >= previous, "threshold {threshold} culled {culled} < {previous}");
            previous = culled;
        }
        assert_eq!(previous, calculated.len());
    }

    #[test]
    fn test_reconcile_rejects_mismatched_streams() {
        let stream = vec![Vector3::new(0.0, 0.0, 1.0); 4];
        let result = GyroReconciler::default().reconcile(&stream, &stream, &stream[..3]);
        assert!(matches!(
            result,
            Err(CalibrationError::LengthMismatch { accel: 4, mag: 4, gyro: 3 })
        ));
    }
}
