//! Per-axis affine fit between two point clouds

use nalgebra::{DMatrix, DVector, Vector3};

use crate::error::{CalibrationError, Result};
use crate::types::FitRecord;

/// Singular values below this are treated as zero by the least-squares solver
const SOLVER_EPSILON: f64 = 1e-12;

/// Minimum number of correspondences for a two-parameter regression
pub const MIN_AFFINE_SAMPLES: usize = 2;

/// Fit `to ≈ scale * from + offset` independently on each axis
///
/// Axes are never fit jointly: the two clouds are assumed to share their
/// axes, differing only by a per-axis gain and bias. The result is expressed
/// as a [`FitRecord`] so that [`adjust`](crate::adjust) maps `from` onto `to`;
/// the center is therefore `-offset / scale`.
///
/// The regression is solved with an SVD, which returns the minimum-norm
/// solution when an axis of `from` has no spread.
///
/// # Arguments
/// * `from` - Observed points
/// * `to` - Target points, same length and order as `from`
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use imu_calibration::pointcloud_fit;
///
/// let from: Vec<_> = (0..5).map(|i| Vector3::new(i as f64, -(i as f64), 2.0 * i as f64)).collect();
/// let to: Vec<_> = from.iter().map(|v| v * 3.0 + Vector3::new(1.0, 1.0, 1.0)).collect();
///
/// let fit = pointcloud_fit(&from, &to).unwrap();
/// assert!((fit.sensitivity() - Vector3::new(3.0, 3.0, 3.0)).magnitude() < 1e-9);
/// ```
pub fn pointcloud_fit(from: &[Vector3<f64>], to: &[Vector3<f64>]) -> Result<FitRecord> {
    if from.len() != to.len() {
        return Err(CalibrationError::CloudMismatch {
            from: from.len(),
            to: to.len(),
        });
    }
    if from.len() < MIN_AFFINE_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            stage: "affine fit",
            required: MIN_AFFINE_SAMPLES,
            actual: from.len(),
        });
    }

    let mut scale = Vector3::zeros();
    let mut offset = Vector3::zeros();
    for axis in 0..3 {
        let (axis_scale, axis_offset) = fit_axis(from, to, axis)?;
        scale[axis] = axis_scale;
        offset[axis] = axis_offset;
    }

    if scale.iter().any(|s| *s == 0.0) {
        return Err(CalibrationError::DegenerateFit(format!(
            "affine fit produced a zero scale: {:?}",
            scale.as_slice()
        )));
    }

    let center = -offset.component_div(&scale);
    FitRecord::from_scale(center, scale)
}

/// Least-squares line through one axis of the correspondences
fn fit_axis(from: &[Vector3<f64>], to: &[Vector3<f64>], axis: usize) -> Result<(f64, f64)> {
    let design = DMatrix::from_fn(from.len(), 2, |row, col| {
        if col == 0 { from[row][axis] } else { 1.0 }
    });
    let target = DVector::from_iterator(to.len(), to.iter().map(|v| v[axis]));

    let solution = design
        .svd(true, true)
        .solve(&target, SOLVER_EPSILON)
        .map_err(|e| CalibrationError::DegenerateFit(format!("axis {axis}: {e}")))?;

    Ok((solution[0], solution[1]))
}
