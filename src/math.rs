//! Vector math and rotation reconstruction for the calibration library

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Below this cross-product magnitude two unit vectors count as parallel
pub(crate) const PARALLEL_EPSILON: f64 = 1e-9;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning it unchanged if its magnitude is zero
    fn safe_normalize(&self) -> Vector3<f64>;
}

impl Vector3Ext for Vector3<f64> {
    fn safe_normalize(&self) -> Vector3<f64> {
        let mag = self.magnitude();
        if mag > 0.0 { *self / mag } else { *self }
    }
}

/// Cube root of the product of the three components
///
/// Uses the real cube root, so a negative product yields a negative mean
/// instead of NaN.
pub fn geometric_mean(v: &Vector3<f64>) -> f64 {
    (v.x * v.y * v.z).cbrt()
}

/// Orthonormal frame spanned by two non-parallel reference vectors
///
/// Rows of the returned matrix are the frame axes:
/// 1. the bisector of the two normalized vectors
/// 2. their normalized cross product
/// 3. the cross product of the first two axes
///
/// Returns `None` when the vectors are parallel, anti-parallel or zero,
/// since the second axis is undefined.
pub(crate) fn reference_frame(v0: Vector3<f64>, v1: Vector3<f64>) -> Option<Matrix3<f64>> {
    let v0 = v0.safe_normalize();
    let v1 = v1.safe_normalize();

    let normal = v0.cross(&v1);
    if normal.magnitude() < PARALLEL_EPSILON {
        return None;
    }

    let axis0 = (v0 + v1).safe_normalize();
    let axis1 = normal.safe_normalize();
    let axis2 = axis0.cross(&axis1).safe_normalize();

    Some(Matrix3::from_rows(&[
        axis0.transpose(),
        axis1.transpose(),
        axis2.transpose(),
    ]))
}

/// Rotation between two instants observed through a pair of reference vectors
///
/// Builds the reference frame at each instant and returns `frame0ᵀ · frame1`.
/// Returns `None` if either pair is degenerate.
pub fn try_rotation_from_two_vector_pairs(
    t0v0: Vector3<f64>,
    t0v1: Vector3<f64>,
    t1v0: Vector3<f64>,
    t1v1: Vector3<f64>,
) -> Option<Rotation3<f64>> {
    let frame0 = reference_frame(t0v0, t0v1)?;
    let frame1 = reference_frame(t1v0, t1v1)?;
    Some(Rotation3::from_matrix_unchecked(frame0.transpose() * frame1))
}

/// Rotation between two instants observed through a pair of reference vectors
///
/// Total version of [`try_rotation_from_two_vector_pairs`]: a degenerate pair
/// yields the identity rotation rather than NaN.
///
/// # Arguments
/// * `t0v0`, `t0v1` - Reference vectors at the first instant (e.g. gravity and magnetic field)
/// * `t1v0`, `t1v1` - The same reference vectors at the second instant
///
/// # Returns
/// Rotation matrix mapping the first frame onto the second
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use imu_calibration::rotation_from_two_vector_pairs;
///
/// let gravity = Vector3::new(0.0, 0.0, 1.0);
/// let field = Vector3::new(0.4, 0.0, -0.9);
///
/// let rotation = rotation_from_two_vector_pairs(gravity, field, gravity, field);
/// assert!((rotation - Matrix3::identity()).norm() < 1e-12);
/// ```
pub fn rotation_from_two_vector_pairs(
    t0v0: Vector3<f64>,
    t0v1: Vector3<f64>,
    t1v0: Vector3<f64>,
    t1v1: Vector3<f64>,
) -> Matrix3<f64> {
    try_rotation_from_two_vector_pairs(t0v0, t0v1, t1v0, t1v1)
        .map(|rotation| rotation.into_inner())
        .unwrap_or_else(Matrix3::identity)
}

/// Axis-angle vector (unit axis scaled by angle in radians) of a rotation
pub fn axis_angle(rotation: &Rotation3<f64>) -> Vector3<f64> {
    UnitQuaternion::from_rotation_matrix(rotation).scaled_axis()
}
