//! Ellipsoid fitting for accelerometer and magnetometer clouds
//!
//! A sensor that measures a fixed-magnitude field (gravity, the geomagnetic
//! field) traces a sphere when rotated through many poses. Offset and per-axis
//! gain errors distort that sphere into an ellipsoid. Fitting the ellipsoid
//! and mapping it back onto the unit sphere yields the sensor's calibration.
//!
//! # Example
//! ```
//! use nalgebra::Vector3;
//! use imu_calibration::{EllipsoidSettings, fit_ellipsoid};
//!
//! // Readings on an ellipsoid with center (1, 1, 1) and radii (2, 3, 4)
//! let cloud: Vec<_> = (0..40)
//!     .map(|i| {
//!         let z = 1.0 - (2.0 * i as f64 + 1.0) / 40.0;
//!         let r = (1.0 - z * z).sqrt();
//!         let phi = 2.399963 * i as f64;
//!         Vector3::new(1.0 + 2.0 * r * phi.cos(), 1.0 + 3.0 * r * phi.sin(), 1.0 + 4.0 * z)
//!     })
//!     .collect();
//!
//! let settings = EllipsoidSettings { regularization_divisions: 0 };
//! let fit = fit_ellipsoid(&cloud, &settings).unwrap();
//!
//! assert!((fit.record.center - Vector3::new(1.0, 1.0, 1.0)).magnitude() < 1e-6);
//! assert!(fit.fitted.iter().all(|v| (v.magnitude() - 1.0).abs() < 1e-6));
//! ```

use std::collections::BTreeMap;

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use crate::calibration::adjust_all;
use crate::error::{CalibrationError, Result};
use crate::types::{EllipsoidSettings, FitRecord};

/// Minimum number of points that determine a general quadric
pub const MIN_ELLIPSOID_SAMPLES: usize = 9;

/// Result of fitting the implicit quadric to a cloud
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Center of the quadric
    pub center: Vector3<f64>,
    /// Principal radii, signed by the matching eigenvalue
    ///
    /// A negative radius means the cloud was better explained by a
    /// hyperboloid, which happens when the poses do not cover the sphere.
    pub radii: Vector3<f64>,
    /// Principal directions, one per column, matching `radii`
    pub evecs: Matrix3<f64>,
}

impl Ellipsoid {
    /// Whether every principal radius is positive and finite
    pub fn is_proper(&self) -> bool {
        self.radii.iter().all(|r| *r > 0.0 && r.is_finite())
    }

    /// Per-axis inverse-radius scale in sample space
    ///
    /// Builds `evecs · diag(1 / radii) · evecsᵀ` and keeps its diagonal.
    /// Cross-axis terms are dropped, so only axis-aligned distortion is
    /// corrected.
    pub fn axis_scale(&self) -> Vector3<f64> {
        let inverse_radii = Matrix3::from_diagonal(&self.radii.map(|r| 1.0 / r));
        let transform = self.evecs * inverse_radii * self.evecs.transpose();
        transform.diagonal()
    }
}

/// Output of [`fit_ellipsoid`]
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsoidFit {
    /// The calibration to apply to raw readings
    pub record: FitRecord,
    /// Every input sample with the calibration applied, in input order
    pub fitted: Vec<Vector3<f64>>,
    /// The underlying quadric
    pub ellipsoid: Ellipsoid,
    /// Number of points left after regularization
    pub regularized_len: usize,
}

/// Fit an ellipsoid to an accelerometer or magnetometer cloud
///
/// The cloud is regularized, an ellipsoid is fit to the result and the
/// diagonal of its inverse-radius transform becomes the per-axis scale.
///
/// The cloud must span many orientations; a near-planar or near-collinear
/// cloud makes the quadric ill-conditioned and the result meaningless.
pub fn fit_ellipsoid(samples: &[Vector3<f64>], settings: &EllipsoidSettings) -> Result<EllipsoidFit> {
    settings.validate()?;
    if samples.len() < MIN_ELLIPSOID_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            stage: "ellipsoid fit",
            required: MIN_ELLIPSOID_SAMPLES,
            actual: samples.len(),
        });
    }

    let regularized = regularize(samples, settings.regularization_divisions);
    if regularized.len() < MIN_ELLIPSOID_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            stage: "regularized ellipsoid fit",
            required: MIN_ELLIPSOID_SAMPLES,
            actual: regularized.len(),
        });
    }
    log::debug!(
        "Regularized {} samples into {} sector means",
        samples.len(),
        regularized.len()
    );

    let ellipsoid = fit_quadric(&regularized)?;
    if !ellipsoid.is_proper() {
        log::warn!(
            "Fitted quadric is not an ellipsoid (radii {:?}); pose coverage is probably insufficient",
            ellipsoid.radii.as_slice()
        );
    }

    let record = FitRecord::from_scale(ellipsoid.center, ellipsoid.axis_scale())?;
    let fitted = adjust_all(samples, &record);

    Ok(EllipsoidFit {
        record,
        fitted,
        ellipsoid,
        regularized_len: regularized.len(),
    })
}

/// Average the cloud per spherical sector
///
/// Angles are measured around the center of the cloud's bounding box. The
/// polar angle is split into `divisions` bands and the azimuth into
/// `2 * divisions` slices. Each non-empty sector is replaced by the mean of
/// its samples; sectors are emitted band by band. A sample at the exact
/// center has no direction and is dropped. Only occupied sectors are stored,
/// so memory grows with the cloud and not with `divisions`.
///
/// With `divisions == 0` the cloud is returned unchanged.
pub fn regularize(samples: &[Vector3<f64>], divisions: usize) -> Vec<Vector3<f64>> {
    if divisions == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let (min, max) = bounding_box(samples);
    let center = (min + max) * 0.5;

    let polar_divisions = divisions;
    let azimuth_divisions = divisions.saturating_mul(2);
    let polar_step = core::f64::consts::PI / polar_divisions as f64;
    let azimuth_step = core::f64::consts::TAU / azimuth_divisions as f64;

    let mut sectors: BTreeMap<(usize, usize), (Vector3<f64>, usize)> = BTreeMap::new();
    for sample in samples {
        let offset = sample - center;
        let radius = offset.magnitude();
        if radius == 0.0 {
            continue;
        }

        let polar = (offset.z / radius).clamp(-1.0, 1.0).acos();
        let azimuth = offset.y.atan2(offset.x) + core::f64::consts::PI;

        let band = ((polar / polar_step) as usize).min(polar_divisions - 1);
        let slice = ((azimuth / azimuth_step) as usize).min(azimuth_divisions - 1);

        let (sum, count) = sectors
            .entry((band, slice))
            .or_insert((Vector3::zeros(), 0));
        *sum += sample;
        *count += 1;
    }

    sectors
        .into_values()
        .map(|(sum, count)| sum / count as f64)
        .collect()
}

fn bounding_box(samples: &[Vector3<f64>]) -> (Vector3<f64>, Vector3<f64>) {
    samples.iter().fold(
        (Vector3::repeat(f64::INFINITY), Vector3::repeat(f64::NEG_INFINITY)),
        |(min, max), sample| (min.inf(sample), max.sup(sample)),
    )
}

/// Algebraic least-squares fit of a general ellipsoid
///
/// Solves for the quadric
/// `a·x² + b·y² + c·z² + 2d·xy + 2e·xz + 2f·yz + 2g·x + 2h·y + 2i·z + j = 0`
/// under the constraint `a + b + c = -3`, which fixes the overall scale of
/// the coefficients and lets the fit be written as a linear system in nine
/// unknowns. The center follows from the linear terms, and the principal
/// radii and directions from the eigendecomposition of the translated
/// quadratic form.
pub fn fit_quadric(points: &[Vector3<f64>]) -> Result<Ellipsoid> {
    if points.len() < MIN_ELLIPSOID_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            stage: "quadric fit",
            required: MIN_ELLIPSOID_SAMPLES,
            actual: points.len(),
        });
    }

    // Normal equations of the design matrix
    let mut normal = SMatrix::<f64, 9, 9>::zeros();
    let mut rhs = SVector::<f64, 9>::zeros();
    for p in points {
        let (x, y, z) = (p.x, p.y, p.z);
        let row = SVector::<f64, 9>::from_column_slice(&[
            x * x + y * y - 2.0 * z * z,
            x * x + z * z - 2.0 * y * y,
            2.0 * x * y,
            2.0 * x * z,
            2.0 * y * z,
            2.0 * x,
            2.0 * y,
            2.0 * z,
            1.0,
        ]);
        normal += row * row.transpose();
        rhs += row * (x * x + y * y + z * z);
    }

    let u = normal
        .lu()
        .solve(&rhs)
        .ok_or_else(|| CalibrationError::DegenerateFit("quadric normal equations are singular".into()))?;

    let a = u[0] + u[1] - 1.0;
    let b = u[0] - 2.0 * u[1] - 1.0;
    let c = u[1] - 2.0 * u[0] - 1.0;

    let quadratic = Matrix3::new(
        a, u[2], u[3], //
        u[2], b, u[4], //
        u[3], u[4], c,
    );
    let linear = Vector3::new(u[5], u[6], u[7]);
    let constant = u[8];

    let center = (-quadratic)
        .lu()
        .solve(&linear)
        .ok_or_else(|| CalibrationError::DegenerateFit("quadric has no unique center".into()))?;

    // Constant term of the quadric once translated to its center
    let translated_constant = center.dot(&(quadratic * center)) + 2.0 * center.dot(&linear) + constant;
    if translated_constant == 0.0 {
        return Err(CalibrationError::DegenerateFit(
            "quadric degenerates to a cone".into(),
        ));
    }

    let shape = quadratic / -translated_constant;
    let eigen = shape.symmetric_eigen();
    let radii = eigen
        .eigenvalues
        .map(|value| (1.0 / value.abs()).sqrt() * value.signum());

    Ok(Ellipsoid {
        center,
        radii,
        evecs: eigen.eigenvectors,
    })
}
