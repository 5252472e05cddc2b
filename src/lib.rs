//! IMU Calibration - offline calibration of 9-axis inertial measurement units
//!
//! This library derives per-sensor correction parameters for an accelerometer,
//! a magnetometer and a gyroscope from a single recording in which the device
//! is slowly turned through many orientations.
//!
//! - The accelerometer and magnetometer each measure a field of constant
//!   magnitude, so their raw readings lie on an ellipsoid. Fitting that
//!   ellipsoid gives the center and per-axis scale that map it onto a sphere.
//! - The gyroscope has no such reference. Its scale and bias are reconciled
//!   against the rotation between consecutive samples as reconstructed from
//!   the calibrated accelerometer and magnetometer.
//!
//! Every sensor ends up with a [`FitRecord`], applied at runtime with
//! [`adjust`].
//!
//! # Features
//!
//! - Algebraic ellipsoid fit with sector-averaged regularization
//! - Per-axis affine fit between point clouds
//! - Rotation reconstruction from two reference vectors
//! - Overflow culling of saturated gyroscope samples
//! - JSON recordings, TOML settings and a JSON calibration artifact
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use imu_calibration::{EllipsoidSettings, adjust, fit_ellipsoid};
//!
//! // Readings from an accelerometer with a bias and unequal axis gains
//! let readings: Vec<_> = (0..100)
//!     .map(|i| {
//!         let z = 1.0 - (2 * i + 1) as f64 / 100.0;
//!         let r = (1.0 - z * z).sqrt();
//!         let phi = i as f64 * 2.399_963_229_728_653;
//!         Vector3::new(r * phi.cos() * 2.0 + 1.0, r * phi.sin() * 3.0 + 1.0, z * 4.0 + 1.0)
//!     })
//!     .collect();
//!
//! let fit = fit_ellipsoid(&readings, &EllipsoidSettings { regularization_divisions: 0 }).unwrap();
//!
//! // Corrected readings lie on the unit sphere
//! for reading in &readings {
//!     assert!((adjust(*reading, &fit.record).magnitude() - 1.0).abs() < 1e-6);
//! }
//! ```
//!
//! The [`CalibrationPipeline`] runs all three stages over a [`Recording`].

pub mod affine;
pub mod calibration;
pub mod ellipsoid;
mod error;
pub mod gyro;
mod math;
pub mod pipeline;
pub mod recording;
mod types;

// Re-export the public surface
pub use affine::pointcloud_fit;
pub use calibration::{adjust, adjust_all, calibrate_inertial};
pub use ellipsoid::{Ellipsoid, EllipsoidFit, fit_ellipsoid};
pub use error::{CalibrationError, Result};
pub use gyro::{GyroReconciler, GyroReconciliation, GyroReport};
pub use math::{
    Vector3Ext, axis_angle, geometric_mean, rotation_from_two_vector_pairs,
    try_rotation_from_two_vector_pairs,
};
pub use pipeline::{CalibrationPipeline, CalibrationResult};
pub use recording::{RawSample, Recording};
pub use types::*;
