//! Synthetic calibration recordings with known sensor errors

#![allow(dead_code)]

use imu_calibration::RawSample;
use imu_calibration::gyro::observed_rotations;
use nalgebra::{Rotation3, Vector3};

pub const SAMPLE_RATE: f64 = 5.0;
pub const PRECISION: f64 = 256.0;

/// Known distortions applied to an ideal device
#[derive(Debug, Clone, Copy)]
pub struct SensorModel {
    pub accel_center: Vector3<f64>,
    pub accel_radii: Vector3<f64>,
    pub mag_center: Vector3<f64>,
    pub mag_radii: Vector3<f64>,
    pub gyro_scale: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
}

impl Default for SensorModel {
    fn default() -> Self {
        Self {
            accel_center: Vector3::new(1.0, 1.0, 1.0),
            accel_radii: Vector3::new(2.0, 3.0, 4.0),
            mag_center: Vector3::new(-0.3, 0.5, 0.2),
            mag_radii: Vector3::new(0.5, 0.45, 0.55),
            gyro_scale: Vector3::new(1.5, 1.2, 0.8),
            gyro_bias: Vector3::new(0.02, -0.01, 0.03),
        }
    }
}

/// Raw streams produced by a device following a scripted motion
#[derive(Debug, Clone)]
pub struct Synthetic {
    pub accel: Vec<Vector3<f64>>,
    pub mag: Vec<Vector3<f64>>,
    pub gyro: Vec<Vector3<f64>>,
    /// Body-frame rotation between consecutive samples in rotations per second
    pub true_rates: Vec<Vector3<f64>>,
}

impl Synthetic {
    pub fn len(&self) -> usize {
        self.accel.len()
    }

    /// Encode as fixed-point samples, the way a recording stores them
    pub fn to_raw_samples(&self, precision: f64) -> Vec<RawSample> {
        (0..self.len())
            .map(|i| {
                let gyro = self.gyro[i] * precision;
                RawSample {
                    accel: (self.accel[i] * precision).into(),
                    mag: (self.mag[i] * precision).into(),
                    gyro: gyro.into(),
                    gyro_mag: gyro.magnitude(),
                }
            })
            .collect()
    }
}

/// Raw gyroscope readings, each an axis scaled by a rate
fn gyro_pattern(count: usize) -> Vec<Vector3<f64>> {
    (0..count)
        .map(|k| {
            let t = k as f64;
            Vector3::new(
                0.30 * (1.2 * t + 0.9).sin() + 0.05,
                0.25 * (1.0 * t + 1.1).cos() + 0.10,
                0.35 * (1.0 * t + 1.0).sin(),
            )
        })
        .collect()
}

/// Generate `count` samples of a device turning at rates driven by its own gyroscope
///
/// The true rotation between samples is `gyro_scale * observed + gyro_bias`,
/// so a perfect calibration recovers the model exactly. The accelerometer
/// and magnetometer see gravity and a fixed geomagnetic field through the
/// body frame, distorted by their centers and radii.
pub fn generate(model: &SensorModel, count: usize) -> Synthetic {
    let gyro = gyro_pattern(count);
    let observed = observed_rotations(&gyro);

    let gravity = Vector3::new(0.0, 0.0, 1.0);
    let field = Vector3::new(0.4, 0.0, -0.9).normalize();

    let mut orientation = Rotation3::identity();
    let mut orientations = vec![orientation];
    let mut true_rates = Vec::with_capacity(observed.len());
    for rate in &observed {
        let true_rate = model.gyro_scale.component_mul(rate) + model.gyro_bias;
        let step = true_rate * core::f64::consts::TAU / SAMPLE_RATE;
        orientation *= Rotation3::new(step);
        orientations.push(orientation);
        true_rates.push(true_rate);
    }

    let accel = orientations
        .iter()
        .map(|r| model.accel_center + model.accel_radii.component_mul(&(r.inverse() * gravity)))
        .collect();
    let mag = orientations
        .iter()
        .map(|r| model.mag_center + model.mag_radii.component_mul(&(r.inverse() * field)))
        .collect();

    Synthetic {
        accel,
        mag,
        gyro,
        true_rates,
    }
}
