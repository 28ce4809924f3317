//! Attitude estimation by fusing gyro rates with absolute angle measurements.
//!
//! Every axis runs its own two state Kalman filter over `[angle, bias]`.
//! Gyro samples drive [`AttitudeEstimator::predict`],
//! magnetometer and accelerometer attitudes drive [`AttitudeEstimator::correct`].

use nalgebra::Vector3;

mod kalman;
pub use kalman::{
    AttitudeStateVector, AxisEstimator, KalmanConfig, KalmanFilter, Q1_CAL, Q2_CAL, R1_CAL,
};

use crate::error::Result;
use crate::rotation::{wrap_2pi, Attitude};

/// Calibration of the three attitude filters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EstimatorConfig {
    pub roll: KalmanConfig,
    pub pitch: KalmanConfig,
    pub yaw: KalmanConfig,
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        self.roll.validate()?;
        self.pitch.validate()?;
        self.yaw.validate()
    }
}

/// A consistent copy of the estimator output taken between update cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeSnapshot {
    pub attitude: Attitude,
    /// Compass heading in [0, 2PI).
    pub heading: f32,
    pub roll: AttitudeStateVector,
    pub pitch: AttitudeStateVector,
    pub yaw: AttitudeStateVector,
}

/// Roll, pitch and yaw filters.
#[derive(Debug, Clone, PartialEq)]
pub struct AttitudeEstimator {
    roll: AxisEstimator,
    pitch: AxisEstimator,
    yaw: AxisEstimator,
}

impl AttitudeEstimator {
    pub fn new(config: &EstimatorConfig) -> Result<Self> {
        Ok(Self {
            roll: AxisEstimator::new(config.roll)?,
            pitch: AxisEstimator::new(config.pitch)?,
            yaw: AxisEstimator::wrapped(config.yaw)?,
        })
    }

    /// Propagate all axes with body rates `(roll, pitch, yaw)` in radians/second.
    ///
    /// Body rates are used as Euler angle rates, which holds for small tilt angles.
    /// Returns the number of axes that accepted the sample.
    pub fn predict(&mut self, rates: &Vector3<f32>, dt: f32) -> usize {
        [
            self.roll.predict(rates.x, dt),
            self.pitch.predict(rates.y, dt),
            self.yaw.predict(rates.z, dt),
        ]
        .into_iter()
        .filter(|accepted| *accepted)
        .count()
    }

    /// Correct all axes with a measured attitude.
    ///
    /// Returns the number of axes that accepted the measurement.
    pub fn correct(&mut self, measured: Attitude) -> usize {
        [
            self.roll.correct(measured.roll),
            self.pitch.correct(measured.pitch),
            self.yaw.correct(measured.yaw),
        ]
        .into_iter()
        .filter(|accepted| *accepted)
        .count()
    }

    /// Reset every axis bias and covariance to its calibration constants.
    pub fn calibrate(&mut self) {
        self.roll.calibrate();
        self.pitch.calibrate();
        self.yaw.calibrate();
    }

    pub fn roll_angle(&self) -> f32 {
        self.roll.angle()
    }

    pub fn pitch_angle(&self) -> f32 {
        self.pitch.angle()
    }

    /// The yaw state in (-PI, PI], positive clockwise seen from above.
    pub fn yaw_angle(&self) -> f32 {
        self.yaw.angle()
    }

    /// The yaw state as a compass heading in [0, 2PI).
    pub fn heading(&self) -> f32 {
        wrap_2pi(self.yaw.angle())
    }

    pub fn attitude(&self) -> Attitude {
        Attitude::new(self.roll_angle(), self.pitch_angle(), self.yaw_angle())
    }

    pub fn roll(&self) -> &AxisEstimator {
        &self.roll
    }

    pub fn pitch(&self) -> &AxisEstimator {
        &self.pitch
    }

    pub fn yaw(&self) -> &AxisEstimator {
        &self.yaw
    }

    pub fn snapshot(&self) -> AttitudeSnapshot {
        AttitudeSnapshot {
            attitude: self.attitude(),
            heading: self.heading(),
            roll: *self.roll.state(),
            pitch: *self.pitch.state(),
            yaw: *self.yaw.state(),
        }
    }
}
