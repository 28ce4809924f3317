use crate::error::{Error, Result};
use crate::rotation::wrap_pi;

/// Process noise of the angle state.
pub const Q1_CAL: f32 = 0.05;

/// Process noise of the gyro bias random walk.
pub const Q2_CAL: f32 = 0.005;

/// Measurement noise of the absolute angle, measured on the bench at rest.
pub const R1_CAL: f32 = 0.000185;

/// Noise terms and initial error covariance for one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanConfig {
    pub q1: f32,
    pub q2: f32,
    pub r1: f32,
    pub p11: f32,
    pub p12: f32,
    pub p21: f32,
    pub p22: f32,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            q1: Q1_CAL,
            q2: Q2_CAL,
            r1: R1_CAL,
            p11: 1.,
            p12: 0.,
            p21: 0.,
            p22: 1.,
        }
    }
}

impl KalmanConfig {
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.q1, self.q2, self.r1, self.p11, self.p12, self.p21, self.p22,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig("kalman terms must be finite"));
        }
        if self.q1 < 0. || self.q2 < 0. {
            return Err(Error::InvalidConfig("process noise must be non-negative"));
        }
        if self.r1 <= 0. {
            return Err(Error::InvalidConfig("measurement noise must be positive"));
        }
        if self.p11 < 0. || self.p22 < 0. || self.p12 != self.p21 {
            return Err(Error::InvalidConfig(
                "initial covariance must be symmetric with a non-negative diagonal",
            ));
        }
        Ok(())
    }
}

/// State of one attitude axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttitudeStateVector {
    /// Fused angle estimate (radians). For yaw, think "heading".
    pub angle: f32,
    /// Last bias corrected gyro rate (radians/second), informational only.
    pub angle_rate: f32,
    /// Estimated gyro bias (radians/second).
    pub angle_rate_bias: f32,
}

/// Noise terms, error covariance and gains of a two state `[angle, bias]` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanFilter {
    q1: f32,
    q2: f32,
    r1: f32,
    p11: f32,
    p12: f32,
    p21: f32,
    p22: f32,
    // The gains need not be carried between iterations but are kept for telemetry
    k1: f32,
    k2: f32,
}

impl KalmanFilter {
    pub fn new(config: &KalmanConfig) -> Self {
        Self {
            q1: config.q1,
            q2: config.q2,
            r1: config.r1,
            p11: config.p11,
            p12: config.p12,
            p21: config.p21,
            p22: config.p22,
            k1: 0.,
            k2: 0.,
        }
    }

    /// The error covariance matrix as rows.
    pub fn covariance(&self) -> [[f32; 2]; 2] {
        [[self.p11, self.p12], [self.p21, self.p22]]
    }

    /// The gains computed by the last correction.
    pub fn gains(&self) -> (f32, f32) {
        (self.k1, self.k2)
    }

    /// Propagate the covariance through `F = [[1, -dt], [0, 1]]` and add the process noise.
    fn propagate(&mut self, dt: f32) {
        let p11 = self.p11 - dt * (self.p12 + self.p21) + dt * dt * self.p22 + self.q1;
        let p12 = self.p12 - dt * self.p22;

        self.p11 = p11;
        self.p12 = p12;
        self.p21 = p12;
        self.p22 += self.q2;
    }

    /// Compute the gains for an angle measurement and shrink the covariance.
    fn update(&mut self) -> (f32, f32) {
        let innovation_covariance = self.p11 + self.r1;
        self.k1 = self.p11 / innovation_covariance;
        self.k2 = self.p21 / innovation_covariance;

        let p11 = self.p11 - self.k1 * self.p11;
        let p12 = self.p12 - self.k1 * self.p12;
        let p22 = self.p22 - self.k2 * self.p12;

        // Rounding must never leave a negative variance behind
        self.p11 = p11.max(0.);
        self.p12 = p12;
        self.p21 = p12;
        self.p22 = p22.max(0.);

        (self.k1, self.k2)
    }
}

/// Kalman filter estimating the angle and gyro bias of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisEstimator {
    state: AttitudeStateVector,
    filter: KalmanFilter,
    calibration: KalmanConfig,
    wrapped: bool,
}

impl AxisEstimator {
    /// Create an estimator for a bounded axis (roll or pitch).
    pub fn new(calibration: KalmanConfig) -> Result<Self> {
        calibration.validate()?;
        Ok(Self {
            state: AttitudeStateVector::default(),
            filter: KalmanFilter::new(&calibration),
            calibration,
            wrapped: false,
        })
    }

    /// Create an estimator whose angle is wrapped to (-PI, PI] (yaw).
    pub fn wrapped(calibration: KalmanConfig) -> Result<Self> {
        let mut estimator = Self::new(calibration)?;
        estimator.wrapped = true;
        Ok(estimator)
    }

    pub fn angle(&self) -> f32 {
        self.state.angle
    }

    pub fn state(&self) -> &AttitudeStateVector {
        &self.state
    }

    pub fn filter(&self) -> &KalmanFilter {
        &self.filter
    }

    /// Propagate the angle with a gyro rate over `dt` seconds.
    ///
    /// The bias is a random walk, so only the covariance grows here.
    /// Returns `false` and leaves the filter untouched for a non-finite rate or non-positive `dt`.
    pub fn predict(&mut self, rate: f32, dt: f32) -> bool {
        if !rate.is_finite() || !(dt > 0.) {
            return false;
        }

        self.state.angle_rate = rate - self.state.angle_rate_bias;
        self.state.angle = self.wrap(self.state.angle + self.state.angle_rate * dt);
        self.filter.propagate(dt);
        true
    }

    /// Correct the angle and bias with an absolute angle measurement.
    ///
    /// Returns `false` and leaves the filter untouched for a non-finite measurement.
    pub fn correct(&mut self, measured_angle: f32) -> bool {
        if !measured_angle.is_finite() {
            return false;
        }

        let mut innovation = measured_angle - self.state.angle;
        if self.wrapped {
            innovation = wrap_pi(innovation);
        }

        let (k1, k2) = self.filter.update();
        self.state.angle = self.wrap(self.state.angle + k1 * innovation);
        self.state.angle_rate_bias += k2 * innovation;
        true
    }

    /// Reset the bias and covariance to the calibration constants.
    pub fn calibrate(&mut self) {
        self.state.angle_rate = 0.;
        self.state.angle_rate_bias = 0.;
        self.filter = KalmanFilter::new(&self.calibration);
    }

    fn wrap(&self, angle: f32) -> f32 {
        if self.wrapped {
            wrap_pi(angle)
        } else {
            angle
        }
    }
}
