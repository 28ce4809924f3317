use nalgebra::Vector3;
use tracing::debug;

use super::SensorMessage;
use crate::config::FlightConfig;
use crate::error::{MathError, Result};
use crate::estimator::{AttitudeEstimator, AttitudeSnapshot};
use crate::hal::SensorSource;
use crate::rotation::{
    attitude_from_accelerometer, attitude_from_magnetometer, yaw_from_magnetometer, Attitude,
    RotationTransform,
};

/// What a sensor event did to the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// A gyro sample propagated the estimate.
    Predicted,
    /// An absolute attitude measurement corrected the estimate.
    Corrected,
    /// Biases and covariances were reset.
    Calibrated,
    /// The estimate was left as it was.
    Held,
}

impl Update {
    /// Returns `true` if a new snapshot should be published.
    pub fn changed(self) -> bool {
        self != Self::Held
    }
}

/// The estimator, its rotation matrices and the constants needed to feed it.
///
/// Owned by exactly one task; everything else reads [`AttitudeSnapshot`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFusion {
    estimator: AttitudeEstimator,
    rotation: RotationTransform,
    magnetic_reference: Vector3<f32>,
    dt: f32,
    held: u32,
}

impl SensorFusion {
    pub fn new(config: &FlightConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            estimator: AttitudeEstimator::new(&config.estimator)?,
            rotation: RotationTransform::new(),
            magnetic_reference: config.magnetic_reference,
            dt: config.sample_dt(),
            held: 0,
        })
    }

    /// Fetch the data for `message` from `source` and run the matching estimator step.
    pub fn handle<S>(&mut self, message: SensorMessage, source: &mut S) -> Update
    where
        S: SensorSource + ?Sized,
    {
        match message {
            SensorMessage::GyroDataReady => self.gyro_data_ready(source),
            SensorMessage::MagAccDataReady => self.mag_acc_data_ready(source),
            SensorMessage::GyroCalibrate => {
                source.calibrate_gyro();
                self.estimator.calibrate();
                debug!("gyro calibrated, estimator biases reset");
                Update::Calibrated
            }
            SensorMessage::MagAccCalibrate => {
                source.calibrate_magnetometer_accelerometer();
                debug!("magnetometer and accelerometer calibrated");
                Update::Held
            }
        }
    }

    fn gyro_data_ready<S: SensorSource + ?Sized>(&mut self, source: &mut S) -> Update {
        let rates = match source.gyro_rates() {
            Some(rates) => rates,
            None => return self.hold("gyro sample unavailable"),
        };

        if self.estimator.predict(&rates, self.dt) == 0 {
            return self.hold("gyro sample rejected");
        }
        self.rotation.update(self.estimator.attitude());

        Update::Predicted
    }

    fn mag_acc_data_ready<S: SensorSource + ?Sized>(&mut self, source: &mut S) -> Update {
        let magnetic_field = source.magnetometer();
        let gravity = source.accelerometer();

        let magnetic_field = match magnetic_field {
            Some(field) => field,
            None => return self.hold("magnetometer sample unavailable"),
        };
        let measured = match self.measure(&magnetic_field, gravity) {
            Ok(attitude) => attitude,
            Err(error) => {
                debug!(%error, "no attitude from magnetometer");
                return self.hold("degenerate magnetometer sample");
            }
        };

        if self.estimator.correct(measured) == 0 {
            return self.hold("attitude measurement rejected");
        }
        self.rotation.update(self.estimator.attitude());

        Update::Corrected
    }

    /// Roll and pitch from gravity with a tilt compensated yaw.
    ///
    /// Without a usable gravity sample the smallest rotation explaining the magnetometer
    /// reading is used. Its yaw is biased by tilt, e.g. a roll of 0.3 rad at north
    /// reads about -0.1 rad of yaw with the default field.
    fn measure(
        &self,
        magnetic_field: &Vector3<f32>,
        gravity: Option<Vector3<f32>>,
    ) -> Result<Attitude, MathError> {
        let tilt = match gravity.map(|gravity| attitude_from_accelerometer(&gravity)) {
            Some(Ok(tilt)) => tilt,
            Some(Err(error)) => {
                debug!(%error, "no tilt from accelerometer, using magnetometer attitude");
                return attitude_from_magnetometer(magnetic_field, &self.magnetic_reference);
            }
            None => return attitude_from_magnetometer(magnetic_field, &self.magnetic_reference),
        };

        let yaw = yaw_from_magnetometer(magnetic_field, &self.magnetic_reference, tilt)?;
        Ok(Attitude::new(tilt.roll, tilt.pitch, yaw))
    }

    fn hold(&mut self, reason: &'static str) -> Update {
        self.held = self.held.wrapping_add(1);
        debug!(reason, "estimator update skipped, holding estimate");
        Update::Held
    }

    pub fn estimator(&self) -> &AttitudeEstimator {
        &self.estimator
    }

    pub fn rotation(&self) -> &RotationTransform {
        &self.rotation
    }

    pub fn attitude(&self) -> Attitude {
        self.estimator.attitude()
    }

    pub fn snapshot(&self) -> AttitudeSnapshot {
        self.estimator.snapshot()
    }

    /// The number of data ready events that left the estimate unchanged.
    pub fn held_updates(&self) -> u32 {
        self.held
    }

    /// The sample period used to propagate gyro rates, in seconds.
    pub fn sample_dt(&self) -> f32 {
        self.dt
    }
}
