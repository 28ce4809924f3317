//! # quad-fcb
//! Attitude estimation and control core for a quadcopter flight controller.
//!
//! # Components
//! [`rotation`] converts between the inertial and body frame and recovers an attitude
//! from magnetometer and accelerometer readings.
//!
//! [`estimator`] fuses gyro rates with those absolute attitudes in one Kalman filter per axis.
//!
//! [`control`] contains the [`PidBank`](control::PidBank) turning the estimate and the
//! setpoints into thrust and moments.
//!
//! [`sensors`] dispatches sensor interrupt events to the estimator.
//!
//! [`hal`] contains the traits for sensors, setpoints and motors.
//!
//! With the `std` feature, [`runtime`] runs everything as tokio tasks.
//! Without it, drive a [`FlightControlCore`] from your own loop.
//!
//! Run the controllers for a vehicle hovering level:
//! ```
//! use quad_fcb::control::{ControlState, PidBank, PidBankConfig, References};
//!
//! let mut pid = PidBank::new(&PidBankConfig::default(), 0.01)?;
//! let signals = pid.update(&ControlState::default(), &References::default());
//!
//! // Thrust holds the vehicle against gravity, body z points down
//! assert!(signals.thrust < 0.);
//! assert_eq!(signals.roll_moment, 0.);
//! # Ok::<(), quad_fcb::Error>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

use tracing::info;

pub mod config;
pub use config::FlightConfig;

pub mod control;
use control::{ControlSignals, ControlState, PidBank};

pub mod error;
pub use error::{Error, MathError, Result};

pub mod estimator;
use estimator::AttitudeSnapshot;

pub mod hal;
pub use hal::{ControlInputs, MotorControl, SensorSource};

pub mod rotation;
pub use rotation::{Attitude, RotationTransform};

#[cfg(feature = "std")]
pub mod runtime;

pub mod sensors;
pub use sensors::{SensorFusion, SensorMessage, Update};

#[cfg(test)]
mod testing;

/// The estimation and control state of one vehicle.
///
/// Drive it from a single loop: forward sensor events to
/// [`FlightControlCore::handle_sensor_message`] and call
/// [`FlightControlCore::control`] once per control period.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightControlCore {
    config: FlightConfig,
    fusion: SensorFusion,
    pid: PidBank,
}

impl FlightControlCore {
    /// Validate `config` and initialize the estimator and controllers.
    pub fn new(config: FlightConfig) -> Result<Self> {
        let fusion = SensorFusion::new(&config)?;
        let pid = PidBank::new(&config.pid, config.control_dt())?;
        info!(
            control_period_ms = config.control_period.0,
            sample_period_ms = config.sample_period.0,
            "flight control core initialized"
        );

        Ok(Self {
            config,
            fusion,
            pid,
        })
    }

    pub fn handle_sensor_message<S>(&mut self, message: SensorMessage, source: &mut S) -> Update
    where
        S: SensorSource + ?Sized,
    {
        self.fusion.handle(message, source)
    }

    /// Run one control period with the current estimate and output to `motors`.
    pub fn control<I, M>(&mut self, inputs: &mut I, motors: &mut M) -> ControlSignals
    where
        I: ControlInputs + ?Sized,
        M: MotorControl + ?Sized,
    {
        let state = ControlState {
            attitude: self.fusion.attitude(),
            vertical_velocity: inputs.vertical_velocity(),
        };
        let signals = self.pid.update(&state, &inputs.references());
        motors.output(&signals);
        signals
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn fusion(&self) -> &SensorFusion {
        &self.fusion
    }

    pub fn pid(&self) -> &PidBank {
        &self.pid
    }

    pub fn snapshot(&self) -> AttitudeSnapshot {
        self.fusion.snapshot()
    }

    /// Split into the state owned by the estimation task and the state owned by the control task.
    pub fn into_parts(self) -> (SensorFusion, PidBank) {
        (self.fusion, self.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{G_ACC, MASS};
    use crate::testing::{Hover, LastOutput, MockSensors};
    use approx::assert_abs_diff_eq;
    use embedded_time::duration::Milliseconds;
    use nalgebra::Vector3;

    fn fly(core: &mut FlightControlCore, sensors: &mut MockSensors, cycles: usize) -> LastOutput {
        let mut motors = LastOutput::default();
        for _ in 0..cycles {
            core.handle_sensor_message(SensorMessage::GyroDataReady, sensors);
            core.handle_sensor_message(SensorMessage::MagAccDataReady, sensors);
            core.control(&mut Hover, &mut motors);
        }
        motors
    }

    #[test]
    fn vehicle_at_rest() {
        let mut core = FlightControlCore::new(FlightConfig::default()).unwrap();
        let mut sensors = MockSensors::at_rest();
        let motors = fly(&mut core, &mut sensors, 100);

        let attitude = core.fusion().attitude();
        assert_abs_diff_eq!(attitude.roll, 0., epsilon = 1e-6);
        assert_abs_diff_eq!(attitude.pitch, 0., epsilon = 1e-6);
        assert_abs_diff_eq!(attitude.yaw, 0., epsilon = 1e-6);

        let signals = motors.0.unwrap();
        assert_abs_diff_eq!(signals.roll_moment, 0., epsilon = 1e-6);
        assert_abs_diff_eq!(signals.pitch_moment, 0., epsilon = 1e-6);
        assert_abs_diff_eq!(signals.yaw_moment, 0., epsilon = 1e-6);
        assert_abs_diff_eq!(signals.thrust, -G_ACC * MASS);
    }

    #[test]
    fn gyro_bias_is_learned_at_rest() {
        let mut core = FlightControlCore::new(FlightConfig::default()).unwrap();
        let mut sensors = MockSensors {
            gyro: Some(Vector3::new(0.02, -0.01, 0.03)),
            ..MockSensors::at_rest()
        };
        let motors = fly(&mut core, &mut sensors, 3000);

        let snapshot = core.snapshot();
        assert_abs_diff_eq!(snapshot.roll.angle_rate_bias, 0.02, epsilon = 1e-3);
        assert_abs_diff_eq!(snapshot.pitch.angle_rate_bias, -0.01, epsilon = 1e-3);
        assert_abs_diff_eq!(snapshot.yaw.angle_rate_bias, 0.03, epsilon = 1e-3);
        assert_abs_diff_eq!(snapshot.attitude.roll, 0., epsilon = 1e-4);

        let signals = motors.0.unwrap();
        assert!(signals.roll_moment.abs() < 1e-2);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = FlightConfig::default().with_sample_period(Milliseconds(0));
        assert!(matches!(
            FlightControlCore::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
