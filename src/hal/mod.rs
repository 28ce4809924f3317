//! Traits for the hardware the flight control core talks to.

use nalgebra::Vector3;

use crate::control::{ControlSignals, References};

/// Sensor drivers read by the estimation task after a data ready event.
///
/// A `None` reading means the driver could not deliver a sample;
/// the corresponding estimator step is skipped.
pub trait SensorSource {
    /// Body rates `(roll, pitch, yaw)` in radians/second.
    fn gyro_rates(&mut self) -> Option<Vector3<f32>>;

    /// Magnetic field in the body frame. Only the direction is used.
    fn magnetometer(&mut self) -> Option<Vector3<f32>>;

    /// Gravity in the body frame, `(0, 0, g)` when level. Only the direction is used.
    fn accelerometer(&mut self) -> Option<Vector3<f32>>;

    /// Run the driver side gyro calibration.
    fn calibrate_gyro(&mut self) {}

    /// Run the driver side magnetometer and accelerometer calibration.
    fn calibrate_magnetometer_accelerometer(&mut self) {}
}

impl<T: SensorSource + ?Sized> SensorSource for &mut T {
    fn gyro_rates(&mut self) -> Option<Vector3<f32>> {
        (**self).gyro_rates()
    }

    fn magnetometer(&mut self) -> Option<Vector3<f32>> {
        (**self).magnetometer()
    }

    fn accelerometer(&mut self) -> Option<Vector3<f32>> {
        (**self).accelerometer()
    }

    fn calibrate_gyro(&mut self) {
        (**self).calibrate_gyro()
    }

    fn calibrate_magnetometer_accelerometer(&mut self) {
        (**self).calibrate_magnetometer_accelerometer()
    }
}

/// Pilot or autopilot setpoints and the measured vertical velocity.
pub trait ControlInputs {
    fn references(&mut self) -> References;

    /// Vertical velocity in m/s, positive down.
    fn vertical_velocity(&mut self) -> f32;
}

/// The motor mixer consuming the control signals.
pub trait MotorControl {
    /// Output the thrust and moments of one control period.
    fn output(&mut self, signals: &ControlSignals);
}
