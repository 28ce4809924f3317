//! Hardware doubles for the unit tests.

use nalgebra::Vector3;

use crate::config::default_magnetic_reference;
use crate::control::{ControlSignals, References, G_ACC};
use crate::hal::{ControlInputs, MotorControl, SensorSource};

/// Sensors returning fixed samples and counting calibrations.
#[derive(Debug, Default)]
pub struct MockSensors {
    pub gyro: Option<Vector3<f32>>,
    pub magnetometer: Option<Vector3<f32>>,
    pub accelerometer: Option<Vector3<f32>>,
    pub gyro_calibrations: u32,
    pub mag_acc_calibrations: u32,
}

impl MockSensors {
    /// A level vehicle pointing north with a still gyro.
    pub fn at_rest() -> Self {
        Self {
            gyro: Some(Vector3::zeros()),
            magnetometer: Some(default_magnetic_reference()),
            accelerometer: Some(Vector3::new(0., 0., G_ACC)),
            ..Self::default()
        }
    }
}

impl SensorSource for MockSensors {
    fn gyro_rates(&mut self) -> Option<Vector3<f32>> {
        self.gyro
    }

    fn magnetometer(&mut self) -> Option<Vector3<f32>> {
        self.magnetometer
    }

    fn accelerometer(&mut self) -> Option<Vector3<f32>> {
        self.accelerometer
    }

    fn calibrate_gyro(&mut self) {
        self.gyro_calibrations += 1;
    }

    fn calibrate_magnetometer_accelerometer(&mut self) {
        self.mag_acc_calibrations += 1;
    }
}

/// Level hover setpoints.
pub struct Hover;

impl ControlInputs for Hover {
    fn references(&mut self) -> References {
        References::default()
    }

    fn vertical_velocity(&mut self) -> f32 {
        0.
    }
}

#[derive(Default)]
pub struct LastOutput(pub Option<ControlSignals>);

impl MotorControl for LastOutput {
    fn output(&mut self, signals: &ControlSignals) {
        self.0 = Some(*signals);
    }
}

#[cfg(feature = "std")]
pub use recorder::Recorder;

#[cfg(feature = "std")]
mod recorder {
    use std::sync::{Arc, Mutex};

    use crate::control::ControlSignals;
    use crate::hal::MotorControl;
    use crate::runtime::{TelemetrySample, TelemetrySink};

    /// Shared log of everything written to it, usable from a spawned task.
    #[derive(Debug)]
    pub struct Recorder<T>(Arc<Mutex<Vec<T>>>);

    impl<T> Default for Recorder<T> {
        fn default() -> Self {
            Self(Arc::default())
        }
    }

    impl<T> Clone for Recorder<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone())
        }
    }

    impl<T: Clone> Recorder<T> {
        pub fn push(&self, item: T) {
            self.0.lock().unwrap().push(item);
        }

        pub fn items(&self) -> Vec<T> {
            self.0.lock().unwrap().clone()
        }

        pub fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    impl MotorControl for Recorder<ControlSignals> {
        fn output(&mut self, signals: &ControlSignals) {
            self.push(*signals);
        }
    }

    impl TelemetrySink for Recorder<TelemetrySample> {
        fn record(&mut self, sample: &TelemetrySample) {
            self.push(*sample);
        }
    }
}
