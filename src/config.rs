use embedded_time::duration::Milliseconds;
use nalgebra::Vector3;

use crate::control::PidBankConfig;
use crate::error::{Error, Result};
use crate::estimator::EstimatorConfig;

/// Period of the attitude control loop.
pub const FLIGHT_CONTROL_TASK_PERIOD: Milliseconds<u32> = Milliseconds(10);

/// Period between gyro samples.
pub const STATE_ESTIMATION_SAMPLE_PERIOD: Milliseconds<u32> = Milliseconds(10);

/// Earth magnetic field in the NED frame (micro tesla) for southern Sweden.
///
/// The field depends on where the vehicle operates and declination is assumed constant.
pub fn default_magnetic_reference() -> Vector3<f32> {
    Vector3::new(17.2, 0.9, 46.9)
}

/// Load time configuration of the flight control core.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightConfig {
    pub control_period: Milliseconds<u32>,
    pub sample_period: Milliseconds<u32>,
    pub estimator: EstimatorConfig,
    pub pid: PidBankConfig,
    pub magnetic_reference: Vector3<f32>,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            control_period: FLIGHT_CONTROL_TASK_PERIOD,
            sample_period: STATE_ESTIMATION_SAMPLE_PERIOD,
            estimator: EstimatorConfig::default(),
            pid: PidBankConfig::default(),
            magnetic_reference: default_magnetic_reference(),
        }
    }
}

impl FlightConfig {
    /// Builder method to set `control_period` and return `self`
    pub fn with_control_period(mut self, period: Milliseconds<u32>) -> Self {
        self.control_period = period;
        self
    }

    /// Builder method to set `sample_period` and return `self`
    pub fn with_sample_period(mut self, period: Milliseconds<u32>) -> Self {
        self.sample_period = period;
        self
    }

    /// Builder method to set `estimator` and return `self`
    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    /// Builder method to set `pid` and return `self`
    pub fn with_pid(mut self, pid: PidBankConfig) -> Self {
        self.pid = pid;
        self
    }

    /// Builder method to set `magnetic_reference` and return `self`
    pub fn with_magnetic_reference(mut self, reference: Vector3<f32>) -> Self {
        self.magnetic_reference = reference;
        self
    }

    /// The control period in seconds.
    pub fn control_dt(&self) -> f32 {
        self.control_period.0 as f32 / 1000.
    }

    /// The gyro sample period in seconds.
    pub fn sample_dt(&self) -> f32 {
        self.sample_period.0 as f32 / 1000.
    }

    pub fn validate(&self) -> Result<()> {
        if self.control_period.0 == 0 {
            return Err(Error::InvalidConfig("control period must be positive"));
        }
        if self.sample_period.0 == 0 {
            return Err(Error::InvalidConfig("sample period must be positive"));
        }
        if !self.magnetic_reference.iter().all(|v| v.is_finite())
            || self.magnetic_reference == Vector3::zeros()
        {
            return Err(Error::InvalidConfig(
                "magnetic reference must be a finite, non-zero vector",
            ));
        }
        self.estimator.validate()?;
        self.pid.validate()
    }
}
