//! Sensor events and the estimator updates they trigger.
//!
//! Interrupt handlers only post a [`SensorMessage`]. The task that owns the
//! [`SensorFusion`] fetches the data and runs the matching estimator step.

mod fusion;
pub use fusion::{SensorFusion, Update};

/// Capacity of the sensor event queue.
pub const SENSOR_QUEUE_SIZE: usize = 3;

/// An event posted by a sensor interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorMessage {
    GyroDataReady = 0x0A,
    GyroCalibrate = 0x0B,
    MagAccDataReady = 0x1A,
    MagAccCalibrate = 0x1B,
}

/// A raw interrupt tag that is not a [`SensorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor message tag {0:#04x}")]
pub struct UnknownTag(pub u8);

impl TryFrom<u8> for SensorMessage {
    type Error = UnknownTag;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x0A => Ok(Self::GyroDataReady),
            0x0B => Ok(Self::GyroCalibrate),
            0x1A => Ok(Self::MagAccDataReady),
            0x1B => Ok(Self::MagAccCalibrate),
            other => Err(UnknownTag(other)),
        }
    }
}

impl From<SensorMessage> for u8 {
    fn from(message: SensorMessage) -> Self {
        message as u8
    }
}
