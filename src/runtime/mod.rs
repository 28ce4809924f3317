//! Tokio tasks running the flight control core.
//!
//! ```text
//! interrupt --post--> [queue of 3] --> sensor task --snapshot--> control task --> motors
//!                                                          \--> state sampler --> telemetry
//! ```
//!
//! The sensor task owns the [`SensorFusion`](crate::sensors::SensorFusion) and the
//! control task owns the [`PidBank`](crate::control::PidBank). They only share
//! whole snapshots through `watch` channels.

mod control;
pub use control::{run_control_loop, ControlOutput, ControlTask};

mod pipeline;
pub use pipeline::{
    configure_sensor_pipeline, run_sensor_consumer, sensor_queue, SensorEventSender,
    SensorPipeline,
};

mod sampler;
pub use sampler::{StateSampler, TelemetrySample, TelemetrySink};

use crate::error::Result;
use crate::hal::{ControlInputs, MotorControl, SensorSource};
use crate::FlightControlCore;

/// All tasks of a running flight controller.
#[derive(Debug)]
pub struct FlightTasks {
    pub sensors: SensorPipeline,
    pub control: ControlTask,
    pub sampler: StateSampler,
}

/// Spawn the sensor and control tasks for `flight` on the current tokio runtime.
///
/// Telemetry sampling is prepared but not started.
pub fn spawn_flight_tasks<S, I, M>(
    flight: FlightControlCore,
    source: S,
    inputs: I,
    motors: M,
) -> Result<FlightTasks>
where
    S: SensorSource + Send + 'static,
    I: ControlInputs + Send + 'static,
    M: MotorControl + Send + 'static,
{
    let period = flight.config().control_period;
    let (fusion, pid) = flight.into_parts();

    let sensors = configure_sensor_pipeline(fusion, source)?;
    let control = ControlTask::spawn(pid, sensors.attitude.clone(), inputs, motors, period)?;
    let sampler = StateSampler::new(sensors.attitude.clone(), control.output());

    Ok(FlightTasks {
        sensors,
        control,
        sampler,
    })
}
