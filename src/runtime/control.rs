use std::time::Duration;

use embedded_time::duration::Milliseconds;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use crate::control::{ControlSignals, ControlState, ControlTerms, PidBank};
use crate::error::{Error, Result};
use crate::estimator::AttitudeSnapshot;
use crate::hal::{ControlInputs, MotorControl};

/// The result of one control period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlOutput {
    pub signals: ControlSignals,
    pub terms: ControlTerms,
}

/// Run the PID bank once per `period`.
///
/// A period that overruns is skipped, never queued.
pub async fn run_control_loop<I, M>(
    mut pid: PidBank,
    attitude: watch::Receiver<AttitudeSnapshot>,
    mut inputs: I,
    mut motors: M,
    period: Duration,
    output: watch::Sender<ControlOutput>,
) where
    I: ControlInputs,
    M: MotorControl,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        // Copy out so the estimation task is never blocked by this loop
        let snapshot = *attitude.borrow();
        let state = ControlState {
            attitude: snapshot.attitude,
            vertical_velocity: inputs.vertical_velocity(),
        };
        let signals = pid.update(&state, &inputs.references());
        motors.output(&signals);

        output.send_replace(ControlOutput {
            signals,
            terms: pid.terms(),
        });
    }
}

/// Handle to the periodic flight control task.
#[derive(Debug)]
pub struct ControlTask {
    handle: Option<JoinHandle<()>>,
    output: watch::Receiver<ControlOutput>,
}

impl ControlTask {
    /// Spawn the control loop on the current tokio runtime.
    pub fn spawn<I, M>(
        pid: PidBank,
        attitude: watch::Receiver<AttitudeSnapshot>,
        inputs: I,
        motors: M,
        period: Milliseconds<u32>,
    ) -> Result<Self>
    where
        I: ControlInputs + Send + 'static,
        M: MotorControl + Send + 'static,
    {
        if period.0 == 0 {
            return Err(Error::InvalidConfig("control period must be positive"));
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime("flight control"))?;

        let (output_tx, output) = watch::channel(ControlOutput::default());
        let handle = runtime.spawn(run_control_loop(
            pid,
            attitude,
            inputs,
            motors,
            Duration::from_millis(u64::from(period.0)),
            output_tx,
        ));
        info!(period_ms = period.0, "flight control task started");

        Ok(Self {
            handle: Some(handle),
            output,
        })
    }

    /// Subscribe to the output of every control period.
    pub fn output(&self) -> watch::Receiver<ControlOutput> {
        self.output.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Abort the task. Returns `false` if it was already stopped.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                info!("flight control task stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for ControlTask {
    fn drop(&mut self) {
        self.stop();
    }
}
