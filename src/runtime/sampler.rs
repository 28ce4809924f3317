use std::time::Duration;

use embedded_time::duration::Milliseconds;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use super::ControlOutput;
use crate::error::{Error, Result};
use crate::estimator::AttitudeSnapshot;

/// One telemetry sample of the estimator and controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySample {
    pub attitude: AttitudeSnapshot,
    pub control: ControlOutput,
}

/// Receiver of telemetry samples, e.g. a serial link formatter.
pub trait TelemetrySink {
    fn record(&mut self, sample: &TelemetrySample);
}

/// Periodically samples the latest state into a [`TelemetrySink`].
#[derive(Debug)]
pub struct StateSampler {
    attitude: watch::Receiver<AttitudeSnapshot>,
    control: watch::Receiver<ControlOutput>,
    handle: Option<JoinHandle<()>>,
}

impl StateSampler {
    pub fn new(
        attitude: watch::Receiver<AttitudeSnapshot>,
        control: watch::Receiver<ControlOutput>,
    ) -> Self {
        Self {
            attitude,
            control,
            handle: None,
        }
    }

    /// Start sampling every `sample_time` for `duration`, or until stopped if `duration` is `None`.
    pub fn start<K>(
        &mut self,
        mut sink: K,
        sample_time: Milliseconds<u32>,
        duration: Option<Milliseconds<u32>>,
    ) -> Result<()>
    where
        K: TelemetrySink + Send + 'static,
    {
        if self.is_running() {
            return Err(Error::AlreadyRunning("state sampling"));
        }
        if sample_time.0 == 0 {
            return Err(Error::InvalidConfig("sample time must be positive"));
        }
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime("state sampling"))?;

        let samples = duration.map(|duration| (duration.0 / sample_time.0).max(1));
        let attitude = self.attitude.clone();
        let control = self.control.clone();

        self.handle = Some(runtime.spawn(async move {
            let mut interval = time::interval(Duration::from_millis(u64::from(sample_time.0)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut count: u32 = 0;
            while samples.map_or(true, |samples| count < samples) {
                interval.tick().await;
                sink.record(&TelemetrySample {
                    attitude: *attitude.borrow(),
                    control: *control.borrow(),
                });
                count = count.wrapping_add(1);
            }
            info!(samples = count, "state sampling finished");
        }));
        info!(sample_time_ms = sample_time.0, "state sampling started");

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Stop sampling. Returns `false` if sampling was not started.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                info!("state sampling stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for StateSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
