use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::error::{Error, Result};
use crate::estimator::AttitudeSnapshot;
use crate::hal::SensorSource;
use crate::sensors::{SensorFusion, SensorMessage, SENSOR_QUEUE_SIZE};

/// Producer side of the sensor event queue, handed to interrupt handlers.
///
/// Posting never blocks. A full queue drops the event.
#[derive(Debug, Clone)]
pub struct SensorEventSender {
    tx: mpsc::Sender<SensorMessage>,
    dropped: Arc<AtomicU32>,
}

impl SensorEventSender {
    /// Enqueue `message`, returning `false` if it was dropped.
    pub fn post(&self, message: SensorMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(?message, "sensor queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(message)) => {
                trace!(?message, "sensor queue closed, event dropped");
                false
            }
        }
    }

    /// Enqueue a raw interrupt tag. Unknown tags are ignored.
    pub fn post_raw(&self, tag: u8) -> bool {
        match SensorMessage::try_from(tag) {
            Ok(message) => self.post(message),
            Err(error) => {
                warn!(%error, "ignoring sensor event");
                false
            }
        }
    }

    /// The number of events dropped on a full queue.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The number of events waiting for the consumer.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Create the sensor event queue with room for [`SENSOR_QUEUE_SIZE`] events.
pub fn sensor_queue() -> (SensorEventSender, mpsc::Receiver<SensorMessage>) {
    let (tx, rx) = mpsc::channel(SENSOR_QUEUE_SIZE);
    let sender = SensorEventSender {
        tx,
        dropped: Arc::new(AtomicU32::new(0)),
    };
    (sender, rx)
}

/// Process sensor events in order until every sender is dropped.
///
/// A new snapshot is published after every event that changed the estimate.
/// Returns the fusion state once the queue closes.
pub async fn run_sensor_consumer<S>(
    mut fusion: SensorFusion,
    mut source: S,
    mut events: mpsc::Receiver<SensorMessage>,
    attitude: watch::Sender<AttitudeSnapshot>,
) -> SensorFusion
where
    S: SensorSource,
{
    while let Some(message) = events.recv().await {
        if fusion.handle(message, &mut source).changed() {
            attitude.send_replace(fusion.snapshot());
        }
    }

    info!("sensor event queue closed");
    fusion
}

/// The running estimation task and the handles to talk to it.
#[derive(Debug)]
pub struct SensorPipeline {
    pub events: SensorEventSender,
    pub attitude: watch::Receiver<AttitudeSnapshot>,
    task: JoinHandle<SensorFusion>,
}

impl SensorPipeline {
    /// Drop this sender and wait for the consumer to drain the queue.
    ///
    /// Waits for every clone of [`SensorPipeline::events`] to be dropped.
    /// Returns `None` if the task panicked or was cancelled.
    pub async fn shutdown(self) -> Option<SensorFusion> {
        let Self { events, task, .. } = self;
        drop(events);
        task.await.ok()
    }
}

/// Create the sensor event queue and spawn the task consuming it.
///
/// Must be called from within a tokio runtime before flight.
pub fn configure_sensor_pipeline<S>(fusion: SensorFusion, source: S) -> Result<SensorPipeline>
where
    S: SensorSource + Send + 'static,
{
    let handle = Handle::try_current().map_err(|_| Error::NoRuntime("sensor pipeline"))?;

    let (events, rx) = sensor_queue();
    let (attitude_tx, attitude) = watch::channel(fusion.snapshot());
    let task = handle.spawn(run_sensor_consumer(fusion, source, rx, attitude_tx));
    info!(capacity = SENSOR_QUEUE_SIZE, "sensor pipeline started");

    Ok(SensorPipeline {
        events,
        attitude,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlightConfig;
    use crate::testing::MockSensors;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;
    use tokio::sync::mpsc::error::TryRecvError;

    fn turning(rates: Vector3<f32>) -> MockSensors {
        MockSensors {
            gyro: Some(rates),
            ..MockSensors::default()
        }
    }

    fn fusion() -> SensorFusion {
        SensorFusion::new(&FlightConfig::default()).unwrap()
    }

    #[test]
    fn full_queue_drops_events() {
        let (events, mut rx) = sensor_queue();

        assert!(events.post(SensorMessage::GyroDataReady));
        assert!(events.post(SensorMessage::MagAccDataReady));
        assert!(events.post(SensorMessage::GyroCalibrate));
        assert!(!events.post(SensorMessage::MagAccCalibrate));

        assert_eq!(events.dropped(), 1);
        assert_eq!(events.queued(), SENSOR_QUEUE_SIZE);

        assert_eq!(rx.try_recv(), Ok(SensorMessage::GyroDataReady));
        assert_eq!(rx.try_recv(), Ok(SensorMessage::MagAccDataReady));
        assert_eq!(rx.try_recv(), Ok(SensorMessage::GyroCalibrate));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(events.queued(), 0);
    }

    #[test]
    fn unknown_raw_tags_are_ignored() {
        let (events, mut rx) = sensor_queue();

        assert!(!events.post_raw(0x42));
        assert!(events.post_raw(0x1A));
        assert_eq!(events.dropped(), 0);
        assert_eq!(rx.try_recv(), Ok(SensorMessage::MagAccDataReady));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn closed_queue_drops_events() {
        let (events, rx) = sensor_queue();
        drop(rx);
        assert!(!events.post(SensorMessage::GyroDataReady));
    }

    #[test]
    fn requires_runtime() {
        let result = configure_sensor_pipeline(fusion(), turning(Vector3::zeros()));
        assert_eq!(
            result.map(|_| ()),
            Err(Error::NoRuntime("sensor pipeline"))
        );
    }

    #[tokio::test]
    async fn publishes_snapshot_per_event() {
        let mut pipeline =
            configure_sensor_pipeline(fusion(), turning(Vector3::new(0.1, 0., -0.2))).unwrap();

        for i in 1..=5 {
            assert!(pipeline.events.post(SensorMessage::GyroDataReady));
            pipeline.attitude.changed().await.unwrap();

            let snapshot = *pipeline.attitude.borrow_and_update();
            assert_abs_diff_eq!(snapshot.attitude.roll, 0.001 * i as f32, epsilon = 1e-6);
            assert_abs_diff_eq!(snapshot.attitude.yaw, -0.002 * i as f32, epsilon = 1e-6);
        }

        let fusion = pipeline.shutdown().await.unwrap();
        assert_abs_diff_eq!(fusion.attitude().roll, 0.005, epsilon = 1e-6);
    }
}
