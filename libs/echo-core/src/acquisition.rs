use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use echo_api::{EchoBus, EchoSample, Participant, RAW_ECHO_TOPIC, SampleWriter, now_ms};

use crate::config::AcquisitionConfig;
use crate::controller::{ControllerError, ControllerState, Resource, init_step};

const NAME: &str = "AcquisitionController";

/// Synthetic raw values are drawn uniformly from this range.
pub const RAW_VALUE_RANGE: Range<f32> = 0.0..100.0;

/// Leaf stage: produces one synthetic sample per period on `RawEchoDataTopic`.
///
/// The controller owns its PRNG and the timestamp watermark; nothing is
/// shared with other stages.
pub struct AcquisitionController {
    config: AcquisitionConfig,
    bus: Arc<dyn EchoBus>,
    rng: StdRng,
    last_timestamp: i64,
    writer: Option<Box<dyn SampleWriter>>,
    participant: Option<Arc<dyn Participant>>,
}

impl AcquisitionController {
    /// Controller whose PRNG is seeded from OS entropy.
    pub fn new(bus: Arc<dyn EchoBus>, config: AcquisitionConfig) -> Self {
        Self {
            config,
            bus,
            rng: StdRng::from_entropy(),
            last_timestamp: i64::MIN,
            writer: None,
            participant: None,
        }
    }

    /// Replace the entropy seed with a fixed one. Meant for reproducible tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> ControllerState {
        if self.writer.is_some() {
            ControllerState::Running
        } else {
            ControllerState::Uninitialized
        }
    }

    /// Join the bus and open a writer on `RawEchoDataTopic`.
    pub fn init(&mut self) -> Result<(), ControllerError> {
        if self.state() == ControllerState::Running {
            return Err(ControllerError::AlreadyRunning(NAME));
        }
        self.config.validate()?;

        let participant = init_step(
            NAME,
            Resource::Participant,
            self.bus.create_participant(&self.config.participant),
        )?;
        self.participant = Some(Arc::clone(&participant));

        init_step(NAME, Resource::Type, participant.register_type(&EchoSample::schema()))?;
        let topic = init_step(
            NAME,
            Resource::Topic,
            participant.create_topic(RAW_ECHO_TOPIC, EchoSample::TYPE_NAME),
        )?;
        let writer = init_step(NAME, Resource::Writer, participant.create_writer(&topic))?;
        self.writer = Some(writer);

        tracing::info!(
            participant = %self.config.participant,
            topic = RAW_ECHO_TOPIC,
            period_ms = self.config.period_ms,
            "acquisition initialized"
        );
        Ok(())
    }

    /// Build the next sample: wall-clock timestamp (never below the previous
    /// one) and a uniform raw value.
    pub fn next_sample(&mut self) -> EchoSample {
        let timestamp = now_ms().max(self.last_timestamp);
        self.last_timestamp = timestamp;
        EchoSample::acquired(timestamp, self.rng.gen_range(RAW_VALUE_RANGE))
    }

    /// Acquire and publish one sample.
    pub fn tick(&mut self) -> Result<EchoSample, ControllerError> {
        if self.writer.is_none() {
            return Err(ControllerError::NotInitialized(NAME));
        }
        let sample = self.next_sample();
        let writer = self.writer.as_ref().ok_or(ControllerError::NotInitialized(NAME))?;
        writer.write(&sample).map_err(|source| ControllerError::Delivery {
            topic: writer.topic().to_string(),
            source,
        })?;

        tracing::info!("Timestamp: {} Published data: {}", sample.timestamp, sample.raw_value);
        Ok(sample)
    }

    /// Tick once per period until `token` is cancelled. Failed publishes are
    /// logged and the loop carries on.
    pub async fn run(&mut self, token: CancellationToken) -> Result<(), ControllerError> {
        if self.state() != ControllerState::Running {
            return Err(ControllerError::NotInitialized(NAME));
        }

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.period_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        tracing::warn!(error = %e, "sample dropped");
                    }
                }
            }
        }

        tracing::info!("acquisition stopped");
        Ok(())
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        let had_participant = self.participant.is_some();
        self.writer.take();
        self.participant.take();
        if had_participant {
            tracing::debug!(participant = %self.config.participant, "acquisition released bus resources");
        }
    }
}
