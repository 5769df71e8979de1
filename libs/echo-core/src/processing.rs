use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use echo_api::{
    EchoBus, EchoSample, PROCESSED_ECHO_TOPIC, Participant, RAW_ECHO_TOPIC, SampleHandler,
    SampleInfo, SampleReader, SampleWriter,
};

use crate::config::ProcessingConfig;
use crate::controller::{ControllerError, ControllerState, Resource, init_step};

const NAME: &str = "ProcessingController";

/// Fixed downward correction applied to every raw value.
pub const CORRECTION_FACTOR: f64 = 0.9;

/// Corrected value for `raw`. Computed in f64, narrowed to the wire's f32.
pub fn correct(raw: f32) -> f32 {
    (f64::from(raw) * CORRECTION_FACTOR) as f32
}

/// Processed copy of `sample`: same timestamp and raw value, plus the
/// corrected value.
pub fn process(sample: &EchoSample) -> EchoSample {
    sample.with_processed(correct(sample.raw_value))
}

/// Handle one delivery from `RawEchoDataTopic`.
///
/// Returns `Ok(None)` for deliveries without valid data, which are dropped
/// without a trace. Each call depends only on its input: duplicates produce
/// duplicates.
pub fn on_raw_sample(
    writer: &dyn SampleWriter,
    sample: EchoSample,
    info: SampleInfo,
) -> Result<Option<EchoSample>, ControllerError> {
    if !info.valid_data {
        return Ok(None);
    }

    let processed = process(&sample);
    writer.write(&processed).map_err(|source| ControllerError::Delivery {
        topic: writer.topic().to_string(),
        source,
    })?;

    tracing::info!("Published processed data with timestamp: {}", processed.timestamp);
    Ok(Some(processed))
}

/// Middle stage: raw samples in, corrected samples out.
pub struct ProcessingController {
    config: ProcessingConfig,
    bus: Arc<dyn EchoBus>,
    reader: Option<Box<dyn SampleReader>>,
    writer: Option<Arc<dyn SampleWriter>>,
    participant: Option<Arc<dyn Participant>>,
}

impl ProcessingController {
    pub fn new(bus: Arc<dyn EchoBus>, config: ProcessingConfig) -> Self {
        Self {
            config,
            bus,
            reader: None,
            writer: None,
            participant: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.reader.is_some() {
            ControllerState::Running
        } else {
            ControllerState::Uninitialized
        }
    }

    /// Join the bus, open a writer on `ProcessedEchoDataTopic`, then subscribe
    /// to `RawEchoDataTopic`. Deliveries start as soon as the reader exists.
    pub fn init(&mut self) -> Result<(), ControllerError> {
        if self.state() == ControllerState::Running {
            return Err(ControllerError::AlreadyRunning(NAME));
        }

        let participant = init_step(
            NAME,
            Resource::Participant,
            self.bus.create_participant(&self.config.participant),
        )?;
        self.participant = Some(Arc::clone(&participant));

        init_step(NAME, Resource::Type, participant.register_type(&EchoSample::schema()))?;
        let raw_topic = init_step(
            NAME,
            Resource::Topic,
            participant.create_topic(RAW_ECHO_TOPIC, EchoSample::TYPE_NAME),
        )?;
        let processed_topic = init_step(
            NAME,
            Resource::Topic,
            participant.create_topic(PROCESSED_ECHO_TOPIC, EchoSample::TYPE_NAME),
        )?;

        let writer: Arc<dyn SampleWriter> = Arc::from(init_step(
            NAME,
            Resource::Writer,
            participant.create_writer(&processed_topic),
        )?);
        self.writer = Some(Arc::clone(&writer));

        let handler: SampleHandler = Arc::new(move |sample: EchoSample, info: SampleInfo| {
            if let Err(e) = on_raw_sample(writer.as_ref(), sample, info) {
                tracing::warn!(error = %e, timestamp = sample.timestamp, "processed sample dropped");
            }
        });
        let reader = init_step(NAME, Resource::Reader, participant.create_reader(&raw_topic, handler))?;
        tracing::info!(
            participant = %self.config.participant,
            source = %reader.topic(),
            target = PROCESSED_ECHO_TOPIC,
            "processing initialized"
        );
        self.reader = Some(reader);
        Ok(())
    }

    /// Wait for `token`. All work happens in the bus delivery task.
    pub async fn run(&self, token: CancellationToken) -> Result<(), ControllerError> {
        if self.state() != ControllerState::Running {
            return Err(ControllerError::NotInitialized(NAME));
        }
        tracing::info!("ProcessingController running. Waiting for raw data...");
        token.cancelled().await;
        tracing::info!("processing stopped");
        Ok(())
    }
}

impl Drop for ProcessingController {
    fn drop(&mut self) {
        let had_participant = self.participant.is_some();
        // Stop deliveries before the writer they publish through goes away.
        self.reader.take();
        self.writer.take();
        self.participant.take();
        if had_participant {
            tracing::debug!(participant = %self.config.participant, "processing released bus resources");
        }
    }
}
