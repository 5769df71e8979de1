use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use echo_api::{
    EchoBus, EchoSample, PROCESSED_ECHO_TOPIC, Participant, SampleHandler, SampleInfo,
    SampleReader,
};

use crate::config::VisualizationConfig;
use crate::controller::{ControllerError, ControllerState, Resource, init_step};
use crate::gauge::Gauge;

const NAME: &str = "VisualizationController";

/// Where rendered gauges go. Shared with the bus delivery task.
pub type GaugeOutput = Arc<Mutex<Box<dyn Write + Send>>>;

fn shared_output(output: impl Write + Send + 'static) -> GaugeOutput {
    let boxed: Box<dyn Write + Send> = Box::new(output);
    Arc::new(Mutex::new(boxed))
}

/// Render one delivery from `ProcessedEchoDataTopic` into `out`.
///
/// Returns `Ok(false)` when nothing was drawn: invalid deliveries, and
/// samples that never went through processing.
pub fn on_processed_sample(
    gauge: &Gauge,
    out: &mut dyn Write,
    sample: EchoSample,
    info: SampleInfo,
) -> io::Result<bool> {
    if !info.valid_data {
        return Ok(false);
    }
    let Some(depth) = sample.processed_value else {
        tracing::debug!(timestamp = sample.timestamp, "sample without processed value, skipping");
        return Ok(false);
    };

    out.write_all(gauge.render(depth).as_bytes())?;
    out.flush()?;
    Ok(true)
}

/// Final stage: draws every processed sample as an ASCII gauge.
pub struct VisualizationController {
    config: VisualizationConfig,
    bus: Arc<dyn EchoBus>,
    output: GaugeOutput,
    reader: Option<Box<dyn SampleReader>>,
    participant: Option<Arc<dyn Participant>>,
}

impl VisualizationController {
    /// Controller drawing to stdout.
    pub fn new(bus: Arc<dyn EchoBus>, config: VisualizationConfig) -> Self {
        Self {
            config,
            bus,
            output: shared_output(io::stdout()),
            reader: None,
            participant: None,
        }
    }

    /// Draw to `output` instead of stdout. Takes effect at `init()`.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = shared_output(output);
        self
    }

    pub fn state(&self) -> ControllerState {
        if self.reader.is_some() {
            ControllerState::Running
        } else {
            ControllerState::Uninitialized
        }
    }

    pub fn init(&mut self) -> Result<(), ControllerError> {
        if self.state() == ControllerState::Running {
            return Err(ControllerError::AlreadyRunning(NAME));
        }
        let gauge = Gauge::from_config(&self.config)?;

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
            participant.create_topic(PROCESSED_ECHO_TOPIC, EchoSample::TYPE_NAME),
        )?;

        let output = Arc::clone(&self.output);
        let handler: SampleHandler = Arc::new(move |sample: EchoSample, info: SampleInfo| {
            let mut out = match output.lock() {
                Ok(g) => g,
                Err(poisoned) => {
                    tracing::warn!("gauge output lock was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            if let Err(e) = on_processed_sample(&gauge, &mut **out, sample, info) {
                tracing::warn!(error = %e, timestamp = sample.timestamp, "gauge output failed");
            }
        });
        let reader = init_step(NAME, Resource::Reader, participant.create_reader(&topic, handler))?;
        tracing::info!(
            participant = %self.config.participant,
            topic = %reader.topic(),
            max_depth = gauge.max_depth(),
            resolution = gauge.resolution(),
            "visualization initialized"
        );
        self.reader = Some(reader);
        Ok(())
    }

    /// Wait for `token`. Drawing happens in the bus delivery task.
    pub async fn run(&self, token: CancellationToken) -> Result<(), ControllerError> {
        if self.state() != ControllerState::Running {
            return Err(ControllerError::NotInitialized(NAME));
        }
        tracing::info!("VisualizationController running. Waiting for processed data...");
        token.cancelled().await;
        tracing::info!("visualization stopped");
        Ok(())
    }
}

impl Drop for VisualizationController {
    fn drop(&mut self) {
        let had_participant = self.participant.is_some();
        self.reader.take();
        self.participant.take();
        if had_participant {
            tracing::debug!(participant = %self.config.participant, "visualization released bus resources");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::FaultyBus;
    use echo_bus::MemoryBus;

    fn draw(sample: EchoSample, info: SampleInfo) -> (bool, String) {
        let mut out = Vec::new();
        let drawn = on_processed_sample(&Gauge::default(), &mut out, sample, info).unwrap();
        (drawn, String::from_utf8(out).unwrap())
    }

    #[test]
    fn draws_processed_depth() {
        let (drawn, text) = draw(EchoSample::acquired(1, 80.0).with_processed(72.0), SampleInfo::valid());
        assert!(drawn);
        assert_eq!(
            text,
            format!("Depth: 72.00m\n|{}{}|\n{}\n", "=".repeat(14), " ".repeat(6), "-".repeat(22))
        );
    }

    #[test]
    fn ignores_invalid_and_unprocessed_samples() {
        let (drawn, text) = draw(EchoSample::acquired(1, 80.0).with_processed(72.0), SampleInfo::disposed());
        assert!(!drawn);
        assert!(text.is_empty());

        let (drawn, text) = draw(EchoSample::acquired(1, 80.0), SampleInfo::valid());
        assert!(!drawn);
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn invalid_gauge_config_fails_before_touching_the_bus() {
        let bus = FaultyBus::failing_at(Resource::Writer);
        let live = bus.live_resources();
        let config = VisualizationConfig { resolution: 0, ..Default::default() };
        let mut controller = VisualizationController::new(Arc::new(bus), config);

        assert!(matches!(controller.init(), Err(ControllerError::Config(_))));
        assert_eq!(controller.state(), ControllerState::Uninitialized);
        assert_eq!(live.get(), 0);
    }

    #[tokio::test]
    async fn topic_failure_is_fatal() {
        let bus = FaultyBus::failing_at(Resource::Topic);
        let mut controller =
            VisualizationController::new(Arc::new(bus), VisualizationConfig::default());
        let err = controller.init().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ControllerError::Init { resource: Resource::Topic, .. }));
    }

    #[tokio::test]
    async fn init_then_run_until_cancelled() {
        let mut controller =
            VisualizationController::new(Arc::new(MemoryBus::new()), VisualizationConfig::default())
                .with_output(io::sink());
        controller.init().unwrap();
        assert_eq!(controller.state(), ControllerState::Running);

        let token = CancellationToken::new();
        token.cancel();
        controller.run(token).await.unwrap();
    }
}
