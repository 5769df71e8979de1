use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use echo_api::EchoBus;
use echo_bus::MemoryBus;
use echo_core::{
    AcquisitionController, ControllerError, ProcessingController, VisualizationController,
};

use crate::config::{Effective, RunArgs, Stage};
use crate::error::SounderError;

/// How long stopped stages get to return before they are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type StageHandle = (Stage, JoinHandle<Result<(), ControllerError>>);

pub async fn run(args: RunArgs) -> Result<(), SounderError> {
    tracing::info!("echo-sounder starting");

    // --- Load config ---
    let eff = Effective::new(&args)?;
    tracing::info!(config = %args.config, stages = ?eff.stages, buffer = eff.buffer, "loaded config");

    run_until(&eff, tokio::signal::ctrl_c()).await
}

/// Init the selected stages, run them until `shutdown` resolves, then stop
/// them. The first init failure is returned before any stage is spawned.
pub async fn run_until(
    eff: &Effective,
    shutdown: impl Future<Output = io::Result<()>>,
) -> Result<(), SounderError> {
    let bus = MemoryBus::with_buffer(eff.buffer);
    let shared: Arc<dyn EchoBus> = Arc::new(bus.clone());

    // --- Init stages ---
    // Downstream readers exist before the first raw sample is published.
    // Any failure here returns early; already created controllers release
    // their bus resources on drop.
    let mut visualization = None;
    if eff.runs(Stage::Visualization) {
        let mut controller =
            VisualizationController::new(Arc::clone(&shared), eff.visualization.clone());
        controller.init()?;
        visualization = Some(controller);
    }
    let mut processing = None;
    if eff.runs(Stage::Processing) {
        let mut controller = ProcessingController::new(Arc::clone(&shared), eff.processing.clone());
        controller.init()?;
        processing = Some(controller);
    }
    let mut acquisition = None;
    if eff.runs(Stage::Acquisition) {
        let mut controller = AcquisitionController::new(Arc::clone(&shared), eff.acquisition.clone());
        controller.init()?;
        acquisition = Some(controller);
    }

    // --- Spawn stages ---
    let token = CancellationToken::new();
    let mut handles: Vec<StageHandle> = Vec::new();

    if let Some(controller) = visualization {
        let token = token.clone();
        handles.push((Stage::Visualization, tokio::spawn(async move { controller.run(token).await })));
    }
    if let Some(controller) = processing {
        let token = token.clone();
        handles.push((Stage::Processing, tokio::spawn(async move { controller.run(token).await })));
    }
    if let Some(mut controller) = acquisition {
        let token = token.clone();
        handles.push((Stage::Acquisition, tokio::spawn(async move { controller.run(token).await })));
    }
    tracing::info!(stages = handles.len(), "echo-sounder ready");

    // --- Wait for shutdown ---
    let signal = shutdown.await;
    tracing::info!("shutting down...");
    token.cancel();

    for (stage, mut handle) in handles {
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::error!(stage = ?stage, error = %e, "stage failed"),
            Ok(Err(e)) => tracing::error!(stage = ?stage, error = %e, "stage task failed"),
            Err(_) => {
                tracing::warn!(stage = ?stage, "stage did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    bus.shutdown();
    signal?;
    tracing::info!("shutdown complete");
    Ok(())
}
