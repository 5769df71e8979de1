use std::path::Path;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use echo_core::{AcquisitionConfig, ProcessingConfig, VisualizationConfig};

use crate::error::SounderError;

#[derive(Parser)]
#[command(name = "echo-sounder", about = "Echo-sounder telemetry pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more pipeline stages until Ctrl+C
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Stage {
    Acquisition,
    Processing,
    Visualization,
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml", env = "ECHO_SOUNDER_CONFIG")]
    pub config: String,

    /// Stage to run; repeat for several. All three when omitted
    #[arg(long = "stage", value_enum)]
    pub stages: Vec<Stage>,

    /// Acquisition tick period in milliseconds
    #[arg(long, env = "ECHO_SOUNDER_PERIOD_MS")]
    pub period_ms: Option<u64>,

    /// Depth drawn as a full gauge
    #[arg(long, env = "ECHO_SOUNDER_MAX_DEPTH")]
    pub max_depth: Option<f32>,

    /// Number of gauge cells
    #[arg(long, env = "ECHO_SOUNDER_RESOLUTION")]
    pub resolution: Option<u32>,

    /// Per-subscriber queue length on the bus
    #[arg(long, env = "ECHO_SOUNDER_BUFFER")]
    pub buffer: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub acquisition: AcquisitionConfig,
    pub processing: ProcessingConfig,
    pub visualization: VisualizationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            buffer: echo_bus::DEFAULT_BUFFER,
        }
    }
}

pub fn load_config(path: &str) -> Result<Config, SounderError> {
    let content = std::fs::read_to_string(path).map_err(|e| SounderError::Config {
        context: "read",
        detail: format!("'{path}': {e}"),
    })?;
    parse_config(&content).map_err(|detail| SounderError::Config {
        context: "parse",
        detail: format!("'{path}': {detail}"),
    })
}

fn parse_config(content: &str) -> Result<Config, String> {
    toml::from_str(content).map_err(|e| e.to_string())
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Final configuration: config file < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub stages: Vec<Stage>,
    pub buffer: usize,
    pub acquisition: AcquisitionConfig,
    pub processing: ProcessingConfig,
    pub visualization: VisualizationConfig,
}

impl Effective {
    pub fn new(args: &RunArgs) -> Result<Self, SounderError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(&args.config).exists() {
                    return Err(e);
                }
                tracing::debug!(config = %args.config, "no config file, using defaults");
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    fn merge(args: &RunArgs, cfg: Config) -> Result<Self, SounderError> {
        let mut stages = args.stages.clone();
        if stages.is_empty() {
            stages = vec![Stage::Acquisition, Stage::Processing, Stage::Visualization];
        }
        stages.sort();
        stages.dedup();

        let buffer = args.buffer.unwrap_or(cfg.bus.buffer);
        if buffer == 0 {
            return Err(SounderError::Invalid(echo_core::ConfigError::Invalid {
                field: "buffer",
                reason: "must be greater than 0".into(),
            }));
        }

        let mut acquisition = cfg.acquisition;
        if let Some(period_ms) = args.period_ms {
            acquisition.period_ms = period_ms;
        }
        let mut visualization = cfg.visualization;
        if let Some(max_depth) = args.max_depth {
            visualization.max_depth = max_depth;
        }
        if let Some(resolution) = args.resolution {
            visualization.resolution = resolution;
        }

        acquisition.validate()?;
        visualization.validate()?;

        Ok(Self {
            stages,
            buffer,
            acquisition,
            processing: cfg.processing,
            visualization,
        })
    }

    pub fn runs(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}
