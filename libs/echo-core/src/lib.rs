//! Stage logic of the echo-sounder pipeline.
//!
//! ```text
//! Acquisition ──RawEchoDataTopic──▶ Processing ──ProcessedEchoDataTopic──▶ Visualization
//! ```
//!
//! Each controller talks to the bus only through `echo_api::EchoBus`; any
//! bus implementation can host them.

pub mod acquisition;
pub mod config;
pub mod controller;
pub mod gauge;
pub mod processing;
pub mod visualization;

#[cfg(test)]
mod testing;

pub use acquisition::AcquisitionController;
pub use config::{AcquisitionConfig, ConfigError, ProcessingConfig, VisualizationConfig};
pub use controller::{ControllerError, ControllerState, Resource};
pub use gauge::Gauge;
pub use processing::ProcessingController;
pub use visualization::{GaugeOutput, VisualizationController};
