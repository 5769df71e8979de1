use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ═══════════════════════════════════════════════════════════════
//  Acquisition
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Participant name announced on the bus.
    pub participant: String,
    /// Tick period in milliseconds.
    pub period_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            participant: "AcquisitionParticipant".into(),
            period_ms: 1000,
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "period_ms",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Processing
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub participant: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            participant: "ProcessingParticipant".into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Visualization
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    pub participant: String,
    /// Depth shown as a full gauge, same unit as `processedValue`.
    pub max_depth: f32,
    /// Number of gauge cells.
    pub resolution: u32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            participant: "VisualizationParticipant".into(),
            max_depth: 100.0,
            resolution: 20,
        }
    }
}

impl VisualizationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_depth.is_finite() || self.max_depth <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "max_depth",
                reason: format!("must be a positive finite number, got {}", self.max_depth),
            });
        }
        if self.resolution == 0 {
            return Err(ConfigError::Invalid {
                field: "resolution",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
