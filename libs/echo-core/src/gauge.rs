use crate::config::{ConfigError, VisualizationConfig};

const FILL: &str = "=";
const BLANK: &str = " ";
const EDGE: char = '|';
const RULE: &str = "-";

/// Fixed-width ASCII depth gauge.
///
/// For `max_depth = 100`, `resolution = 20` and a depth of 50:
///
/// ```text
/// Depth: 50.00m
/// |==========          |
/// ----------------------
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gauge {
    max_depth: f32,
    resolution: u32,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            max_depth: 100.0,
            resolution: 20,
        }
    }
}

impl Gauge {
    pub fn new(max_depth: f32, resolution: u32) -> Result<Self, ConfigError> {
        Self::from_config(&VisualizationConfig {
            max_depth,
            resolution,
            ..Default::default()
        })
    }

    pub fn from_config(config: &VisualizationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            max_depth: config.max_depth,
            resolution: config.resolution,
        })
    }

    pub fn max_depth(&self) -> f32 {
        self.max_depth
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of filled cells: `floor(min(depth / max_depth, 1) * resolution)`.
    ///
    /// Depths above `max_depth` clamp to a full gauge. Negative depths are
    /// not clamped and yield a negative level. NaN yields 0.
    pub fn level(&self, depth: f32) -> i64 {
        if depth.is_nan() {
            return 0;
        }
        let normalized = (depth / self.max_depth).min(1.0);
        (normalized * self.resolution as f32).floor() as i64
    }

    /// The delimited bar, e.g. `|=====     |`. A negative level draws no fill.
    pub fn bar(&self, depth: f32) -> String {
        let cells = self.resolution as usize;
        let filled = self.level(depth).clamp(0, self.resolution as i64) as usize;

        let mut bar = String::with_capacity(cells + 2);
        bar.push(EDGE);
        bar.push_str(&FILL.repeat(filled));
        bar.push_str(&BLANK.repeat(cells - filled));
        bar.push(EDGE);
        bar
    }

    /// Full three-line block: depth header, bar, separator. Ends with a newline.
    pub fn render(&self, depth: f32) -> String {
        format!(
            "Depth: {depth:.2}m\n{}\n{}\n",
            self.bar(depth),
            RULE.repeat(self.resolution as usize + 2)
        )
    }
}
