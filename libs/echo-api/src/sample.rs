use serde::{Deserialize, Serialize};

/// One echo-sounder reading in transit between stages.
///
/// - `timestamp` is assigned once by acquisition and never rewritten.
/// - `raw_value` is set only by acquisition.
/// - `processed_value` stays `None` until processing has acted on the sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoSample {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub raw_value: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_value: Option<f32>,
}

impl EchoSample {
    /// Schema name the bus registers this type under.
    pub const TYPE_NAME: &'static str = "EchoSounder::EchoData";

    const FIELDS: &'static [FieldDef] = &[
        FieldDef { name: "timestamp", kind: FieldKind::Int64 },
        FieldDef { name: "rawValue", kind: FieldKind::Float32 },
        FieldDef { name: "processedValue", kind: FieldKind::Float32 },
    ];

    /// A freshly acquired sample, not yet processed.
    pub fn acquired(timestamp: i64, raw_value: f32) -> Self {
        Self {
            timestamp,
            raw_value,
            processed_value: None,
        }
    }

    /// Copy of this sample carrying `value` as the processed value.
    pub fn with_processed(self, value: f32) -> Self {
        Self {
            processed_value: Some(value),
            ..self
        }
    }

    pub fn schema() -> TypeSchema {
        TypeSchema {
            name: Self::TYPE_NAME,
            fields: Self::FIELDS,
        }
    }
}

/// Delivery metadata attached by the bus to every sample it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// `false` for lifecycle notifications (e.g. disposal) that carry no data.
    pub valid_data: bool,
}

impl SampleInfo {
    pub fn valid() -> Self {
        Self { valid_data: true }
    }

    pub fn disposed() -> Self {
        Self { valid_data: false }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Schema description
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int64,
    Float32,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Int64 => f.write_str("int64"),
            FieldKind::Float32 => f.write_str("float32"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Type description handed to `Participant::register_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSchema {
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

impl std::fmt::Display for TypeSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {}: {}", field.name, field.kind)?;
        }
        f.write_str(" }")
    }
}
