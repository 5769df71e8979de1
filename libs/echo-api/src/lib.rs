pub mod bus;
pub mod error;
pub mod sample;
mod util;

pub use bus::{EchoBus, Participant, SampleHandler, SampleReader, SampleWriter, TopicHandle};
pub use error::{BusError, ErrorKind};
pub use sample::{EchoSample, FieldDef, FieldKind, SampleInfo, TypeSchema};
pub use util::now_ms;

/// Topic carrying samples straight from acquisition.
pub const RAW_ECHO_TOPIC: &str = "RawEchoDataTopic";

/// Topic carrying corrected samples from processing.
pub const PROCESSED_ECHO_TOPIC: &str = "ProcessedEchoDataTopic";
