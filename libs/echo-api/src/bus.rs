use std::sync::Arc;

use crate::error::BusError;
use crate::sample::{EchoSample, SampleInfo, TypeSchema};

// ════════════════════════════════════════════════════════════════
//  Bus contract
// ════════════════════════════════════════════════════════════════

/// Callback the bus invokes once per delivered sample.
///
/// Invocations for one reader are sequential; the bus decides on which
/// thread they run.
pub type SampleHandler = Arc<dyn Fn(EchoSample, SampleInfo) + Send + Sync>;

/// Entry point of a publish/subscribe bus.
pub trait EchoBus: Send + Sync {
    /// Join the bus under `name`. All later resources hang off the participant.
    fn create_participant(&self, name: &str) -> Result<Arc<dyn Participant>, BusError>;
}

/// A bus member that owns types, topics, writers and readers.
pub trait Participant: Send + Sync {
    fn name(&self) -> &str;

    /// Make `schema` known to this participant. Topics can only be created
    /// for registered types.
    fn register_type(&self, schema: &TypeSchema) -> Result<(), BusError>;

    /// Create (or join) the topic `name` carrying `type_name`.
    fn create_topic(&self, name: &str, type_name: &str) -> Result<TopicHandle, BusError>;

    /// Writer publishing on `topic`.
    fn create_writer(&self, topic: &TopicHandle) -> Result<Box<dyn SampleWriter>, BusError>;

    /// Reader delivering every sample on `topic` to `on_sample`.
    /// Dropping the reader ends the subscription.
    fn create_reader(
        &self,
        topic: &TopicHandle,
        on_sample: SampleHandler,
    ) -> Result<Box<dyn SampleReader>, BusError>;
}

/// Publishing end of a topic. Writes are fire-and-forget: `Ok` means the bus
/// accepted the sample, not that anyone received it.
pub trait SampleWriter: Send + Sync {
    fn topic(&self) -> &str;

    fn write(&self, sample: &EchoSample) -> Result<(), BusError>;

    /// Announce that `sample` is gone. Readers get it with `valid_data == false`.
    fn dispose(&self, sample: &EchoSample) -> Result<(), BusError>;
}

/// Subscription handle. Holds the delivery alive until dropped.
pub trait SampleReader: Send + Sync {
    fn topic(&self) -> &str;
}

/// Topic identity returned by `Participant::create_topic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    name: String,
    type_name: String,
}

impl TopicHandle {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}
