pub mod error;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use echo_api::{
    BusError, EchoBus, EchoSample, Participant, SampleHandler, SampleInfo, SampleReader,
    SampleWriter, TopicHandle, TypeSchema,
};

pub use error::MemoryBusError;

/// Per-subscriber queue length used by `MemoryBus::new`.
pub const DEFAULT_BUFFER: usize = 64;

type Delivery = (EchoSample, SampleInfo);

fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(lock = what, "read lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!(lock = what, "write lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topic
// ═══════════════════════════════════════════════════════════════

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Delivery>,
}

/// Named, typed channel. Every subscriber owns a bounded queue; a full queue
/// drops the sample for that subscriber only.
pub struct Topic {
    name: String,
    type_name: String,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl Topic {
    fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn subscriber_count(&self) -> usize {
        read_lock(&self.subscribers, "topic subscribers").len()
    }

    fn subscribe(&self, id: u64, buffer: usize) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(buffer);
        write_lock(&self.subscribers, "topic subscribers").push(Subscriber { id, tx });
        rx
    }

    fn unsubscribe(&self, id: u64) {
        write_lock(&self.subscribers, "topic subscribers").retain(|s| s.id != id);
    }

    /// Fan `delivery` out to all subscribers. Returns how many queues took it.
    fn publish(&self, delivery: Delivery) -> usize {
        let mut subs = write_lock(&self.subscribers, "topic subscribers");
        let mut delivered = 0;
        let mut i = 0;
        while i < subs.len() {
            match subs[i].tx.try_send(delivery) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(topic = %self.name, subscriber = subs[i].id, "subscriber queue full, dropping sample");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    subs.swap_remove(i);
                    continue;
                }
            }
            i += 1;
        }
        delivered
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBus
// ═══════════════════════════════════════════════════════════════

struct Domain {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    buffer: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Domain {
    fn ensure_open(&self) -> Result<(), MemoryBusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MemoryBusError::Shutdown);
        }
        Ok(())
    }
}

/// In-process bus. Clones share one domain: participants created from any
/// clone see the same topics.
#[derive(Clone)]
pub struct MemoryBus {
    domain: Arc<Domain>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Bus whose subscriber queues hold `buffer` samples (at least one).
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            domain: Arc::new(Domain {
                topics: RwLock::new(HashMap::new()),
                buffer: buffer.max(1),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Refuse new resources and writes from now on. Existing readers keep
    /// their queued samples.
    pub fn shutdown(&self) {
        self.domain.closed.store(true, Ordering::SeqCst);
        tracing::debug!("memory bus shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.domain.closed.load(Ordering::SeqCst)
    }

    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        read_lock(&self.domain.topics, "bus topics").get(name).cloned()
    }
}

impl EchoBus for MemoryBus {
    fn create_participant(&self, name: &str) -> Result<Arc<dyn Participant>, BusError> {
        self.domain.ensure_open()?;
        tracing::debug!(participant = %name, "participant created");
        Ok(Arc::new(MemoryParticipant {
            name: name.to_string(),
            domain: Arc::clone(&self.domain),
            types: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashSet::new()),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Participant
// ═══════════════════════════════════════════════════════════════

pub struct MemoryParticipant {
    name: String,
    domain: Arc<Domain>,
    types: RwLock<HashMap<&'static str, TypeSchema>>,
    topics: RwLock<HashSet<String>>,
}

impl MemoryParticipant {
    fn joined_topic(&self, handle: &TopicHandle) -> Result<Arc<Topic>, MemoryBusError> {
        let not_found = || MemoryBusError::TopicNotFound {
            topic: handle.name().to_string(),
            participant: self.name.clone(),
        };
        if !read_lock(&self.topics, "participant topics").contains(handle.name()) {
            return Err(not_found());
        }
        read_lock(&self.domain.topics, "bus topics")
            .get(handle.name())
            .cloned()
            .ok_or_else(not_found)
    }
}

impl Participant for MemoryParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_type(&self, schema: &TypeSchema) -> Result<(), BusError> {
        self.domain.ensure_open()?;
        let mut types = write_lock(&self.types, "participant types");
        if let Some(existing) = types.get(schema.name) {
            if existing != schema {
                return Err(MemoryBusError::SchemaConflict(schema.name.to_string()).into());
            }
            return Ok(());
        }
        types.insert(schema.name, *schema);
        tracing::debug!(participant = %self.name, schema = %schema, "type registered");
        Ok(())
    }

    fn create_topic(&self, name: &str, type_name: &str) -> Result<TopicHandle, BusError> {
        self.domain.ensure_open()?;
        if !read_lock(&self.types, "participant types").contains_key(type_name) {
            return Err(MemoryBusError::UnknownType {
                type_name: type_name.to_string(),
                participant: self.name.clone(),
            }
            .into());
        }

        let mut topics = write_lock(&self.domain.topics, "bus topics");
        let topic = topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(name, type_name)));
        if topic.type_name() != type_name {
            return Err(MemoryBusError::TypeMismatch {
                topic: name.to_string(),
                existing: topic.type_name().to_string(),
                requested: type_name.to_string(),
            }
            .into());
        }
        drop(topics);

        write_lock(&self.topics, "participant topics").insert(name.to_string());
        tracing::debug!(participant = %self.name, topic = %name, type_name = %type_name, "topic created");
        Ok(TopicHandle::new(name, type_name))
    }

    fn create_writer(&self, topic: &TopicHandle) -> Result<Box<dyn SampleWriter>, BusError> {
        self.domain.ensure_open()?;
        let topic = self.joined_topic(topic)?;
        tracing::debug!(participant = %self.name, topic = %topic.name(), "writer created");
        Ok(Box::new(MemoryWriter {
            topic,
            domain: Arc::clone(&self.domain),
        }))
    }

    fn create_reader(
        &self,
        topic: &TopicHandle,
        on_sample: SampleHandler,
    ) -> Result<Box<dyn SampleReader>, BusError> {
        self.domain.ensure_open()?;
        let topic = self.joined_topic(topic)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MemoryBusError::NoRuntime)?;

        let id = self.domain.next_id.fetch_add(1, Ordering::Relaxed);
        let mut rx = topic.subscribe(id, self.domain.buffer);
        let token = CancellationToken::new();

        let task_token = token.clone();
        let topic_name = topic.name().to_string();
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    delivery = rx.recv() => match delivery {
                        Some((sample, info)) => on_sample(sample, info),
                        None => break,
                    },
                    _ = task_token.cancelled() => break,
                }
            }
            tracing::debug!(topic = %topic_name, reader = id, "delivery stopped");
        });

        tracing::debug!(participant = %self.name, topic = %topic.name(), reader = id, "reader created");
        Ok(Box::new(MemoryReader { topic, id, token }))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Writer / Reader
// ═══════════════════════════════════════════════════════════════

pub struct MemoryWriter {
    topic: Arc<Topic>,
    domain: Arc<Domain>,
}

impl MemoryWriter {
    fn send(&self, delivery: Delivery) -> Result<(), BusError> {
        self.domain
            .ensure_open()
            .map_err(|e| e.into_bus_error().with_context(self.topic.name()))?;
        let delivered = self.topic.publish(delivery);
        tracing::trace!(topic = %self.topic.name(), delivered, "sample written");
        Ok(())
    }
}

impl SampleWriter for MemoryWriter {
    fn topic(&self) -> &str {
        self.topic.name()
    }

    fn write(&self, sample: &EchoSample) -> Result<(), BusError> {
        self.send((*sample, SampleInfo::valid()))
    }

    fn dispose(&self, sample: &EchoSample) -> Result<(), BusError> {
        self.send((*sample, SampleInfo::disposed()))
    }
}

pub struct MemoryReader {
    topic: Arc<Topic>,
    id: u64,
    token: CancellationToken,
}

impl SampleReader for MemoryReader {
    fn topic(&self) -> &str {
        self.topic.name()
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.token.cancel();
        self.topic.unsubscribe(self.id);
        tracing::debug!(topic = %self.topic.name(), reader = self.id, "reader released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use echo_api::ErrorKind;

    fn channel_handler() -> (SampleHandler, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: SampleHandler = Arc::new(move |sample: EchoSample, info: SampleInfo| {
            let _ = tx.send((sample, info));
        });
        (handler, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("handler channel closed")
    }

    fn joined(bus: &MemoryBus, name: &str) -> (Arc<dyn Participant>, TopicHandle) {
        let participant = bus.create_participant(name).unwrap();
        participant.register_type(&EchoSample::schema()).unwrap();
        let topic = participant
            .create_topic("RawEchoDataTopic", EchoSample::TYPE_NAME)
            .unwrap();
        (participant, topic)
    }

    #[tokio::test]
    async fn delivers_in_publish_order_across_participants() {
        let bus = MemoryBus::new();
        let (publisher, pub_topic) = joined(&bus, "pub");
        let (subscriber, sub_topic) = joined(&bus, "sub");

        let (handler, mut rx) = channel_handler();
        let _reader = subscriber.create_reader(&sub_topic, handler).unwrap();
        let writer = publisher.create_writer(&pub_topic).unwrap();

        for i in 0..5 {
            writer.write(&EchoSample::acquired(i, i as f32)).unwrap();
        }
        for i in 0..5 {
            let (sample, info) = next(&mut rx).await;
            assert!(info.valid_data);
            assert_eq!(sample.timestamp, i);
        }
    }

    #[tokio::test]
    async fn write_without_subscribers_is_accepted() {
        let bus = MemoryBus::new();
        let (participant, topic) = joined(&bus, "lonely");
        let writer = participant.create_writer(&topic).unwrap();
        assert!(writer.write(&EchoSample::acquired(1, 2.0)).is_ok());
    }

    #[tokio::test]
    async fn dispose_arrives_as_invalid_data() {
        let bus = MemoryBus::new();
        let (participant, topic) = joined(&bus, "p");
        let (handler, mut rx) = channel_handler();
        let _reader = participant.create_reader(&topic, handler).unwrap();
        let writer = participant.create_writer(&topic).unwrap();

        writer.dispose(&EchoSample::acquired(3, 0.0)).unwrap();
        let (_, info) = next(&mut rx).await;
        assert!(!info.valid_data);
    }

    #[tokio::test]
    async fn topic_requires_registered_type() {
        let bus = MemoryBus::new();
        let participant = bus.create_participant("p").unwrap();
        let err = participant
            .create_topic("RawEchoDataTopic", EchoSample::TYPE_NAME)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn topic_type_mismatch_is_rejected() {
        static OTHER: TypeSchema = TypeSchema { name: "Other", fields: &[] };
        let bus = MemoryBus::new();
        let _ = joined(&bus, "first");
        let participant = bus.create_participant("second").unwrap();
        participant.register_type(&OTHER).unwrap();
        let err = participant.create_topic("RawEchoDataTopic", "Other").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }

    #[tokio::test]
    async fn writer_needs_topic_created_by_same_participant() {
        let bus = MemoryBus::new();
        let (_, topic) = joined(&bus, "owner");
        let stranger = bus.create_participant("stranger").unwrap();
        assert!(stranger.create_writer(&topic).is_err());
    }

    #[tokio::test]
    async fn dropping_reader_unsubscribes() {
        let bus = MemoryBus::new();
        let (participant, topic) = joined(&bus, "p");
        let (handler, _rx) = channel_handler();
        let reader = participant.create_reader(&topic, handler).unwrap();
        assert_eq!(reader.topic(), "RawEchoDataTopic");
        assert_eq!(bus.topic("RawEchoDataTopic").unwrap().subscriber_count(), 1);
        drop(reader);
        assert_eq!(bus.topic("RawEchoDataTopic").unwrap().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_refuses_participants_and_writes() {
        let bus = MemoryBus::new();
        let (participant, topic) = joined(&bus, "p");
        let writer = participant.create_writer(&topic).unwrap();

        bus.shutdown();
        assert!(bus.is_shut_down());
        assert_eq!(bus.create_participant("late").err().unwrap().kind, ErrorKind::Closed);
        let err = writer.write(&EchoSample::acquired(1, 1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Closed);
        assert!(err.message.starts_with("RawEchoDataTopic: "));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let bus = MemoryBus::with_buffer(1);
        let (participant, topic) = joined(&bus, "p");
        let raw = bus.topic("RawEchoDataTopic").unwrap();
        // Subscribe directly so nothing drains the queue.
        let _rx = raw.subscribe(99, 1);
        let writer = participant.create_writer(&topic).unwrap();

        writer.write(&EchoSample::acquired(1, 1.0)).unwrap();
        writer.write(&EchoSample::acquired(2, 2.0)).unwrap();
        assert_eq!(raw.publish((EchoSample::acquired(3, 3.0), SampleInfo::valid())), 0);
    }

    #[test]
    fn reader_requires_a_runtime() {
        let bus = MemoryBus::new();
        let (participant, topic) = joined(&bus, "p");
        let (handler, _rx) = channel_handler();
        let err = participant.create_reader(&topic, handler).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Resource);
    }
}
