//! Bus wrapper that fails one kind of resource (or the first few writes) on
//! demand and counts the participants, writers and readers still alive.
//! Also a log capture for asserting on console lines.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use echo_api::{
    BusError, EchoBus, EchoSample, Participant, SampleHandler, SampleReader, SampleWriter,
    TopicHandle, TypeSchema,
};
use echo_bus::MemoryBus;

use crate::controller::Resource;

#[derive(Clone, Default)]
pub struct LiveCount(Arc<AtomicUsize>);

impl LiveCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Guard {
        self.0.fetch_add(1, Ordering::SeqCst);
        Guard(self.clone())
    }
}

struct Guard(LiveCount);

impl Drop for Guard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FaultyBus {
    inner: MemoryBus,
    fail_at: Option<Resource>,
    write_failures: Arc<AtomicUsize>,
    live: LiveCount,
}

impl FaultyBus {
    pub fn failing_at(resource: Resource) -> Self {
        Self {
            inner: MemoryBus::new(),
            fail_at: Some(resource),
            write_failures: Arc::new(AtomicUsize::new(0)),
            live: LiveCount::default(),
        }
    }

    /// Every resource succeeds, but the first `count` writes across all
    /// writers are refused.
    pub fn failing_writes(count: usize) -> Self {
        Self {
            inner: MemoryBus::new(),
            fail_at: None,
            write_failures: Arc::new(AtomicUsize::new(count)),
            live: LiveCount::default(),
        }
    }

    pub fn live_resources(&self) -> LiveCount {
        self.live.clone()
    }

    /// Handle to the number of writes still to be refused.
    pub fn pending_write_failures(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.write_failures)
    }
}

fn check(fail_at: Option<Resource>, resource: Resource) -> Result<(), BusError> {
    if fail_at == Some(resource) {
        return Err(BusError::resource(format!("injected {resource} failure")));
    }
    Ok(())
}

impl EchoBus for FaultyBus {
    fn create_participant(&self, name: &str) -> Result<Arc<dyn Participant>, BusError> {
        check(self.fail_at, Resource::Participant)?;
        let inner = self.inner.create_participant(name)?;
        Ok(Arc::new(FaultyParticipant {
            inner,
            fail_at: self.fail_at,
            write_failures: Arc::clone(&self.write_failures),
            live: self.live.clone(),
            _guard: self.live.acquire(),
        }))
    }
}

struct FaultyParticipant {
    inner: Arc<dyn Participant>,
    fail_at: Option<Resource>,
    write_failures: Arc<AtomicUsize>,
    live: LiveCount,
    _guard: Guard,
}

impl Participant for FaultyParticipant {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn register_type(&self, schema: &TypeSchema) -> Result<(), BusError> {
        check(self.fail_at, Resource::Type)?;
        self.inner.register_type(schema)
    }

    fn create_topic(&self, name: &str, type_name: &str) -> Result<TopicHandle, BusError> {
        check(self.fail_at, Resource::Topic)?;
        self.inner.create_topic(name, type_name)
    }

    fn create_writer(&self, topic: &TopicHandle) -> Result<Box<dyn SampleWriter>, BusError> {
        check(self.fail_at, Resource::Writer)?;
        let inner = self.inner.create_writer(topic)?;
        Ok(Box::new(CountedWriter {
            inner,
            write_failures: Arc::clone(&self.write_failures),
            _guard: self.live.acquire(),
        }))
    }

    fn create_reader(
        &self,
        topic: &TopicHandle,
        on_sample: SampleHandler,
    ) -> Result<Box<dyn SampleReader>, BusError> {
        check(self.fail_at, Resource::Reader)?;
        let inner = self.inner.create_reader(topic, on_sample)?;
        Ok(Box::new(CountedReader {
            inner,
            _guard: self.live.acquire(),
        }))
    }
}

struct CountedWriter {
    inner: Box<dyn SampleWriter>,
    write_failures: Arc<AtomicUsize>,
    _guard: Guard,
}

impl SampleWriter for CountedWriter {
    fn topic(&self) -> &str {
        self.inner.topic()
    }

    fn write(&self, sample: &EchoSample) -> Result<(), BusError> {
        let refused = self
            .write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BusError::delivery("injected write failure").with_context(self.topic()));
        }
        self.inner.write(sample)
    }

    fn dispose(&self, sample: &EchoSample) -> Result<(), BusError> {
        self.inner.dispose(sample)
    }
}

struct CountedReader {
    inner: Box<dyn SampleReader>,
    _guard: Guard,
}

impl SampleReader for CountedReader {
    fn topic(&self) -> &str {
        self.inner.topic()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Log capture
// ═══════════════════════════════════════════════════════════════

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a plain-text fmt subscriber installed on this thread and
/// return `f`'s result together with everything it logged.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    (result, logs)
}
