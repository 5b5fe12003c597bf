//! The embedded event store facade.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use rivulet_storage::{StorageEngine, TrackingToken};

use crate::config::EventStoreConfig;
use crate::error::StoreError;
use crate::metrics::StoreMetrics;
use crate::tracking::cache::SharedCache;
use crate::tracking::cleaner::{self, CleanerHandle};
use crate::tracking::consumer::TrackingEventStream;
use crate::tracking::producer::{self, ProducerHandle};
use crate::tracking::registry::{ConsumerSlot, TailingRegistry};
use crate::tracking::signal::Signal;

/// An event store backed by a [`StorageEngine`], with a shared cache of
/// the most recent events for tracking consumers.
///
/// The engine remains the source of truth; the cache is an optimization
/// that spares caught-up consumers a private storage connection each. See
/// the [crate docs](crate) for the full model.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Arc::new(InMemoryStorageEngine::new());
/// let store = EmbeddedEventStore::with_config(
///     engine,
///     EventStoreConfig::builder().cached_events(1024).build(),
/// );
///
/// let mut stream = store.open_stream(None);
/// store.publish(vec![order_created])?;
/// let event = stream.next_available()?;
/// ```
pub struct EmbeddedEventStore<T> {
    inner: Arc<StoreInner<T>>,
}

/// State shared between the facade, its consumers, and the background
/// threads.
pub(crate) struct StoreInner<T> {
    pub(crate) engine: Arc<dyn StorageEngine<T>>,
    pub(crate) config: EventStoreConfig,
    pub(crate) cache: SharedCache<T>,
    pub(crate) registry: TailingRegistry<T>,
    /// Consumer-side condition: signalled after every cache append.
    pub(crate) consumable: Signal,
    pub(crate) producer: ProducerHandle,
    pub(crate) cleaner: CleanerHandle,
    pub(crate) metrics: StoreMetrics,
    threads_started: AtomicBool,
    shut_down: AtomicBool,
    next_consumer_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> EmbeddedEventStore<T> {
    /// Creates a store with default configuration.
    #[must_use]
    pub fn new(engine: Arc<dyn StorageEngine<T>>) -> Self {
        Self::with_config(engine, EventStoreConfig::default())
    }

    /// Creates a store with the given configuration.
    #[must_use]
    pub fn with_config(engine: Arc<dyn StorageEngine<T>>, config: EventStoreConfig) -> Self {
        let cached_events = config.effective_cached_events();
        Self {
            inner: Arc::new(StoreInner {
                engine,
                config,
                cache: SharedCache::new(cached_events),
                registry: TailingRegistry::new(),
                consumable: Signal::new(),
                producer: ProducerHandle::new(),
                cleaner: CleanerHandle::new(),
                metrics: StoreMetrics::default(),
                threads_started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                next_consumer_id: AtomicU64::new(0),
            }),
        }
    }

    /// Appends `events` to the storage engine and wakes the producer so
    /// the commit reaches tailing consumers without waiting out the fetch
    /// delay.
    ///
    /// Returns the tokens the engine assigned, in input order.
    ///
    /// # Errors
    ///
    /// Propagates the engine's append failure; the cache is unaffected.
    pub fn publish(&self, events: Vec<T>) -> Result<Vec<TrackingToken>, StoreError> {
        let count = events.len() as u64;
        let tokens = self.inner.engine.append(events)?;
        self.inner.metrics.record_published(count);
        self.inner.producer.fetch_if_waiting();
        Ok(tokens)
    }

    /// Opens a stream of all events committed strictly after `token`
    /// (`None` streams from the beginning of the log).
    ///
    /// When the event for `token` is still in the shared cache (and the
    /// cache is enabled), the consumer starts out tailing, anchored at
    /// that node; otherwise it starts on a private storage stream and is
    /// promoted once it catches up.
    #[must_use]
    pub fn open_stream(&self, token: Option<TrackingToken>) -> TrackingEventStream<T> {
        let id = self.inner.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(ConsumerSlot::new(id, token));
        if self.inner.config.optimize_event_consumption {
            if let Some(node) = self.inner.cache.find_node(token) {
                slot.set_last_node(Some(node));
                StoreInner::start_tailing(&self.inner, &slot);
            }
        }
        TrackingEventStream::new(Arc::clone(&self.inner), slot)
    }

    /// Shuts the store down: closes every tailing consumer, stops the
    /// producer and the cleaner, and joins their threads. Idempotent.
    ///
    /// Streams already handed out keep answering: closed ones report
    /// closure, consumers that were never tailing keep reading their
    /// private stream as long as the engine serves them.
    pub fn shut_down(&self) {
        self.inner.shut_down();
    }

    /// Counters maintained by the store.
    #[must_use]
    pub fn metrics(&self) -> &StoreMetrics {
        &self.inner.metrics
    }

    /// Number of consumers currently fed by the shared cache.
    #[must_use]
    pub fn tailing_consumer_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether the background producer thread has been started and not
    /// yet stopped.
    #[must_use]
    pub fn is_producer_running(&self) -> bool {
        self.inner.threads_started.load(Ordering::Acquire) && !self.inner.producer.is_closed()
    }
}

impl<T> Drop for EmbeddedEventStore<T> {
    fn drop(&mut self) {
        self.inner.shut_down();
    }
}

impl<T> std::fmt::Debug for EmbeddedEventStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedEventStore")
            .field("tailing_consumers", &self.inner.registry.len())
            .field("cache", &self.inner.cache)
            .field("shut_down", &self.inner.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl<T> StoreInner<T> {
    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Removes a consumer from the tailing set and drops its node anchor.
    pub(crate) fn stop_tailing(&self, slot: &Arc<ConsumerSlot<T>>) {
        slot.set_tailing(false);
        self.registry.remove(slot.id());
        slot.clear_last_node();
    }

    /// Stops both background threads and closes all tailing consumers.
    pub(crate) fn shut_down(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in self.registry.snapshot() {
            slot.close();
            slot.set_tailing(false);
            slot.clear_last_node();
        }
        self.registry.clear();
        // Wake blocked peeks so they observe the closed flag.
        self.consumable.notify_all();
        self.producer.close();
        self.cleaner.signal.notify_all();
        if let Some(handle) = self.producer.take_thread() {
            let _ = handle.join();
        }
        if let Some(handle) = self.cleaner.take_thread() {
            let _ = handle.join();
        }
        tracing::debug!("event store shut down");
    }
}

impl<T: Clone + Send + Sync + 'static> StoreInner<T> {
    /// Adds a consumer to the tailing set, starting the background
    /// threads on first use.
    pub(crate) fn start_tailing(inner: &Arc<Self>, slot: &Arc<ConsumerSlot<T>>) {
        slot.set_tailing(true);
        inner.registry.add(Arc::clone(slot));
        Self::ensure_threads_started(inner);
    }

    /// Starts the producer and cleaner threads exactly once.
    fn ensure_threads_started(inner: &Arc<Self>) {
        if inner.is_shut_down() {
            return;
        }
        if inner
            .threads_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let prefix = &inner.config.thread_name_prefix;

        let producer_inner = Arc::clone(inner);
        match thread::Builder::new()
            .name(format!("{prefix}-producer"))
            .spawn(move || producer::run(&producer_inner))
        {
            Ok(handle) => inner.producer.set_thread(handle),
            Err(error) => {
                tracing::error!(%error, "failed to spawn the event producer thread");
            }
        }

        let cleaner_inner = Arc::clone(inner);
        match thread::Builder::new()
            .name(format!("{prefix}-cleaner"))
            .spawn(move || cleaner::run(&cleaner_inner))
        {
            Ok(handle) => inner.cleaner.set_thread(handle),
            Err(error) => {
                tracing::error!(%error, "failed to spawn the cache cleaner thread");
            }
        }
    }
}
