//! Background producer: polls storage and feeds the shared cache.
//!
//! A single dedicated thread runs [`run`] once the first tailing consumer
//! appears. Each cycle it drains a fresh storage stream opened after the
//! cache tail, appends one node per event, wakes waiting consumers, and
//! trims the head. Between cycles it sleeps for the configured fetch
//! delay, or less: a local commit sets `should_fetch` and signals the
//! producer so freshly published events are cached without waiting out the
//! delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use rivulet_storage::{EventStream, TrackedEvent, TrackingToken};

use crate::store::StoreInner;

use super::cache::Node;
use super::signal::Signal;

/// Producer-side flags and wake-up channel, shared with user threads.
pub(crate) struct ProducerHandle {
    should_fetch: AtomicBool,
    closed: AtomicBool,
    signal: Signal,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ProducerHandle {
    pub(crate) fn new() -> Self {
        Self {
            should_fetch: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            signal: Signal::new(),
            thread: Mutex::new(None),
        }
    }

    /// Requests an immediate fetch. Called after every local commit;
    /// harmless when the producer is not running.
    pub(crate) fn fetch_if_waiting(&self) {
        self.should_fetch.store(true, Ordering::Release);
        self.signal.notify_all();
    }

    /// Asks the producer to stop and wakes it if it is sleeping.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.signal.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn set_thread(&self, handle: JoinHandle<()>) {
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }
}

impl std::fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Producer thread main loop.
pub(crate) fn run<T: Clone + Send + Sync + 'static>(inner: &Arc<StoreInner<T>>) {
    let handle = &inner.producer;
    // Only this thread writes `newest` or any node link.
    let mut newest: Option<Arc<Node<T>>> = None;

    while !handle.is_closed() {
        handle.should_fetch.store(true, Ordering::Release);
        let mut data_found = false;
        while handle.should_fetch.swap(false, Ordering::AcqRel) {
            data_found = fetch_data(inner, &mut newest);
        }
        if !data_found {
            handle.signal.wait_if(
                || !handle.should_fetch.load(Ordering::Acquire) && !handle.is_closed(),
                inner.config.fetch_delay,
            );
        }
    }
    tracing::debug!("event producer stopped");
}

/// Drains one storage stream into the cache.
///
/// Idles while no consumer is tailing. Returns whether the cache tail
/// advanced this cycle.
fn fetch_data<T: Clone + Send + Sync + 'static>(
    inner: &Arc<StoreInner<T>>,
    newest: &mut Option<Arc<Node<T>>>,
) -> bool {
    let before = newest.as_ref().map(|node| node.index);
    if !inner.registry.is_empty() {
        // Each node's `previous_token` must be exactly the token of the
        // preceding global event, so the anchor the stream was opened
        // with is threaded through the drain rather than re-derived from
        // consumer positions, which move concurrently.
        let mut previous_token = last_token(inner, newest);
        match inner.engine.read_events(previous_token, true) {
            Ok(mut stream) => loop {
                if inner.producer.is_closed() {
                    break;
                }
                match stream.next_event() {
                    Ok(Some(event)) => {
                        let token = event.token();
                        append(inner, newest, previous_token, event);
                        previous_token = Some(token);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        tracing::error!(%error, "failed to read events from the storage engine");
                        inner.metrics.record_fetch_failure();
                        break;
                    }
                }
            },
            Err(error) => {
                tracing::error!(%error, "failed to open an event stream on the storage engine");
                inner.metrics.record_fetch_failure();
            }
        }
    }
    newest.as_ref().map(|node| node.index) != before
}

/// Appends one event to the cache tail and publishes it to consumers.
fn append<T: Clone + Send + Sync + 'static>(
    inner: &Arc<StoreInner<T>>,
    newest: &mut Option<Arc<Node<T>>>,
    previous_token: Option<TrackingToken>,
    event: TrackedEvent<T>,
) {
    let index = newest.as_ref().map_or(0, |node| node.index + 1);
    let node = Arc::new(Node::new(index, previous_token, event));

    if let Some(previous) = newest.as_ref() {
        previous.link(Arc::clone(&node));
    }
    inner.cache.install_head_if_empty(&node);
    *newest = Some(Arc::clone(&node));
    inner.metrics.record_cached();

    inner.consumable.notify_all();

    let trimmed = inner.cache.trim(&node);
    if trimmed > 0 {
        inner.metrics.record_trimmed(trimmed);
    }
}

/// Where the next poll starts: the token of the cache tail, or, while the
/// cache is empty, the position of any one tailing consumer.
///
/// Taking any one is deliberate: consumers that are further behind will
/// not find their successor in the chain (no node carries their token as
/// `previous_token`), drop to a private stream, and re-read the gap from
/// storage themselves, so nobody sees a duplicate or a skip.
fn last_token<T>(
    inner: &Arc<StoreInner<T>>,
    newest: &Option<Arc<Node<T>>>,
) -> Option<TrackingToken> {
    if let Some(node) = newest {
        return Some(node.event.token());
    }
    let slots = inner.registry.snapshot();
    if slots.is_empty() {
        return None;
    }
    let mut first = None;
    for slot in &slots {
        match slot.last_token() {
            // Someone starts from the beginning: poll from the beginning.
            None => return None,
            Some(token) => {
                if first.is_none() {
                    first = Some(token);
                }
            }
        }
    }
    first
}
