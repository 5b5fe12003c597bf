//! The event stream handed to tracking consumers.
//!
//! A [`TrackingEventStream`] delivers every event committed after its
//! start token, exactly once, in global order. Internally it runs a two
//! mode state machine:
//!
//! - **tailing**: caught up with the log; reads nodes from the shared
//!   cache and blocks on the consumer condition for new ones
//! - **private**: behind the cache (or the cache is disabled); reads its
//!   own storage stream
//!
//! A private consumer that drains its stream dry is promoted into the
//! shared cache; a tailing consumer that finds the cache head has moved
//! past it silently drops back to a private stream. `last_token` is the
//! handoff state: it only advances when an event is handed to the caller,
//! so the transition can never skip or repeat an event.

use std::sync::Arc;
use std::time::Duration;

use rivulet_storage::{EventStream, TrackedEvent};

use crate::error::StoreError;
use crate::store::StoreInner;

use super::cache::Node;
use super::registry::ConsumerSlot;

/// One wait slice of a blocking [`next_available`](TrackingEventStream::next_available).
const BLOCKING_WAIT: Duration = Duration::from_secs(60);

/// A stream of tracked events for a single reader.
///
/// Not thread-safe: one reader drives one stream. Dropping the stream
/// closes it.
pub struct TrackingEventStream<T> {
    inner: Arc<StoreInner<T>>,
    slot: Arc<ConsumerSlot<T>>,
    peeked: Option<TrackedEvent<T>>,
    private_stream: Option<Box<dyn EventStream<T>>>,
}

impl<T: Clone + Send + Sync + 'static> TrackingEventStream<T> {
    pub(crate) fn new(inner: Arc<StoreInner<T>>, slot: Arc<ConsumerSlot<T>>) -> Self {
        Self {
            inner,
            slot,
            peeked: None,
            private_stream: None,
        }
    }

    /// Returns the next event without consuming it.
    ///
    /// Non-blocking: when nothing is immediately available (or the stream
    /// is closed) this returns `None`. A subsequent
    /// [`next_available`](Self::next_available) returns the same event the
    /// peek surfaced.
    pub fn peek(&mut self) -> Option<&TrackedEvent<T>> {
        if self.peeked.is_none() {
            self.peeked = self.peek_event(Duration::ZERO);
        }
        self.peeked.as_ref()
    }

    /// Waits up to `timeout` for an event to become available.
    ///
    /// Returns `false` on timeout or when the stream is closed. The event
    /// that became available is retained for the next
    /// [`next_available`](Self::next_available) call.
    pub fn has_next_available(&mut self, timeout: Duration) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.peek_event(timeout);
        }
        self.peeked.is_some()
    }

    /// Blocks until the next event is available and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StreamClosed`] once the stream has been
    /// closed and no peeked event remains.
    pub fn next_available(&mut self) -> Result<TrackedEvent<T>, StoreError> {
        loop {
            if let Some(event) = self.peeked.take() {
                return Ok(event);
            }
            if self.slot.is_closed() {
                return Err(StoreError::StreamClosed);
            }
            self.peeked = self.peek_event(BLOCKING_WAIT);
        }
    }

    /// Closes the stream: leaves the tailing set and releases the private
    /// storage stream. Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        self.slot.close();
        self.private_stream = None;
        self.inner.stop_tailing(&self.slot);
    }

    /// Whether this consumer is currently fed by the shared cache.
    #[must_use]
    pub fn is_tailing(&self) -> bool {
        self.slot.is_tailing()
    }

    /// One step of the peek state machine.
    fn peek_event(&mut self, timeout: Duration) -> Option<TrackedEvent<T>> {
        if self.slot.is_closed() {
            return None;
        }
        // No promotion onto a shut-down store: the producer will never
        // feed the cache again, so private consumers stay private.
        let mut allow_switch =
            self.inner.config.optimize_event_consumption && !self.inner.is_shut_down();
        if self.slot.is_tailing() {
            let behind = self
                .inner
                .cache
                .is_behind(self.slot.last_node().as_ref(), self.slot.last_token());
            if !behind {
                return self.peek_shared(timeout);
            }
            tracing::debug!(
                consumer = self.slot.id(),
                "behind the shared cache, reverting to a private stream"
            );
            self.inner.stop_tailing(&self.slot);
            // Re-joining within the same peek would bounce straight back here.
            allow_switch = false;
        }
        self.peek_private(allow_switch, timeout)
    }

    /// Reads the next node from the shared cache, waiting up to `timeout`
    /// for the producer to append one.
    fn peek_shared(&mut self, timeout: Duration) -> Option<TrackedEvent<T>> {
        let mut next = self.next_node();
        if next.is_none() && !timeout.is_zero() {
            // Re-check under the lock: an append between the probe above
            // and the wait would otherwise be a missed wake-up.
            self.inner
                .consumable
                .wait_if(|| self.next_node().is_none(), timeout);
            if self.slot.is_closed() {
                return None;
            }
            next = self.next_node();
        }
        let node = next?;
        if self.slot.is_tailing() {
            self.slot.set_last_node(Some(Arc::clone(&node)));
        }
        self.slot.set_last_token(Some(node.event.token()));
        Some(node.event.clone())
    }

    /// Reads from this consumer's own storage stream, opening it lazily.
    ///
    /// When the stream runs dry and `allow_switch` is set, the consumer
    /// has caught up: it joins the tailing set (anchoring at the cached
    /// node for its token, if one exists) and retries against the cache.
    fn peek_private(&mut self, allow_switch: bool, timeout: Duration) -> Option<TrackedEvent<T>> {
        if self.private_stream.is_none() {
            match self.inner.engine.read_events(self.slot.last_token(), false) {
                Ok(stream) => self.private_stream = Some(stream),
                Err(error) => {
                    tracing::warn!(
                        consumer = self.slot.id(),
                        %error,
                        "failed to open a private event stream"
                    );
                    return None;
                }
            }
        }
        if let Some(event) = self.pull_private() {
            self.slot.set_last_token(Some(event.token()));
            return Some(event);
        }
        if allow_switch {
            self.private_stream = None;
            let node = self.inner.cache.find_node(self.slot.last_token());
            self.slot.set_last_node(node);
            StoreInner::start_tailing(&self.inner, &self.slot);
            return if timeout.is_zero() {
                None
            } else {
                self.peek_event(timeout)
            };
        }
        if timeout.is_zero() {
            return None;
        }
        self.inner.consumable.wait_for(timeout);
        if self.slot.is_closed() {
            return None;
        }
        let event = self.pull_private()?;
        self.slot.set_last_token(Some(event.token()));
        Some(event)
    }

    /// Pulls one event off the private stream, dropping the stream on a
    /// storage error so the next poll reopens it from `last_token`.
    fn pull_private(&mut self) -> Option<TrackedEvent<T>> {
        let stream = self.private_stream.as_mut()?;
        match stream.next_event() {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(
                    consumer = self.slot.id(),
                    %error,
                    "private event stream read failed, reopening on next poll"
                );
                self.private_stream = None;
                None
            }
        }
    }

    fn next_node(&self) -> Option<Arc<Node<T>>> {
        self.inner
            .cache
            .next_node(self.slot.last_node().as_ref(), self.slot.last_token())
    }
}

impl<T: Clone + Send + Sync + 'static> Iterator for TrackingEventStream<T> {
    type Item = TrackedEvent<T>;

    /// Blocks for the next event; ends once the stream is closed.
    fn next(&mut self) -> Option<Self::Item> {
        self.next_available().ok()
    }
}

impl<T> Drop for TrackingEventStream<T> {
    fn drop(&mut self) {
        self.slot.close();
        self.private_stream = None;
        self.inner.stop_tailing(&self.slot);
    }
}

impl<T> std::fmt::Debug for TrackingEventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.slot.is_tailing() {
            "tailing"
        } else {
            "private"
        };
        f.debug_struct("TrackingEventStream")
            .field("consumer", &self.slot.id())
            .field("mode", &mode)
            .field("last_token", &self.slot.last_token())
            .field("peeked", &self.peeked.is_some())
            .field("closed", &self.slot.is_closed())
            .finish_non_exhaustive()
    }
}
