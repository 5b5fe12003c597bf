//! Storage engine traits.
//!
//! The event store treats its backing storage as a collaborator behind two
//! small traits: [`StorageEngine`] commits events and hands out streams,
//! [`EventStream`] pulls committed events in global order. Engines decide
//! durability; the store decides caching and fan-out.

use crate::event::{TrackedEvent, TrackingToken};
use crate::StorageError;

/// Backing storage for the event store.
///
/// Implementations must assign each appended event a [`TrackingToken`]
/// that is strictly greater (in the engine's global order) than every
/// token assigned before it, and must serve reads strictly after a given
/// token in that same order.
pub trait StorageEngine<T>: Send + Sync {
    /// Appends `events` to the global log in order.
    ///
    /// Returns the token assigned to each event, in input order. The
    /// append is atomic with respect to readers: a stream either sees all
    /// of the batch (in order) or none of it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the commit fails; the log is unchanged.
    fn append(&self, events: Vec<T>) -> Result<Vec<TrackingToken>, StorageError>;

    /// Opens a stream of events strictly after `after`, in global order.
    ///
    /// `after = None` streams from the beginning of the log. When
    /// `may_block` is `true` the engine may hold the stream open and keep
    /// producing as new events are committed; when `false` the stream
    /// reports caught-up (`Ok(None)`) as soon as it reaches the end of the
    /// log. A caught-up stream may still yield further events on later
    /// polls if the engine appends more.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the stream cannot be opened.
    fn read_events(
        &self,
        after: Option<TrackingToken>,
        may_block: bool,
    ) -> Result<Box<dyn EventStream<T>>, StorageError>;
}

/// Pull-based stream of tracked events.
///
/// Streams are closed by dropping them.
pub trait EventStream<T>: Send {
    /// Returns the next event, or `Ok(None)` when caught up with the log.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the underlying read fails. The stream
    /// should be discarded after an error.
    fn next_event(&mut self) -> Result<Option<TrackedEvent<T>>, StorageError>;
}
