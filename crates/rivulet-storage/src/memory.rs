//! Volatile in-memory storage engine.
//!
//! [`InMemoryStorageEngine`] keeps the whole event log in a single
//! `RwLock<Vec<_>>` and assigns dense 1-based sequence tokens. It is the
//! default backend for tests and embedded setups that do not need
//! durability. Streams read live: a caught-up stream yields events
//! appended after it was opened on its next poll.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::{EventStream, StorageEngine};
use crate::event::{TrackedEvent, TrackingToken};
use crate::StorageError;

/// In-memory, append-only event log.
///
/// Cloning the engine is cheap and yields a handle to the same log.
///
/// Tokens are the 1-based global sequence of the event, so the token of
/// the `n`-th event ever appended is `n`.
pub struct InMemoryStorageEngine<T> {
    events: Arc<RwLock<Vec<TrackedEvent<T>>>>,
}

impl<T> InMemoryStorageEngine<T> {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Returns the number of events in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the token of the most recently appended event.
    #[must_use]
    pub fn last_token(&self) -> Option<TrackingToken> {
        self.events.read().last().map(TrackedEvent::token)
    }
}

impl<T> Default for InMemoryStorageEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for InMemoryStorageEngine<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<T> std::fmt::Debug for InMemoryStorageEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorageEngine")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> StorageEngine<T> for InMemoryStorageEngine<T> {
    fn append(&self, events: Vec<T>) -> Result<Vec<TrackingToken>, StorageError> {
        let mut log = self.events.write();
        let mut tokens = Vec::with_capacity(events.len());
        for payload in events {
            let token = TrackingToken::new(log.len() as u64 + 1);
            log.push(TrackedEvent::new(payload, token));
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn read_events(
        &self,
        after: Option<TrackingToken>,
        _may_block: bool,
    ) -> Result<Box<dyn EventStream<T>>, StorageError> {
        // A token is the 1-based sequence of its event, so it doubles as
        // the 0-based index of the event after it. The engine never
        // blocks; the caller's own polling covers the blocking mode.
        Ok(Box::new(InMemoryEventStream {
            events: Arc::clone(&self.events),
            position: after.map_or(0, TrackingToken::position),
        }))
    }
}

struct InMemoryEventStream<T> {
    events: Arc<RwLock<Vec<TrackedEvent<T>>>>,
    position: u64,
}

impl<T: Clone + Send + Sync> EventStream<T> for InMemoryEventStream<T> {
    fn next_event(&mut self) -> Result<Option<TrackedEvent<T>>, StorageError> {
        let log = self.events.read();
        let index = usize::try_from(self.position).map_err(|_| {
            StorageError::ReadFailed(format!("position {} out of range", self.position))
        })?;
        match log.get(index) {
            Some(event) => {
                self.position += 1;
                Ok(Some(event.clone()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequential_tokens() {
        let engine = InMemoryStorageEngine::new();
        let tokens = engine.append(vec!["a", "b", "c"]).unwrap();
        assert_eq!(
            tokens,
            vec![
                TrackingToken::new(1),
                TrackingToken::new(2),
                TrackingToken::new(3)
            ]
        );
        assert_eq!(engine.len(), 3);
        assert_eq!(engine.last_token(), Some(TrackingToken::new(3)));
    }

    #[test]
    fn test_read_from_beginning() {
        let engine = InMemoryStorageEngine::new();
        engine.append(vec![1, 2, 3]).unwrap();

        let mut stream = engine.read_events(None, false).unwrap();
        assert_eq!(stream.next_event().unwrap().unwrap().payload(), &1);
        assert_eq!(stream.next_event().unwrap().unwrap().payload(), &2);
        assert_eq!(stream.next_event().unwrap().unwrap().payload(), &3);
        assert!(stream.next_event().unwrap().is_none());
    }

    #[test]
    fn test_read_after_token() {
        let engine = InMemoryStorageEngine::new();
        let tokens = engine.append(vec![10, 20, 30]).unwrap();

        let mut stream = engine.read_events(Some(tokens[1]), false).unwrap();
        let event = stream.next_event().unwrap().unwrap();
        assert_eq!(event.payload(), &30);
        assert_eq!(event.token(), tokens[2]);
        assert!(stream.next_event().unwrap().is_none());
    }

    #[test]
    fn test_caught_up_stream_sees_later_appends() {
        let engine = InMemoryStorageEngine::new();
        let mut stream = engine.read_events(None, false).unwrap();
        assert!(stream.next_event().unwrap().is_none());

        engine.append(vec!["late"]).unwrap();
        assert_eq!(stream.next_event().unwrap().unwrap().payload(), &"late");
    }

    #[test]
    fn test_clone_shares_log() {
        let engine = InMemoryStorageEngine::new();
        let handle = engine.clone();
        engine.append(vec![1]).unwrap();
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn test_empty_engine() {
        let engine: InMemoryStorageEngine<u32> = InMemoryStorageEngine::new();
        assert!(engine.is_empty());
        assert!(engine.last_token().is_none());
        let mut stream = engine.read_events(None, true).unwrap();
        assert!(stream.next_event().unwrap().is_none());
    }
}
