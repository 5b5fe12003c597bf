//! Event data model: tracking tokens and tracked events.

use std::fmt;

/// Opaque position in a storage engine's global event log.
///
/// Tokens are produced by the engine on append, one per event, totally
/// ordered by the engine's global commit order. The store itself only
/// ever compares tokens for equality and hands them back to the engine;
/// ordering is exposed for engines and callers that persist checkpoints.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackingToken(u64);

impl TrackingToken {
    /// Wraps a raw engine position.
    #[must_use]
    pub const fn new(position: u64) -> Self {
        Self(position)
    }

    /// Returns the raw engine position.
    #[must_use]
    pub const fn position(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TrackingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackingToken({})", self.0)
    }
}

impl fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event payload together with the token the engine assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEvent<T> {
    payload: T,
    token: TrackingToken,
}

impl<T> TrackedEvent<T> {
    /// Creates a tracked event from a payload and its engine token.
    #[must_use]
    pub fn new(payload: T, token: TrackingToken) -> Self {
        Self { payload, token }
    }

    /// The event payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// The token marking this event's position in the global log.
    #[must_use]
    pub fn token(&self) -> TrackingToken {
        self.token
    }

    /// Consumes the event and returns its payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ordering() {
        let a = TrackingToken::new(1);
        let b = TrackingToken::new(2);
        assert!(a < b);
        assert_eq!(a, TrackingToken::new(1));
        assert_eq!(b.position(), 2);
    }

    #[test]
    fn test_token_display() {
        let token = TrackingToken::new(42);
        assert_eq!(token.to_string(), "42");
        assert_eq!(format!("{token:?}"), "TrackingToken(42)");
    }

    #[test]
    fn test_tracked_event_accessors() {
        let event = TrackedEvent::new("hello", TrackingToken::new(7));
        assert_eq!(*event.payload(), "hello");
        assert_eq!(event.token(), TrackingToken::new(7));
        assert_eq!(event.into_payload(), "hello");
    }
}
