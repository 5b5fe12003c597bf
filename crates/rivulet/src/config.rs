//! Event store configuration.
//!
//! All options are fixed at construction time. Defaults match a store that
//! serves a handful of tracking processors on one node: a cache of the
//! 10 000 most recent events, a one second idle poll, and a ten second
//! cleanup sweep.

use std::time::Duration;

/// Default maximum number of events in the shared cache.
pub const DEFAULT_CACHED_EVENTS: usize = 10_000;

/// Default producer idle poll interval.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(1_000);

/// Default interval between two sweeps for lagging consumers.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_millis(10_000);

/// Default prefix for the producer and cleaner thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "rivulet";

/// Environment variable that overrides [`EventStoreConfig::optimize_event_consumption`].
///
/// Any value other than `true` (case-insensitive) disables the shared
/// cache, keeping every consumer on a private storage stream.
pub const OPTIMIZE_EVENT_CONSUMPTION_ENV: &str = "RIVULET_OPTIMIZE_EVENT_CONSUMPTION";

/// Configuration for an [`EmbeddedEventStore`](crate::EmbeddedEventStore).
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    /// Maximum number of events in the shared cache. Clamped to at least 1.
    pub cached_events: usize,

    /// How long the producer sleeps between polls when no events from this
    /// process have been committed. Commits from this process wake the
    /// producer immediately regardless of this delay.
    pub fetch_delay: Duration,

    /// Interval between two sweeps that evict consumers which fell behind
    /// the oldest cached event. Evicted consumers keep running on a
    /// private storage stream; their event stream is not closed.
    pub cleanup_delay: Duration,

    /// Prefix for the names of the producer and cleaner threads.
    pub thread_name_prefix: String,

    /// Whether caught-up consumers share the cache. When `false`, every
    /// consumer reads a private storage stream and the producer thread
    /// never starts.
    pub optimize_event_consumption: bool,
}

impl Default for EventStoreConfig {
    /// Defaults as documented per field. `optimize_event_consumption`
    /// honors [`OPTIMIZE_EVENT_CONSUMPTION_ENV`] when set.
    fn default() -> Self {
        Self {
            cached_events: DEFAULT_CACHED_EVENTS,
            fetch_delay: DEFAULT_FETCH_DELAY,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            optimize_event_consumption: optimize_event_consumption_default(),
        }
    }
}

impl EventStoreConfig {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> EventStoreConfigBuilder {
        EventStoreConfigBuilder::default()
    }

    /// Returns the cache bound actually applied (at least 1).
    #[must_use]
    pub fn effective_cached_events(&self) -> u64 {
        self.cached_events.max(1) as u64
    }
}

/// Reads the environment override, defaulting to `true` when unset.
fn optimize_event_consumption_default() -> bool {
    std::env::var(OPTIMIZE_EVENT_CONSUMPTION_ENV)
        .map_or(true, |value| value.eq_ignore_ascii_case("true"))
}

/// Builder for [`EventStoreConfig`].
#[derive(Debug, Default)]
pub struct EventStoreConfigBuilder {
    cached_events: Option<usize>,
    fetch_delay: Option<Duration>,
    cleanup_delay: Option<Duration>,
    thread_name_prefix: Option<String>,
    optimize_event_consumption: Option<bool>,
}

impl EventStoreConfigBuilder {
    /// Sets the maximum number of cached events.
    #[must_use]
    pub fn cached_events(mut self, cached_events: usize) -> Self {
        self.cached_events = Some(cached_events);
        self
    }

    /// Sets the producer idle poll interval.
    #[must_use]
    pub fn fetch_delay(mut self, fetch_delay: Duration) -> Self {
        self.fetch_delay = Some(fetch_delay);
        self
    }

    /// Sets the cleaner sweep interval.
    #[must_use]
    pub fn cleanup_delay(mut self, cleanup_delay: Duration) -> Self {
        self.cleanup_delay = Some(cleanup_delay);
        self
    }

    /// Sets the producer and cleaner thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables the shared cache. An explicit value here wins
    /// over the [`OPTIMIZE_EVENT_CONSUMPTION_ENV`] environment variable.
    #[must_use]
    pub fn optimize_event_consumption(mut self, enabled: bool) -> Self {
        self.optimize_event_consumption = Some(enabled);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> EventStoreConfig {
        EventStoreConfig {
            cached_events: self.cached_events.unwrap_or(DEFAULT_CACHED_EVENTS).max(1),
            fetch_delay: self.fetch_delay.unwrap_or(DEFAULT_FETCH_DELAY),
            cleanup_delay: self.cleanup_delay.unwrap_or(DEFAULT_CLEANUP_DELAY),
            thread_name_prefix: self
                .thread_name_prefix
                .unwrap_or_else(|| DEFAULT_THREAD_NAME_PREFIX.to_string()),
            optimize_event_consumption: self
                .optimize_event_consumption
                .unwrap_or_else(optimize_event_consumption_default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EventStoreConfig::default();
        assert_eq!(config.cached_events, DEFAULT_CACHED_EVENTS);
        assert_eq!(config.fetch_delay, DEFAULT_FETCH_DELAY);
        assert_eq!(config.cleanup_delay, DEFAULT_CLEANUP_DELAY);
        assert_eq!(config.thread_name_prefix, DEFAULT_THREAD_NAME_PREFIX);
    }

    #[test]
    fn test_builder() {
        let config = EventStoreConfig::builder()
            .cached_events(16)
            .fetch_delay(Duration::from_millis(5))
            .cleanup_delay(Duration::from_millis(50))
            .thread_name_prefix("test-store")
            .optimize_event_consumption(false)
            .build();

        assert_eq!(config.cached_events, 16);
        assert_eq!(config.fetch_delay, Duration::from_millis(5));
        assert_eq!(config.cleanup_delay, Duration::from_millis(50));
        assert_eq!(config.thread_name_prefix, "test-store");
        assert!(!config.optimize_event_consumption);
    }

    #[test]
    fn test_cached_events_clamped() {
        let config = EventStoreConfig::builder().cached_events(0).build();
        assert_eq!(config.cached_events, 1);
        assert_eq!(config.effective_cached_events(), 1);
    }

    #[test]
    fn test_env_override() {
        // Serialized within this one test to avoid races on process env.
        std::env::set_var(OPTIMIZE_EVENT_CONSUMPTION_ENV, "false");
        assert!(!EventStoreConfig::default().optimize_event_consumption);
        assert!(!EventStoreConfig::builder().build().optimize_event_consumption);

        std::env::set_var(OPTIMIZE_EVENT_CONSUMPTION_ENV, "TRUE");
        assert!(EventStoreConfig::default().optimize_event_consumption);

        // An explicit builder value wins over the environment.
        std::env::set_var(OPTIMIZE_EVENT_CONSUMPTION_ENV, "false");
        let config = EventStoreConfig::builder()
            .optimize_event_consumption(true)
            .build();
        assert!(config.optimize_event_consumption);

        std::env::remove_var(OPTIMIZE_EVENT_CONSUMPTION_ENV);
        assert!(EventStoreConfig::default().optimize_event_consumption);
    }
}
