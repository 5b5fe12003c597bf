//! # Rivulet
//!
//! An embedded event store with a shared, bounded, in-memory tailing cache
//! for multiple concurrent tracking consumers.
//!
//! Events are appended to a backing [`StorageEngine`], which remains the
//! source of truth. Readers advance through the log by opaque
//! [`TrackingToken`]s and receive every event exactly once in global
//! order. To avoid each reader holding its own connection to storage, the
//! store keeps a cache of the most recent events: a single background
//! producer polls the engine and publishes new events into an append-only
//! linked chain of nodes shared by all caught-up consumers. Consumers that
//! lag behind the cache transparently fall back to a private storage
//! stream and are promoted back into the shared chain once they catch up.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rivulet::{EmbeddedEventStore, InMemoryStorageEngine};
//!
//! let engine = Arc::new(InMemoryStorageEngine::new());
//! let store = EmbeddedEventStore::new(engine);
//!
//! let mut stream = store.open_stream(None);
//! store.publish(vec!["first", "second"])?;
//!
//! let event = stream.next_available()?;
//! assert_eq!(event.payload(), &"first");
//! ```
//!
//! ## Module structure
//!
//! - [`store`]: the [`EmbeddedEventStore`] facade
//! - [`tracking`]: the shared cache, producer, consumers, and cleaner
//! - [`config`]: construction-time configuration
//! - [`metrics`]: store-level counters
//! - [`error`]: error types
//!
//! ## Concurrency model
//!
//! Three thread roles: user threads call [`EmbeddedEventStore::publish`]
//! and consumer methods, one producer thread fetches committed events into
//! the cache, and one cleaner thread periodically evicts consumers that
//! fell behind the cache head. The cache chain itself is not mutex
//! protected; correctness comes from a single writer, write-once `next`
//! links published with release semantics, and monotone appends. Two
//! disjoint lock/condition pairs coordinate wake-ups: one for consumers
//! awaiting cached events, one for the producer awaiting commits.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod store;
pub mod tracking;

pub use config::{EventStoreConfig, EventStoreConfigBuilder};
pub use error::StoreError;
pub use metrics::StoreMetrics;
pub use store::EmbeddedEventStore;
pub use tracking::consumer::TrackingEventStream;

// Storage re-exports, so embedders depend on a single crate.
pub use rivulet_storage::{
    EventStream, InMemoryStorageEngine, StorageEngine, StorageError, TrackedEvent, TrackingToken,
};
