//! Shared-cache event tracking.
//!
//! This module implements the tailing subsystem of the store:
//!
//! - `cache`: append-only chain of cached events with a trimmable head
//! - `registry`: shared per-consumer state and the set of tailing consumers
//! - `producer`: background thread that fetches committed events into the cache
//! - [`consumer`]: the [`TrackingEventStream`](consumer::TrackingEventStream)
//!   handed to readers, switching between shared and private reads
//! - `cleaner`: periodic eviction of consumers that fell behind the cache
//!
//! ## Roles
//!
//! ```text
//!  publish()            ┌──────────────┐  read_events(last, block)
//!  ────────► storage ◄──┤   Producer   ├─────────► append nodes
//!               ▲       └──────┬───────┘           notify consumers
//!               │              │ trim              trim head
//!               │              ▼
//!               │   oldest ─► n ─► n ─► n ─► newest
//!               │              ▲         ▲
//!  private      │              │         │
//!  stream ──────┘        consumer A  consumer B   (tailing)
//! ```
//!
//! Only the producer mutates the chain, `newest`, or the head. Consumers
//! mutate their own slot; the cleaner only flips tailing membership.

pub mod consumer;

pub(crate) mod cache;
pub(crate) mod cleaner;
pub(crate) mod producer;
pub(crate) mod registry;
pub(crate) mod signal;
