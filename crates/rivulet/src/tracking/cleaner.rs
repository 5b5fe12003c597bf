//! Periodic eviction of consumers that fell behind the cache.
//!
//! Trimming never waits for slow consumers, so a tailing consumer can end
//! up anchored on nodes the head has already moved past. Such a consumer
//! would discover the lag itself on its next peek; the cleaner makes sure
//! it happens even for consumers that stopped polling, so their anchors
//! stop pinning trimmed-off nodes in memory. Eviction only flips the
//! consumer back to private reads; its event stream stays open and it
//! rejoins the cache once it catches up again.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::store::StoreInner;

use super::signal::Signal;

/// Cleaner-side wake-up channel, shared with the store for shutdown.
pub(crate) struct CleanerHandle {
    pub(crate) signal: Signal,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CleanerHandle {
    pub(crate) fn new() -> Self {
        Self {
            signal: Signal::new(),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn set_thread(&self, handle: JoinHandle<()>) {
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }
}

impl std::fmt::Debug for CleanerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanerHandle").finish_non_exhaustive()
    }
}

/// Cleaner thread main loop: sweep at a fixed delay until shutdown.
pub(crate) fn run<T>(inner: &Arc<StoreInner<T>>) {
    loop {
        inner
            .cleaner
            .signal
            .wait_if(|| !inner.is_shut_down(), inner.config.cleanup_delay);
        if inner.is_shut_down() {
            break;
        }
        evict_lagging(inner);
    }
    tracing::debug!("cache cleaner stopped");
}

/// Removes every lagging consumer from the tailing set.
fn evict_lagging<T>(inner: &Arc<StoreInner<T>>) {
    let Some(oldest) = inner.cache.oldest() else {
        return;
    };
    // While the first event ever cached is still at the head, no consumer
    // position can precede the cache.
    if oldest.previous_token.is_none() {
        return;
    }
    for slot in inner.registry.snapshot() {
        let last_node = slot.last_node();
        if inner.cache.is_behind(last_node.as_ref(), slot.last_token()) {
            let lag = last_node
                .as_ref()
                .map(|node| oldest.index - node.index)
                .unwrap_or_default();
            tracing::warn!(
                consumer = slot.id(),
                lag,
                "tracking consumer fell behind the shared event cache; \
                 it will fetch directly from storage until it catches up"
            );
            inner.stop_tailing(&slot);
            inner.metrics.record_eviction();
        }
    }
}
