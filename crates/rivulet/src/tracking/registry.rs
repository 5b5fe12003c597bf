//! Shared per-consumer state and the set of tailing consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use rivulet_storage::TrackingToken;

use super::cache::Node;

/// State of one consumer that other threads need to observe.
///
/// The consumer itself is the only writer of `last_token` and `last_node`
/// during normal delivery; the cleaner clears `last_node` on eviction and
/// the store flips `closed` on shutdown. The producer reads `last_token`
/// to anchor its polls when the cache is empty.
pub(crate) struct ConsumerSlot<T> {
    id: u64,
    last_token: Mutex<Option<TrackingToken>>,
    last_node: Mutex<Option<Arc<Node<T>>>>,
    tailing: AtomicBool,
    closed: AtomicBool,
}

impl<T> ConsumerSlot<T> {
    pub(crate) fn new(id: u64, start_token: Option<TrackingToken>) -> Self {
        Self {
            id,
            last_token: Mutex::new(start_token),
            last_node: Mutex::new(None),
            tailing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Token of the last event delivered to the user (or the start token).
    pub(crate) fn last_token(&self) -> Option<TrackingToken> {
        *self.last_token.lock()
    }

    pub(crate) fn set_last_token(&self, token: Option<TrackingToken>) {
        *self.last_token.lock() = token;
    }

    /// Cached node matching `last_token`; present only while tailing.
    pub(crate) fn last_node(&self) -> Option<Arc<Node<T>>> {
        self.last_node.lock().clone()
    }

    pub(crate) fn set_last_node(&self, node: Option<Arc<Node<T>>>) {
        *self.last_node.lock() = node;
    }

    /// Drops the node anchor, releasing its hold on trimmed-off nodes.
    pub(crate) fn clear_last_node(&self) {
        *self.last_node.lock() = None;
    }

    pub(crate) fn is_tailing(&self) -> bool {
        self.tailing.load(Ordering::Acquire)
    }

    pub(crate) fn set_tailing(&self, tailing: bool) {
        self.tailing.store(tailing, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl<T> std::fmt::Debug for ConsumerSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerSlot")
            .field("id", &self.id)
            .field("last_token", &self.last_token())
            .field("tailing", &self.is_tailing())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// The set of consumers currently fed by the shared cache.
///
/// Copy-on-read: iteration takes a snapshot of the slot list, so the
/// cleaner can evict while the producer iterates and a consumer can leave
/// mid-sweep without invalidating anyone's view.
pub(crate) struct TailingRegistry<T> {
    slots: RwLock<Vec<Arc<ConsumerSlot<T>>>>,
}

impl<T> TailingRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Adds a slot; re-adding the same consumer is a no-op.
    pub(crate) fn add(&self, slot: Arc<ConsumerSlot<T>>) {
        let mut slots = self.slots.write();
        if !slots.iter().any(|existing| existing.id() == slot.id()) {
            slots.push(slot);
        }
    }

    pub(crate) fn remove(&self, id: u64) {
        self.slots.write().retain(|slot| slot.id() != id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<ConsumerSlot<T>>> {
        self.slots.read().clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub(crate) fn clear(&self) {
        self.slots.write().clear();
    }
}

impl<T> std::fmt::Debug for TailingRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailingRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_state() {
        let slot: ConsumerSlot<u32> = ConsumerSlot::new(7, Some(TrackingToken::new(3)));
        assert_eq!(slot.id(), 7);
        assert_eq!(slot.last_token(), Some(TrackingToken::new(3)));
        assert!(!slot.is_tailing());
        assert!(!slot.is_closed());

        slot.set_last_token(Some(TrackingToken::new(4)));
        slot.set_tailing(true);
        assert_eq!(slot.last_token(), Some(TrackingToken::new(4)));
        assert!(slot.is_tailing());

        slot.close();
        assert!(slot.is_closed());
    }

    #[test]
    fn test_registry_add_remove() {
        let registry: TailingRegistry<u32> = TailingRegistry::new();
        assert!(registry.is_empty());

        let first = Arc::new(ConsumerSlot::new(1, None));
        let second = Arc::new(ConsumerSlot::new(2, None));
        registry.add(Arc::clone(&first));
        registry.add(second);
        assert_eq!(registry.len(), 2);

        // Re-adding the same consumer does not duplicate it.
        registry.add(first);
        assert_eq!(registry.len(), 2);

        registry.remove(1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].id(), 2);

        registry.remove(99); // absent, no-op
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_stable_under_removal() {
        let registry: TailingRegistry<u32> = TailingRegistry::new();
        registry.add(Arc::new(ConsumerSlot::new(1, None)));
        registry.add(Arc::new(ConsumerSlot::new(2, None)));

        let snapshot = registry.snapshot();
        registry.remove(1);
        registry.remove(2);

        assert_eq!(snapshot.len(), 2);
        assert!(registry.is_empty());
    }
}
