//! The shared cache: an append-only chain of recently committed events.
//!
//! Nodes form a singly linked list. Only the producer appends; each node's
//! `next` link is written exactly once (release) and read with acquire
//! semantics, so consumers can walk the chain without taking a lock. The
//! head (`oldest`) moves forward when the producer trims; nodes that
//! lagging consumers still hold stay alive through their own references
//! and are freed once the last handle moves past them.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use rivulet_storage::{TrackedEvent, TrackingToken};

/// One cached event.
///
/// `index` is the dense position within the cache (not the engine token);
/// `previous_token` is the token of the event immediately before this one
/// in the global log (`None` only for the first event ever cached). A
/// consumer holding `previous_token` as its last delivered position is
/// entitled to receive this node next.
pub(crate) struct Node<T> {
    pub(crate) index: u64,
    pub(crate) previous_token: Option<TrackingToken>,
    pub(crate) event: TrackedEvent<T>,
    next: OnceLock<Arc<Node<T>>>,
}

impl<T> Node<T> {
    pub(crate) fn new(
        index: u64,
        previous_token: Option<TrackingToken>,
        event: TrackedEvent<T>,
    ) -> Self {
        Self {
            index,
            previous_token,
            event,
            next: OnceLock::new(),
        }
    }

    /// The node appended after this one, if any.
    pub(crate) fn next(&self) -> Option<Arc<Node<T>>> {
        self.next.get().cloned()
    }

    /// Links the successor. Single writer; a second call is a no-op.
    pub(crate) fn link(&self, next: Arc<Node<T>>) {
        let _ = self.next.set(next);
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        // Unlink iteratively. A recursive drop of the chain would overflow
        // the stack once the tail grows to tens of thousands of nodes.
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut owned) => next = owned.next.take(),
                Err(_) => break,
            }
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("index", &self.index)
            .field("previous_token", &self.previous_token)
            .field("token", &self.event.token())
            .finish_non_exhaustive()
    }
}

/// The chain head and the lookups consumers run against it.
///
/// Only the producer writes `oldest`; consumers and the cleaner read it.
/// All scans start from the head and follow `next` links, so they may
/// observe nodes appended after the scan started but never miss one that
/// was reachable when it started.
pub(crate) struct SharedCache<T> {
    oldest: RwLock<Option<Arc<Node<T>>>>,
    cached_events: u64,
}

impl<T> SharedCache<T> {
    pub(crate) fn new(cached_events: u64) -> Self {
        Self {
            oldest: RwLock::new(None),
            cached_events,
        }
    }

    /// The oldest cached node, if the cache is non-empty.
    pub(crate) fn oldest(&self) -> Option<Arc<Node<T>>> {
        self.oldest.read().clone()
    }

    /// The cache index of the oldest node.
    pub(crate) fn oldest_index(&self) -> Option<u64> {
        self.oldest.read().as_ref().map(|node| node.index)
    }

    /// Installs the head when the cache is empty. Producer only.
    pub(crate) fn install_head_if_empty(&self, node: &Arc<Node<T>>) {
        let mut guard = self.oldest.write();
        if guard.is_none() {
            *guard = Some(Arc::clone(node));
        }
    }

    /// Advances the head until at most `cached_events` nodes remain behind
    /// `newest`. Producer only. Returns the number of nodes dropped.
    pub(crate) fn trim(&self, newest: &Arc<Node<T>>) -> u64 {
        let mut guard = self.oldest.write();
        let mut trimmed = 0;
        while let Some(head) = guard.as_ref() {
            if newest.index - head.index < self.cached_events {
                break;
            }
            let Some(next) = head.next() else { break };
            *guard = Some(next);
            trimmed += 1;
        }
        trimmed
    }

    /// Finds the cached node whose event carries `token`, by linear scan
    /// from the head.
    pub(crate) fn find_node(&self, token: Option<TrackingToken>) -> Option<Arc<Node<T>>> {
        let token = token?;
        let mut current = self.oldest();
        while let Some(node) = current {
            if node.event.token() == token {
                return Some(node);
            }
            current = node.next();
        }
        None
    }

    /// The node a consumer positioned at (`last_node`, `last_token`)
    /// should receive next.
    ///
    /// With a `last_node` this is its successor. Without one the consumer
    /// has not located itself in the chain yet, so the chain is scanned
    /// for the node whose `previous_token` matches `last_token`; `None`
    /// means the cache has either moved past the consumer or not yet
    /// reached it.
    pub(crate) fn next_node(
        &self,
        last_node: Option<&Arc<Node<T>>>,
        last_token: Option<TrackingToken>,
    ) -> Option<Arc<Node<T>>> {
        if let Some(node) = last_node {
            return node.next();
        }
        let mut current = self.oldest();
        while let Some(node) = current {
            if node.previous_token == last_token {
                return Some(node);
            }
            current = node.next();
        }
        None
    }

    /// Whether a consumer at (`last_node`, `last_token`) has fallen behind
    /// the head of the cache.
    ///
    /// An empty cache leaves nobody behind. A consumer anchored at a node
    /// is behind once that node precedes the head; an unanchored consumer
    /// is behind when no cached node follows its token.
    pub(crate) fn is_behind(
        &self,
        last_node: Option<&Arc<Node<T>>>,
        last_token: Option<TrackingToken>,
    ) -> bool {
        let Some(oldest) = self.oldest() else {
            return false;
        };
        match last_node {
            Some(node) => node.index < oldest.index,
            None => self.next_node(None, last_token).is_none(),
        }
    }
}

impl<T> std::fmt::Debug for SharedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("cached_events", &self.cached_events)
            .field("oldest_index", &self.oldest_index())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(position: u64) -> TrackedEvent<u64> {
        TrackedEvent::new(position, TrackingToken::new(position))
    }

    /// Builds a chain of `count` nodes with tokens 1..=count, installs
    /// the head, and returns the newest node.
    fn chain(cache: &SharedCache<u64>, count: u64) -> Arc<Node<u64>> {
        let mut newest: Option<Arc<Node<u64>>> = None;
        for position in 1..=count {
            let previous_token = newest.as_ref().map(|n| n.event.token());
            let node = Arc::new(Node::new(position - 1, previous_token, event(position)));
            if let Some(prev) = &newest {
                prev.link(Arc::clone(&node));
            }
            cache.install_head_if_empty(&node);
            newest = Some(node);
        }
        newest.unwrap()
    }

    #[test]
    fn test_links_and_indices() {
        let cache = SharedCache::new(100);
        let newest = chain(&cache, 3);

        let head = cache.oldest().unwrap();
        assert_eq!(head.index, 0);
        assert!(head.previous_token.is_none());

        let second = head.next().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.previous_token, Some(TrackingToken::new(1)));

        let third = second.next().unwrap();
        assert_eq!(third.index, 2);
        assert_eq!(third.event.token(), newest.event.token());
        assert!(third.next().is_none());
    }

    #[test]
    fn test_link_is_write_once() {
        let first = Arc::new(Node::new(0, None, event(1)));
        let second = Arc::new(Node::new(1, Some(TrackingToken::new(1)), event(2)));
        let ignored = Arc::new(Node::new(1, Some(TrackingToken::new(1)), event(9)));

        first.link(Arc::clone(&second));
        first.link(ignored);

        assert_eq!(first.next().unwrap().event.token(), TrackingToken::new(2));
    }

    #[test]
    fn test_find_node() {
        let cache = SharedCache::new(100);
        chain(&cache, 5);

        let node = cache.find_node(Some(TrackingToken::new(3))).unwrap();
        assert_eq!(node.index, 2);

        assert!(cache.find_node(Some(TrackingToken::new(99))).is_none());
        assert!(cache.find_node(None).is_none());
    }

    #[test]
    fn test_next_node_from_anchor() {
        let cache = SharedCache::new(100);
        chain(&cache, 3);

        let anchor = cache.find_node(Some(TrackingToken::new(1))).unwrap();
        let next = cache.next_node(Some(&anchor), Some(TrackingToken::new(1)));
        assert_eq!(next.unwrap().event.token(), TrackingToken::new(2));
    }

    #[test]
    fn test_next_node_by_previous_token() {
        let cache = SharedCache::new(100);
        chain(&cache, 3);

        // Unanchored consumer that last saw token 2.
        let next = cache.next_node(None, Some(TrackingToken::new(2))).unwrap();
        assert_eq!(next.event.token(), TrackingToken::new(3));

        // Unanchored consumer from the beginning.
        let first = cache.next_node(None, None).unwrap();
        assert_eq!(first.event.token(), TrackingToken::new(1));

        // Ahead of the cache: nothing to serve yet.
        assert!(cache.next_node(None, Some(TrackingToken::new(3))).is_none());
    }

    #[test]
    fn test_trim_bounds_cache() {
        let cache = SharedCache::new(4);
        let newest = chain(&cache, 10);

        let trimmed = cache.trim(&newest);
        assert_eq!(trimmed, 6);

        let oldest = cache.oldest().unwrap();
        assert!(newest.index - oldest.index < 4);
        assert_eq!(oldest.index, 6);
    }

    #[test]
    fn test_trim_single_node_cache() {
        let cache = SharedCache::new(1);
        let newest = chain(&cache, 5);

        cache.trim(&newest);
        let oldest = cache.oldest().unwrap();
        assert_eq!(oldest.index, newest.index);
    }

    #[test]
    fn test_is_behind() {
        let cache = SharedCache::new(2);
        let newest = chain(&cache, 6);
        let first = cache.find_node(Some(TrackingToken::new(1))).unwrap();
        cache.trim(&newest);

        // Anchored before the head.
        assert!(cache.is_behind(Some(&first), Some(TrackingToken::new(1))));
        // Anchored at the newest node.
        assert!(!cache.is_behind(Some(&newest), Some(TrackingToken::new(6))));
        // Unanchored, token no longer covered by the cache.
        assert!(cache.is_behind(None, Some(TrackingToken::new(2))));
        // Unanchored but the successor is still cached.
        assert!(!cache.is_behind(None, Some(TrackingToken::new(5))));
    }

    #[test]
    fn test_empty_cache_leaves_nobody_behind() {
        let cache: SharedCache<u64> = SharedCache::new(4);
        assert!(!cache.is_behind(None, None));
        assert!(!cache.is_behind(None, Some(TrackingToken::new(1))));
    }

    #[test]
    fn test_dropping_long_chain_does_not_recurse() {
        let cache = SharedCache::new(u64::MAX);
        let newest = chain(&cache, 50_000);
        drop(newest);
        drop(cache);
    }
}
