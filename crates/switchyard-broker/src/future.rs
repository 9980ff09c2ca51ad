//! One-shot reply cells.
//!
//! [`ReplyFuture`] is a cloneable handle onto a single result slot guarded by
//! a `parking_lot` mutex and condition variable. The first
//! [`resolve`](ReplyFuture::resolve) wins; later calls are ignored. Any number
//! of threads may block in [`get`](ReplyFuture::get) and each receives a clone
//! of the resolved value.
//!
//! [`FutureResolver`] maps live [`EventId`]s to their pending futures and
//! removes each entry on resolution, so a duplicate completion finds nothing.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Condvar, Mutex};
use switchyard_types::{EventId, SubscriberId};

// ────────────────────────────────────────────────────────────────────────────
// ReplyFuture
// ────────────────────────────────────────────────────────────────────────────

struct Slot<T> {
    value: Mutex<Option<T>>,
    resolved: Condvar,
}

/// Handle onto the eventual reply to one event.
pub struct ReplyFuture<T> {
    slot: Arc<Slot<T>>,
}

impl<T> ReplyFuture<T> {
    /// A fresh, pending future.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                value: Mutex::new(None),
                resolved: Condvar::new(),
            }),
        }
    }

    /// Store `value` and wake every waiter.
    ///
    /// Returns `false` (and drops `value`) when the future was already
    /// resolved.
    pub fn resolve(&self, value: T) -> bool {
        let mut guard = self.slot.value.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(value);
        self.slot.resolved.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        self.slot.value.lock().is_some()
    }
}

impl<T: Clone> ReplyFuture<T> {
    /// Block until resolved and return the value.
    pub fn get(&self) -> T {
        let mut guard = self.slot.value.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return value.clone();
            }
            self.slot.resolved.wait(&mut guard);
        }
    }

    /// Block for at most `timeout`. Returns `None` if still pending.
    ///
    /// A timeout too large to express as a deadline waits like
    /// [`get`](Self::get).
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.get());
        };
        let mut guard = self.slot.value.lock();
        loop {
            if let Some(value) = guard.as_ref() {
                return Some(value.clone());
            }
            if self.slot.resolved.wait_until(&mut guard, deadline).timed_out() {
                return guard.as_ref().cloned();
            }
        }
    }

    /// The value if already resolved, without blocking.
    pub fn try_get(&self) -> Option<T> {
        self.slot.value.lock().as_ref().cloned()
    }
}

impl<T> Clone for ReplyFuture<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for ReplyFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ReplyFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyFuture")
            .field("done", &self.is_done())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FutureResolver
// ────────────────────────────────────────────────────────────────────────────

struct Pending<T> {
    future: ReplyFuture<T>,
    // Worker the event was delivered to.
    assignee: SubscriberId,
}

/// Pending replies keyed by event instance.
pub struct FutureResolver<T> {
    pending: DashMap<EventId, Pending<T>>,
}

impl<T> FutureResolver<T> {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Create the future for `event`, delivered to `assignee`.
    ///
    /// Returns `None` while a future for the same event is still pending.
    pub fn create(&self, event: EventId, assignee: SubscriberId) -> Option<ReplyFuture<T>> {
        match self.pending.entry(event) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let future = ReplyFuture::new();
                slot.insert(Pending {
                    future: future.clone(),
                    assignee,
                });
                Some(future)
            }
        }
    }

    /// Resolve and forget the future for `event`.
    ///
    /// Returns `false` when no future is pending: the event was never
    /// dispatched, was already completed, or its assignee unregistered.
    pub fn complete(&self, event: EventId, value: T) -> bool {
        match self.pending.remove(&event) {
            Some((_, pending)) => pending.future.resolve(value),
            None => false,
        }
    }

    /// Drop the entry for `event` without resolving it.
    pub fn discard(&self, event: EventId) -> bool {
        self.pending.remove(&event).is_some()
    }

    /// Drop every pending entry assigned to `assignee`. Their futures stay
    /// pending forever; waiters should use [`ReplyFuture::get_timeout`].
    pub fn evict_assigned(&self, assignee: SubscriberId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.assignee != assignee);
        before.saturating_sub(self.pending.len())
    }

    pub fn is_pending(&self, event: EventId) -> bool {
        self.pending.contains_key(&event)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for FutureResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_resolution_wins() {
        let future = ReplyFuture::new();
        assert!(!future.is_done());
        assert!(future.resolve(42));
        assert!(!future.resolve(7));
        assert_eq!(future.get(), 42);
        assert_eq!(future.try_get(), Some(42));
    }

    #[test]
    fn every_waiter_observes_the_value() {
        let future = ReplyFuture::<u32>::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let f = future.clone();
                thread::spawn(move || f.get())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(future.resolve(42));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), 42);
        }
    }

    #[test]
    fn get_timeout_expires_on_pending_future() {
        let future = ReplyFuture::<u32>::new();
        assert_eq!(future.get_timeout(Duration::from_millis(10)), None);
        assert_eq!(future.try_get(), None);
    }

    #[test]
    fn get_timeout_returns_value_resolved_meanwhile() {
        let future = ReplyFuture::<u32>::new();
        let resolver = future.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            resolver.resolve(5)
        });
        assert_eq!(future.get_timeout(Duration::from_secs(5)), Some(5));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn get_timeout_max_returns_resolved_value() {
        let future = ReplyFuture::new();
        future.resolve(9u32);
        assert_eq!(future.get_timeout(Duration::MAX), Some(9));
    }

    #[test]
    fn get_timeout_max_waits_for_late_resolution() {
        let future = ReplyFuture::<u32>::new();
        let resolver = future.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            resolver.resolve(11)
        });
        assert_eq!(future.get_timeout(Duration::MAX), Some(11));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn create_refuses_an_event_still_pending() {
        let resolver = FutureResolver::<u32>::new();
        let event = EventId::new();
        let first = resolver.create(event, SubscriberId::new()).unwrap();
        assert!(resolver.create(event, SubscriberId::new()).is_none());

        assert!(resolver.complete(event, 4));
        assert_eq!(first.try_get(), Some(4));
        // Resolved entries are gone, so the id can be dispatched again.
        assert!(resolver.create(event, SubscriberId::new()).is_some());
    }

    #[test]
    fn resolver_completes_once() {
        let resolver = FutureResolver::new();
        let event = EventId::new();
        let future = resolver.create(event, SubscriberId::new()).unwrap();
        assert!(resolver.is_pending(event));

        assert!(resolver.complete(event, 1));
        assert!(!resolver.complete(event, 2));
        assert_eq!(future.get(), 1);
        assert!(resolver.is_empty());
    }

    #[test]
    fn completing_unknown_event_is_noop() {
        let resolver = FutureResolver::<u32>::new();
        assert!(!resolver.complete(EventId::new(), 3));
    }

    #[test]
    fn concurrent_completions_resolve_exactly_once() {
        let resolver = Arc::new(FutureResolver::new());
        let event = EventId::new();
        let future = resolver.create(event, SubscriberId::new()).unwrap();

        let racers: Vec<_> = (0..8u32)
            .map(|n| {
                let r = Arc::clone(&resolver);
                thread::spawn(move || r.complete(event, n))
            })
            .collect();
        let honored = racers
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(honored, 1);
        assert!(future.is_done());
    }

    #[test]
    fn evict_assigned_only_touches_that_worker() {
        let resolver = FutureResolver::<u32>::new();
        let gone = SubscriberId::new();
        let stays = SubscriberId::new();
        let orphan = resolver.create(EventId::new(), gone).unwrap();
        resolver.create(EventId::new(), gone);
        let kept = EventId::new();
        resolver.create(kept, stays);

        assert_eq!(resolver.evict_assigned(gone), 2);
        assert_eq!(resolver.len(), 1);
        assert!(resolver.is_pending(kept));
        assert!(!orphan.is_done());
    }
}
