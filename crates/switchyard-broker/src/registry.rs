//! [`SubscriptionRegistry`] – topic → subscriber rotation lists.
//!
//! Each topic owns one [`Rotation`] behind its own mutex, so mutations of
//! different topics never contend while a pick-and-advance on one topic is a
//! single critical section. The outer map is a `DashMap` and is only touched
//! to find or create a topic's list.
//!
//! # Rotation order
//!
//! A rotation behaves like a queue served by "pop head, push the same member
//! back to the tail". It is stored as a vector plus a cursor: the queue order
//! is `members[cursor..]` followed by `members[..cursor]`. A newly subscribed
//! member joins at the queue tail, which is the slot just before the cursor.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use switchyard_types::SubscriberId;

// ────────────────────────────────────────────────────────────────────────────
// Rotation
// ────────────────────────────────────────────────────────────────────────────

/// Ordered subscriber list with a round-robin cursor.
///
/// # Example
///
/// ```
/// use switchyard_broker::Rotation;
/// use switchyard_types::SubscriberId;
///
/// let (a, b) = (SubscriberId::new(), SubscriberId::new());
/// let mut rotation = Rotation::default();
/// rotation.insert(a);
/// rotation.insert(b);
///
/// assert_eq!(rotation.advance(), Some(a));
/// assert_eq!(rotation.advance(), Some(b));
/// assert_eq!(rotation.advance(), Some(a));
/// ```
#[derive(Debug, Default, Clone)]
pub struct Rotation {
    members: Vec<SubscriberId>,
    // Index of the next member to serve; always 0 when empty.
    cursor: usize,
}

impl Rotation {
    /// Add `id` at the queue tail. Returns `false` if it is already a member.
    pub fn insert(&mut self, id: SubscriberId) -> bool {
        if self.contains(id) {
            return false;
        }
        if self.cursor == 0 {
            self.members.push(id);
        } else {
            self.members.insert(self.cursor, id);
            self.cursor += 1;
        }
        true
    }

    /// Remove `id`, keeping the relative order of everyone else.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(position) = self.members.iter().position(|m| *m == id) else {
            return false;
        };
        self.members.remove(position);
        if position < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.members.len() {
            self.cursor = 0;
        }
        true
    }

    /// Return the member at the head of the queue and move it to the tail.
    pub fn advance(&mut self) -> Option<SubscriberId> {
        let next = *self.members.get(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.members.len();
        Some(next)
    }

    /// Members in queue order, head first.
    pub fn snapshot(&self) -> Vec<SubscriberId> {
        let (served, pending) = self.members.split_at(self.cursor);
        pending.iter().chain(served).copied().collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SubscriptionRegistry
// ────────────────────────────────────────────────────────────────────────────

/// Shared handle to one topic's rotation.
pub type RotationHandle = Arc<Mutex<Rotation>>;

/// Maps each topic to its [`Rotation`].
///
/// The broker keeps two registries, one for event subscriptions and one for
/// broadcast subscriptions.
pub struct SubscriptionRegistry<T> {
    lists: DashMap<T, RotationHandle>,
}

impl<T> SubscriptionRegistry<T>
where
    T: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            lists: DashMap::new(),
        }
    }

    /// Append `id` to `topic`'s rotation, creating the list on first use.
    /// Returns `false` when `id` was already subscribed.
    pub fn subscribe(&self, topic: T, id: SubscriberId) -> bool {
        let list = Arc::clone(self.lists.entry(topic).or_default().value());
        list.lock().insert(id)
    }

    /// Remove `id` from `topic`'s rotation. Returns whether it was a member.
    pub fn unsubscribe(&self, topic: T, id: SubscriberId) -> bool {
        self.rotation(topic)
            .is_some_and(|handle| handle.lock().remove(id))
    }

    /// The rotation for `topic`, if anyone ever subscribed to it.
    ///
    /// The map guard is released before returning; callers lock the handle
    /// for as long as their critical section needs.
    pub fn rotation(&self, topic: T) -> Option<RotationHandle> {
        self.lists.get(&topic).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove `id` from every topic. Returns how many lists contained it.
    pub fn remove_everywhere(&self, id: SubscriberId) -> usize {
        let handles: Vec<RotationHandle> = self
            .lists
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles
            .iter()
            .filter(|handle| handle.lock().remove(id))
            .count()
    }

    /// Current members of `topic` in queue order.
    pub fn subscribers(&self, topic: T) -> Vec<SubscriberId> {
        self.rotation(topic)
            .map(|handle| handle.lock().snapshot())
            .unwrap_or_default()
    }
}

impl<T> Default for SubscriptionRegistry<T>
where
    T: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
