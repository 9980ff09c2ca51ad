//! [`MessageBroker`] – registration, subscription, dispatch and replies.
//!
//! The broker is an explicit instance shared as `Arc<MessageBroker<P>>`;
//! there is no process-wide singleton.
//!
//! # Locking
//!
//! | State | Structure |
//! |---|---|
//! | subscriber → mailbox | `DashMap<SubscriberId, Arc<Mailbox>>` |
//! | topic → event rotation | [`SubscriptionRegistry`], one mutex per topic |
//! | topic → broadcast list | [`SubscriptionRegistry`], one mutex per topic |
//! | event → pending reply | [`FutureResolver`] |
//!
//! [`send_event`](MessageBroker::send_event) holds the topic mutex across
//! pick-and-advance, future creation and enqueue, so concurrent senders each
//! advance the rotation exactly once and an event is never half delivered.
//! [`unregister`](MessageBroker::unregister) removes the subscriber from every
//! rotation before tearing its mailbox down; delivery re-checks the mailbox
//! and prunes members whose mailbox is gone.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use switchyard_types::{
    BrokerError, EventEnvelope, EventId, Message, Protocol, Routable, SubscriberId,
};
use tracing::{debug, trace, warn};

use crate::future::{FutureResolver, ReplyFuture};
use crate::mailbox::Mailbox;
use crate::registry::SubscriptionRegistry;

/// In-process publish/subscribe broker with request/reply futures.
///
/// # Example
///
/// ```ignore
/// let broker = Arc::new(MessageBroker::<SimProtocol>::new());
/// let worker = SubscriberId::new();
///
/// broker.register(worker);
/// broker.subscribe_event(SimTopic::DetectObjects, worker);
///
/// let future = broker
///     .send_event(EventEnvelope::new(detect_objects))
///     .expect("one subscriber");
///
/// // On the worker's thread:
/// if let Ok(Message::Event(envelope)) = broker.await_message(worker) {
///     broker.complete(envelope.id(), reply);
/// }
///
/// let reply = future.get();
/// ```
pub struct MessageBroker<P: Protocol> {
    mailboxes: DashMap<SubscriberId, Arc<Mailbox<P>>>,
    events: SubscriptionRegistry<P::Topic>,
    broadcasts: SubscriptionRegistry<P::Topic>,
    replies: FutureResolver<P::Reply>,
}

impl<P: Protocol> MessageBroker<P> {
    pub fn new() -> Self {
        Self {
            mailboxes: DashMap::new(),
            events: SubscriptionRegistry::new(),
            broadcasts: SubscriptionRegistry::new(),
            replies: FutureResolver::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Create `subscriber`'s mailbox. Idempotent; the nil subscriber is
    /// ignored.
    pub fn register(&self, subscriber: SubscriberId) {
        if subscriber.is_nil() {
            warn!("Ignoring registration of the nil subscriber");
            return;
        }
        let mut created = false;
        self.mailboxes.entry(subscriber).or_insert_with(|| {
            created = true;
            Arc::new(Mailbox::new())
        });
        if created {
            debug!(%subscriber, "Subscriber registered");
        }
    }

    /// Remove `subscriber` from every rotation, then tear its mailbox down.
    ///
    /// Undelivered messages are discarded and replies still pending on
    /// events assigned to it are evicted. Idempotent.
    pub fn unregister(&self, subscriber: SubscriberId) {
        let event_lists = self.events.remove_everywhere(subscriber);
        let broadcast_lists = self.broadcasts.remove_everywhere(subscriber);

        let Some((_, mailbox)) = self.mailboxes.remove(&subscriber) else {
            return;
        };
        // A subscribe that passed its registration check before the mailbox
        // went away may have inserted after the first sweep.
        self.events.remove_everywhere(subscriber);
        self.broadcasts.remove_everywhere(subscriber);
        let discarded = mailbox.close();
        let evicted = self.replies.evict_assigned(subscriber);
        debug!(
            %subscriber,
            event_lists,
            broadcast_lists,
            discarded,
            evicted,
            "Subscriber unregistered"
        );
    }

    pub fn is_registered(&self, subscriber: SubscriberId) -> bool {
        self.mailboxes.contains_key(&subscriber)
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Append `subscriber` to the event rotation for `topic`.
    ///
    /// Returns `false` when the subscriber is not registered or is already
    /// subscribed.
    pub fn subscribe_event(&self, topic: P::Topic, subscriber: SubscriberId) -> bool {
        if !self.is_registered(subscriber) {
            warn!(%subscriber, ?topic, "Event subscription from unregistered subscriber ignored");
            return false;
        }
        self.admit(&self.events, topic, subscriber)
    }

    /// Append `subscriber` to the broadcast list for `topic`.
    ///
    /// Returns `false` when the subscriber is not registered or is already
    /// subscribed.
    pub fn subscribe_broadcast(&self, topic: P::Topic, subscriber: SubscriberId) -> bool {
        if !self.is_registered(subscriber) {
            warn!(%subscriber, ?topic, "Broadcast subscription from unregistered subscriber ignored");
            return false;
        }
        self.admit(&self.broadcasts, topic, subscriber)
    }

    // Insert, then roll back if an `unregister` ran in between.
    fn admit(&self, registry: &SubscriptionRegistry<P::Topic>, topic: P::Topic, subscriber: SubscriberId) -> bool {
        if !registry.subscribe(topic, subscriber) {
            return false;
        }
        if self.is_registered(subscriber) {
            return true;
        }
        registry.unsubscribe(topic, subscriber);
        debug!(%subscriber, ?topic, "Subscription raced unregister, rolled back");
        false
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Deliver `envelope` to the next subscriber of its topic and return the
    /// future that will carry the reply.
    ///
    /// Returns `None` when nobody is subscribed; the event is dropped and no
    /// state is left behind. Resending an envelope whose reply is still
    /// pending also returns `None` and delivers nothing; the future from the
    /// first send stays valid.
    pub fn send_event(&self, envelope: EventEnvelope<P::Event>) -> Option<ReplyFuture<P::Reply>> {
        let topic = envelope.topic();
        let event_id = envelope.id();

        let Some(rotation) = self.events.rotation(topic) else {
            debug!(?topic, event = %event_id, "No subscriber for event");
            return None;
        };
        let mut rotation = rotation.lock();
        if self.replies.is_pending(event_id) {
            debug!(?topic, event = %event_id, "Event already in flight, resend ignored");
            return None;
        }
        let mut message = Message::Event(envelope);

        loop {
            let Some(target) = rotation.advance() else {
                debug!(?topic, event = %event_id, "No subscriber for event");
                return None;
            };
            let Some(mailbox) = self.mailbox(target) else {
                rotation.remove(target);
                continue;
            };
            // The future must exist before the assignee can dequeue and
            // complete the event.
            let Some(future) = self.replies.create(event_id, target) else {
                debug!(?topic, event = %event_id, "Event already in flight, resend ignored");
                return None;
            };
            match mailbox.deliver(message) {
                Ok(()) => {
                    trace!(?topic, event = %event_id, subscriber = %target, "Event delivered");
                    return Some(future);
                }
                Err(returned) => {
                    self.replies.discard(event_id);
                    rotation.remove(target);
                    message = returned;
                }
            }
        }
    }

    /// Deliver `broadcast` to every current subscriber of its topic.
    ///
    /// Returns the number of mailboxes that received it.
    pub fn send_broadcast(&self, broadcast: P::Broadcast) -> usize {
        let topic = broadcast.topic();
        let Some(rotation) = self.broadcasts.rotation(topic) else {
            trace!(?topic, "Broadcast without subscribers");
            return 0;
        };
        let mut rotation = rotation.lock();
        let shared = Arc::new(broadcast);

        let mut delivered = 0;
        let mut stale = Vec::new();
        for subscriber in rotation.snapshot() {
            let accepted = self
                .mailbox(subscriber)
                .is_some_and(|mailbox| mailbox.deliver(Message::Broadcast(Arc::clone(&shared))).is_ok());
            if accepted {
                delivered += 1;
            } else {
                stale.push(subscriber);
            }
        }
        for subscriber in stale {
            rotation.remove(subscriber);
        }
        trace!(?topic, delivered, "Broadcast delivered");
        delivered
    }

    /// Resolve the reply for `event`.
    ///
    /// Returns `false` for unknown or already completed events.
    pub fn complete(&self, event: EventId, reply: P::Reply) -> bool {
        let honored = self.replies.complete(event, reply);
        if !honored {
            debug!(%event, "Stale completion ignored");
        }
        honored
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Block until a message for `subscriber` is available.
    ///
    /// # Errors
    ///
    /// [`BrokerError::NotRegistered`] if `subscriber` has no mailbox, or if
    /// it is unregistered while waiting.
    pub fn await_message(&self, subscriber: SubscriberId) -> Result<Message<P>, BrokerError> {
        let mailbox = self
            .mailbox(subscriber)
            .ok_or(BrokerError::NotRegistered(subscriber))?;
        mailbox
            .receive()
            .map_err(|_| BrokerError::NotRegistered(subscriber))
    }

    /// Like [`await_message`](Self::await_message) but returns `Ok(None)`
    /// once `timeout` elapses with an empty mailbox.
    pub fn await_message_timeout(
        &self,
        subscriber: SubscriberId,
        timeout: Duration,
    ) -> Result<Option<Message<P>>, BrokerError> {
        let mailbox = self
            .mailbox(subscriber)
            .ok_or(BrokerError::NotRegistered(subscriber))?;
        mailbox
            .receive_timeout(timeout)
            .map_err(|_| BrokerError::NotRegistered(subscriber))
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of events dispatched but not yet completed.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Event subscribers of `topic`, next recipient first.
    pub fn event_subscribers(&self, topic: P::Topic) -> Vec<SubscriberId> {
        self.events.subscribers(topic)
    }

    /// Broadcast subscribers of `topic`, in fan-out order.
    pub fn broadcast_subscribers(&self, topic: P::Topic) -> Vec<SubscriberId> {
        self.broadcasts.subscribers(topic)
    }

    /// Queued message count, `None` if unregistered.
    pub fn mailbox_len(&self, subscriber: SubscriberId) -> Option<usize> {
        self.mailbox(subscriber).map(|mailbox| mailbox.len())
    }

    fn mailbox(&self, subscriber: SubscriberId) -> Option<Arc<Mailbox<P>>> {
        self.mailboxes
            .get(&subscriber)
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl<P: Protocol> Default for MessageBroker<P> {
    fn default() -> Self {
        Self::new()
    }
}
