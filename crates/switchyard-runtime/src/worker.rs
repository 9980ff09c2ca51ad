//! [`Worker`] – the unit of concurrency – and what it sees while running.
//!
//! A worker declares its interest during [`Worker::initialize`] by filling a
//! [`HandlerTable`]: one closure per topic, separately for events and
//! broadcasts. The runtime subscribes the worker to exactly those topics and
//! dispatches by matching each received message's topic against the table.
//!
//! Handlers receive the worker's own state (`&mut W`) and a
//! [`WorkerContext`] through which they can send, complete and request
//! termination.
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! impl Worker<SimProtocol> for Echo {
//!     fn name(&self) -> String {
//!         "echo".to_string()
//!     }
//!
//!     fn initialize(&mut self, handlers: &mut HandlerTable<SimProtocol, Self>, _ctx: &WorkerContext<SimProtocol>) {
//!         handlers.on_event(SimTopic::DetectObjects, |_echo, ctx, envelope| {
//!             ctx.complete(envelope.id(), SimReply::Acknowledged { tracked: 0 });
//!         });
//!     }
//! }
//! ```

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use switchyard_broker::{MessageBroker, ReplyFuture};
use switchyard_types::{EventEnvelope, EventId, Protocol, SubscriberId};

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

/// A long-lived participant running on its own thread.
pub trait Worker<P: Protocol>: Send + Sized + 'static {
    /// Human-readable name used for the thread name and log spans.
    fn name(&self) -> String;

    /// Declare handlers. Called once, after registration and before the
    /// receive loop starts. Calling [`WorkerContext::terminate`] here skips
    /// the loop entirely.
    fn initialize(&mut self, handlers: &mut HandlerTable<P, Self>, ctx: &WorkerContext<P>);
}

/// Handler invoked for an event; owns the envelope so it can complete it.
pub type EventHandler<P, W> =
    Box<dyn FnMut(&mut W, &WorkerContext<P>, EventEnvelope<<P as Protocol>::Event>) + Send>;

/// Handler invoked for a broadcast shared with other subscribers.
pub type BroadcastHandler<P, W> =
    Box<dyn FnMut(&mut W, &WorkerContext<P>, &<P as Protocol>::Broadcast) + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// HandlerTable
// ─────────────────────────────────────────────────────────────────────────────

/// Topic → handler mapping declared by a worker.
pub struct HandlerTable<P: Protocol, W> {
    events: HashMap<P::Topic, EventHandler<P, W>>,
    broadcasts: HashMap<P::Topic, BroadcastHandler<P, W>>,
}

impl<P: Protocol, W> HandlerTable<P, W> {
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
            broadcasts: HashMap::new(),
        }
    }

    /// Handle events of `topic`. A later call for the same topic replaces the
    /// earlier handler.
    pub fn on_event<F>(&mut self, topic: P::Topic, handler: F) -> &mut Self
    where
        F: FnMut(&mut W, &WorkerContext<P>, EventEnvelope<P::Event>) + Send + 'static,
    {
        self.events.insert(topic, Box::new(handler));
        self
    }

    /// Handle broadcasts of `topic`. A later call for the same topic replaces
    /// the earlier handler.
    pub fn on_broadcast<F>(&mut self, topic: P::Topic, handler: F) -> &mut Self
    where
        F: FnMut(&mut W, &WorkerContext<P>, &P::Broadcast) + Send + 'static,
    {
        self.broadcasts.insert(topic, Box::new(handler));
        self
    }

    pub fn event_topics(&self) -> impl Iterator<Item = P::Topic> + '_ {
        self.events.keys().copied()
    }

    pub fn broadcast_topics(&self) -> impl Iterator<Item = P::Topic> + '_ {
        self.broadcasts.keys().copied()
    }

    pub(crate) fn event_handler(&mut self, topic: P::Topic) -> Option<&mut EventHandler<P, W>> {
        self.events.get_mut(&topic)
    }

    pub(crate) fn broadcast_handler(&mut self, topic: P::Topic) -> Option<&mut BroadcastHandler<P, W>> {
        self.broadcasts.get_mut(&topic)
    }
}

impl<P: Protocol, W> Default for HandlerTable<P, W> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkerContext
// ─────────────────────────────────────────────────────────────────────────────

/// The worker's view of the broker while it runs.
///
/// Lives on the worker's own thread; it is not shared.
pub struct WorkerContext<P: Protocol> {
    id: SubscriberId,
    name: String,
    broker: Arc<MessageBroker<P>>,
    terminating: Cell<bool>,
}

impl<P: Protocol> WorkerContext<P> {
    pub(crate) fn new(id: SubscriberId, name: String, broker: Arc<MessageBroker<P>>) -> Self {
        Self {
            id,
            name,
            broker,
            terminating: Cell::new(false),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared broker, e.g. for helper threads spawned during
    /// initialisation.
    pub fn broker(&self) -> Arc<MessageBroker<P>> {
        Arc::clone(&self.broker)
    }

    /// Wrap `event` in a fresh envelope and send it. `None` means nobody is
    /// subscribed and the event was dropped.
    pub fn send_event(&self, event: P::Event) -> Option<ReplyFuture<P::Reply>> {
        self.broker.send_event(EventEnvelope::new(event))
    }

    pub fn send_broadcast(&self, broadcast: P::Broadcast) -> usize {
        self.broker.send_broadcast(broadcast)
    }

    pub fn complete(&self, event: EventId, reply: P::Reply) -> bool {
        self.broker.complete(event, reply)
    }

    /// Ask the runtime to leave the receive loop once the current message
    /// has been handled.
    pub fn terminate(&self) {
        self.terminating.set(true);
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.get()
    }
}
