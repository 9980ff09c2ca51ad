//! `switchyard-types` – the shared message contract.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//!
//! - [`Protocol`] – binds an application's closed message vocabulary
//!   (topics, event payloads, broadcast payloads, replies) to the broker.
//! - [`SubscriberId`] / [`EventId`] – opaque identities for workers and for
//!   individual event instances.
//! - [`EventEnvelope`] and [`Message`] – what actually travels through a
//!   mailbox.
//! - [`BrokerError`] – the single contract violation the broker reports.
//! - [`WorkerState`] – the worker lifecycle shared by the runtime and the
//!   reporting side.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Protocol
// ────────────────────────────────────────────────────────────────────────────

/// A payload that knows which topic it is routed on.
pub trait Routable {
    type Topic;

    /// The message-variant tag used for subscription lookup.
    fn topic(&self) -> Self::Topic;
}

/// The closed message vocabulary of one application.
///
/// The broker never inspects payloads beyond their [`Routable::topic`]; the
/// protocol only fixes which concrete enums flow through it.
///
/// # Example
///
/// ```
/// use switchyard_types::{Protocol, Routable};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Topic { Ping, Stop }
///
/// #[derive(Debug)]
/// struct Ping(u32);
/// impl Routable for Ping {
///     type Topic = Topic;
///     fn topic(&self) -> Topic { Topic::Ping }
/// }
///
/// #[derive(Debug)]
/// struct Stop;
/// impl Routable for Stop {
///     type Topic = Topic;
///     fn topic(&self) -> Topic { Topic::Stop }
/// }
///
/// struct Demo;
/// impl Protocol for Demo {
///     type Topic = Topic;
///     type Event = Ping;
///     type Broadcast = Stop;
///     type Reply = u32;
///     fn shutdown_topic() -> Topic { Topic::Stop }
/// }
/// ```
pub trait Protocol: Send + Sync + 'static {
    /// Message-variant tag. One rotation list exists per topic and kind.
    type Topic: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// Point-to-point payloads; each instance is handled by exactly one worker.
    type Event: Routable<Topic = Self::Topic> + fmt::Debug + Send + Sync + 'static;
    /// Fan-out payloads; every subscriber receives a shared reference.
    type Broadcast: Routable<Topic = Self::Topic> + fmt::Debug + Send + Sync + 'static;
    /// Result type carried back to the sender of an event.
    type Reply: Clone + fmt::Debug + Send + 'static;

    /// Broadcast topic every worker is implicitly subscribed to. Receiving it
    /// terminates the worker after its own handler (if any) has run.
    fn shutdown_topic() -> Self::Topic;
}

// ────────────────────────────────────────────────────────────────────────────
// Identities
// ────────────────────────────────────────────────────────────────────────────

/// Opaque handle identifying one worker for its whole lifetime.
///
/// The nil UUID is reserved as the invalid subscriber; the broker ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The invalid subscriber.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a single event instance; keys the pending reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Envelopes
// ────────────────────────────────────────────────────────────────────────────

/// An event payload stamped with its instance identity.
///
/// Build the envelope before sending so the caller keeps the [`EventId`]
/// even when the event turns out to be undeliverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    id: EventId,
    created_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(payload: E) -> Self {
        Self {
            id: EventId::new(),
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time elapsed since the envelope was built.
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.created_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Routable> EventEnvelope<E> {
    pub fn topic(&self) -> E::Topic {
        self.payload.topic()
    }
}

/// What a worker pulls out of its mailbox.
pub enum Message<P: Protocol> {
    Event(EventEnvelope<P::Event>),
    /// Shared with every other subscriber that received the same broadcast.
    Broadcast(Arc<P::Broadcast>),
}

impl<P: Protocol> Message<P> {
    pub fn topic(&self) -> P::Topic {
        match self {
            Message::Event(envelope) => envelope.topic(),
            Message::Broadcast(broadcast) => broadcast.topic(),
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Message::Event(_))
    }

    pub fn as_event(&self) -> Option<&EventEnvelope<P::Event>> {
        match self {
            Message::Event(envelope) => Some(envelope),
            Message::Broadcast(_) => None,
        }
    }

    pub fn as_broadcast(&self) -> Option<&P::Broadcast> {
        match self {
            Message::Event(_) => None,
            Message::Broadcast(broadcast) => Some(broadcast),
        }
    }
}

impl<P: Protocol> fmt::Debug for Message<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Event(envelope) => f.debug_tuple("Event").field(envelope).finish(),
            Message::Broadcast(broadcast) => f.debug_tuple("Broadcast").field(broadcast).finish(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle & errors
// ────────────────────────────────────────────────────────────────────────────

/// Worker lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Created,
    Registered,
    Running,
    Terminating,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerState::Created => "created",
            WorkerState::Registered => "registered",
            WorkerState::Running => "running",
            WorkerState::Terminating => "terminating",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Contract violations reported by the broker.
///
/// Undeliverable events and stale completions are not errors; they surface
/// as `None` / `false` return values instead.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerError {
    #[error("Subscriber {0} is not registered")]
    NotRegistered(SubscriberId),
}
