//! `switchyard-broker` – The Switchboard
//!
//! Routes typed messages between worker threads inside one process. The
//! broker owns no thread of its own; every operation runs on the caller's
//! thread.
//!
//! # Modules
//!
//! - [`mailbox`] – [`Mailbox`]: unbounded FIFO inbox owned by one worker,
//!   built on a `crossbeam` channel.
//! - [`registry`] – [`SubscriptionRegistry`]: topic → [`Rotation`] lists
//!   giving round-robin order for events and fan-out order for broadcasts.
//! - [`future`] – [`ReplyFuture`] and [`FutureResolver`]: one-shot reply
//!   cells keyed by [`EventId`][switchyard_types::EventId].
//! - [`broker`] – [`MessageBroker`]: the façade composing the three.

pub mod broker;
pub mod future;
pub mod mailbox;
pub mod registry;

#[cfg(test)]
mod testing;

pub use broker::MessageBroker;
pub use future::{FutureResolver, ReplyFuture};
pub use mailbox::{Mailbox, MailboxClosed};
pub use registry::{Rotation, SubscriptionRegistry};
