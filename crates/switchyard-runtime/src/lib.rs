//! `switchyard-runtime` – The Engine Room
//!
//! Runs [`Worker`]s on dedicated OS threads against a shared
//! [`MessageBroker`](switchyard_broker::MessageBroker).
//!
//! # Modules
//!
//! - [`worker`] – the [`Worker`] trait, its [`HandlerTable`] and the
//!   [`WorkerContext`] handlers run with.
//! - [`runtime`] – [`WorkerRuntime`]: register, initialize, receive and
//!   dispatch until terminated, then unregister.
//! - [`supervisor`] – [`Supervisor`]: spawn many workers and join them.
//! - [`telemetry`] – `tracing` subscriber setup with optional OTLP export.

pub mod runtime;
pub mod supervisor;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use runtime::{WorkerError, WorkerHandle, WorkerRuntime};
pub use supervisor::Supervisor;
pub use worker::{BroadcastHandler, EventHandler, HandlerTable, Worker, WorkerContext};
