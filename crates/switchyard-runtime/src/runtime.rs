//! [`WorkerRuntime`] – the register → initialize → receive/dispatch →
//! unregister loop, and the [`WorkerHandle`] used to observe it.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──register──▶ Registered ──initialize + subscribe──▶ Running
//!    Running ──terminate / shutdown topic──▶ Terminating ──unregister──▶ Terminated
//! ```
//!
//! Every worker is subscribed to [`Protocol::shutdown_topic`] whether or not
//! it declared a handler for it. Receiving that broadcast runs the declared
//! handler, if any, and then terminates the worker.
//!
//! A panicking handler is not recovered. The worker is still unregistered
//! while the thread unwinds, and [`WorkerHandle::join`] reports
//! [`WorkerError::Panicked`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use switchyard_broker::MessageBroker;
use switchyard_types::{BrokerError, Message, Protocol, SubscriberId, WorkerState};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

use crate::worker::{HandlerTable, Worker, WorkerContext};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures surfaced by a worker's thread.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Broker contract violation: {0}")]
    Broker(#[from] BrokerError),

    #[error("Worker '{name}' panicked")]
    Panicked { name: String },

    #[error("Failed to spawn thread for worker '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state cell
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state observable from other threads.
pub(crate) struct StateCell {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::Created),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn get(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Move forward to `next`; backward moves are ignored.
    pub(crate) fn advance(&self, next: WorkerState) {
        let mut state = self.state.lock();
        if next > *state {
            *state = next;
            self.changed.notify_all();
        }
    }

    pub(crate) fn wait_for(&self, target: WorkerState) {
        let mut state = self.state.lock();
        while *state < target {
            self.changed.wait(&mut state);
        }
    }

    pub(crate) fn wait_for_timeout(&self, target: WorkerState, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_for(target);
            return true;
        };
        let mut state = self.state.lock();
        while *state < target {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return *state >= target;
            }
        }
        true
    }
}

/// Unregisters the worker when the run ends, including during unwinding.
struct Departure<P: Protocol> {
    broker: Arc<MessageBroker<P>>,
    id: SubscriberId,
    state: Arc<StateCell>,
}

impl<P: Protocol> Drop for Departure<P> {
    fn drop(&mut self) {
        self.state.advance(WorkerState::Terminating);
        self.broker.unregister(self.id);
        self.state.advance(WorkerState::Terminated);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkerRuntime
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one [`Worker`] against a shared broker.
pub struct WorkerRuntime<P: Protocol, W: Worker<P>> {
    worker: W,
    broker: Arc<MessageBroker<P>>,
    id: SubscriberId,
    state: Arc<StateCell>,
}

impl<P: Protocol, W: Worker<P>> WorkerRuntime<P, W> {
    pub fn new(worker: W, broker: Arc<MessageBroker<P>>) -> Self {
        Self {
            worker,
            broker,
            id: SubscriberId::new(),
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Run the worker to completion on a dedicated thread.
    pub fn spawn(self) -> Result<WorkerHandle<W>, WorkerError> {
        let name = self.worker.name();
        let id = self.id;
        let state = Arc::clone(&self.state);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run())
            .map_err(|source| WorkerError::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(WorkerHandle {
            name,
            id,
            state,
            thread,
        })
    }

    /// Run the worker to completion on the calling thread and hand the
    /// worker back, so callers can read whatever it accumulated.
    pub fn run(mut self) -> Result<W, WorkerError> {
        let name = self.worker.name();
        let span = info_span!("worker", name = %name, id = %self.id);
        let _enter = span.enter();

        self.broker.register(self.id);
        self.state.advance(WorkerState::Registered);
        let departure = Departure {
            broker: Arc::clone(&self.broker),
            id: self.id,
            state: Arc::clone(&self.state),
        };

        let ctx = WorkerContext::new(self.id, name, Arc::clone(&self.broker));
        let mut handlers = HandlerTable::new();
        self.worker.initialize(&mut handlers, &ctx);
        self.subscribe(&handlers);

        self.state.advance(WorkerState::Running);
        info!("Worker running");

        let outcome = self.receive_loop(&mut handlers, &ctx);
        if let Err(e) = &outcome {
            error!(error = %e, "Worker stopped on broker error");
        }
        drop(departure);
        info!("Worker terminated");
        outcome.map(|()| self.worker)
    }

    fn subscribe(&self, handlers: &HandlerTable<P, W>) {
        for topic in handlers.event_topics() {
            self.broker.subscribe_event(topic, self.id);
        }
        for topic in handlers.broadcast_topics() {
            self.broker.subscribe_broadcast(topic, self.id);
        }
        self.broker.subscribe_broadcast(P::shutdown_topic(), self.id);
    }

    fn receive_loop(
        &mut self,
        handlers: &mut HandlerTable<P, W>,
        ctx: &WorkerContext<P>,
    ) -> Result<(), WorkerError> {
        while !ctx.is_terminating() {
            let message = self.broker.await_message(self.id)?;
            self.dispatch(handlers, ctx, message);
        }
        debug!("Termination requested");
        Ok(())
    }

    fn dispatch(&mut self, handlers: &mut HandlerTable<P, W>, ctx: &WorkerContext<P>, message: Message<P>) {
        let topic = message.topic();
        match message {
            Message::Event(envelope) => match handlers.event_handler(topic) {
                Some(handler) => handler(&mut self.worker, ctx, envelope),
                None => warn!(?topic, event = %envelope.id(), "No handler for event"),
            },
            Message::Broadcast(broadcast) => {
                let shutdown = topic == P::shutdown_topic();
                match handlers.broadcast_handler(topic) {
                    Some(handler) => handler(&mut self.worker, ctx, &*broadcast),
                    None if shutdown => {}
                    None => warn!(?topic, "No handler for broadcast"),
                }
                if shutdown {
                    ctx.terminate();
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WorkerHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Observer and join handle for a spawned worker.
pub struct WorkerHandle<W> {
    name: String,
    id: SubscriberId,
    state: Arc<StateCell>,
    thread: JoinHandle<Result<W, WorkerError>>,
}

impl<W> WorkerHandle<W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Block until the worker has reached `target` or any later state.
    pub fn wait_for(&self, target: WorkerState) {
        self.state.wait_for(target);
    }

    /// Like [`wait_for`](Self::wait_for), giving up after `timeout`.
    /// Returns whether `target` was reached.
    pub fn wait_for_timeout(&self, target: WorkerState, timeout: Duration) -> bool {
        self.state.wait_for_timeout(target, timeout)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to end and return the worker.
    pub fn join(self) -> Result<W, WorkerError> {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(WorkerError::Panicked { name: self.name }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SampleBroadcast, SampleEvent, SampleProtocol, SampleTopic};
    use switchyard_types::EventEnvelope;

    const WAIT: Duration = Duration::from_secs(5);

    /// Doubles every request and counts the broadcasts it saw.
    #[derive(Default)]
    struct Doubler {
        answered: usize,
        notices: Vec<u32>,
        stop_after: Option<usize>,
    }

    impl Worker<SampleProtocol> for Doubler {
        fn name(&self) -> String {
            "doubler".to_string()
        }

        fn initialize(&mut self, handlers: &mut HandlerTable<SampleProtocol, Self>, _ctx: &WorkerContext<SampleProtocol>) {
            handlers
                .on_event(SampleTopic::Request, |worker, ctx, envelope| {
                    let SampleEvent::Request(n) = envelope.payload();
                    ctx.complete(envelope.id(), n * 2);
                    worker.answered += 1;
                    if worker.stop_after == Some(worker.answered) {
                        ctx.terminate();
                    }
                })
                .on_broadcast(SampleTopic::Notice, |worker, _ctx, broadcast| {
                    if let SampleBroadcast::Notice(n) = broadcast {
                        worker.notices.push(*n);
                    }
                });
        }
    }

    struct Quitter;

    impl Worker<SampleProtocol> for Quitter {
        fn name(&self) -> String {
            "quitter".to_string()
        }

        fn initialize(&mut self, _handlers: &mut HandlerTable<SampleProtocol, Self>, ctx: &WorkerContext<SampleProtocol>) {
            ctx.terminate();
        }
    }

    struct Faulty;

    impl Worker<SampleProtocol> for Faulty {
        fn name(&self) -> String {
            "faulty".to_string()
        }

        fn initialize(&mut self, handlers: &mut HandlerTable<SampleProtocol, Self>, _ctx: &WorkerContext<SampleProtocol>) {
            handlers.on_broadcast(SampleTopic::Notice, |_worker, _ctx, _broadcast| {
                panic!("handler bug");
            });
        }
    }

    fn broker() -> Arc<MessageBroker<SampleProtocol>> {
        Arc::new(MessageBroker::new())
    }

    fn request(n: u32) -> EventEnvelope<SampleEvent> {
        EventEnvelope::new(SampleEvent::Request(n))
    }

    #[test]
    fn worker_answers_requests_until_shutdown() -> Result<(), Box<dyn std::error::Error>> {
        let broker = broker();
        let handle = WorkerRuntime::new(Doubler::default(), Arc::clone(&broker)).spawn()?;
        assert!(handle.wait_for_timeout(WorkerState::Running, WAIT));
        assert!(broker.is_registered(handle.id()));

        let future = broker.send_event(request(21)).ok_or("no subscriber")?;
        assert_eq!(future.get_timeout(WAIT), Some(42));

        broker.send_broadcast(SampleBroadcast::Notice(7));
        broker.send_broadcast(SampleBroadcast::Shutdown);

        let id = handle.id();
        let doubler = handle.join()?;
        assert_eq!(doubler.answered, 1);
        assert_eq!(doubler.notices, vec![7]);
        assert!(!broker.is_registered(id));
        assert!(broker.broadcast_subscribers(SampleTopic::Shutdown).is_empty());
        Ok(())
    }

    #[test]
    fn handler_can_request_termination() -> Result<(), Box<dyn std::error::Error>> {
        let broker = broker();
        let worker = Doubler {
            stop_after: Some(2),
            ..Doubler::default()
        };
        let handle = WorkerRuntime::new(worker, Arc::clone(&broker)).spawn()?;
        handle.wait_for(WorkerState::Running);

        let first = broker.send_event(request(1)).ok_or("no subscriber")?;
        let second = broker.send_event(request(2)).ok_or("no subscriber")?;
        assert_eq!(first.get_timeout(WAIT), Some(2));
        assert_eq!(second.get_timeout(WAIT), Some(4));

        let doubler = handle.join()?;
        assert_eq!(doubler.answered, 2);
        assert!(broker.send_event(request(3)).is_none());
        Ok(())
    }

    #[test]
    fn terminate_during_initialize_skips_the_loop() -> Result<(), Box<dyn std::error::Error>> {
        let broker = broker();
        let runtime = WorkerRuntime::new(Quitter, Arc::clone(&broker));
        assert_eq!(runtime.state(), WorkerState::Created);

        let handle = runtime.spawn()?;
        let id = handle.id();
        handle.join()?;
        assert!(!broker.is_registered(id));
        Ok(())
    }

    #[test]
    fn run_on_current_thread_reaches_terminated() -> Result<(), Box<dyn std::error::Error>> {
        let broker = broker();
        let runtime = WorkerRuntime::new(Quitter, Arc::clone(&broker));
        let state = Arc::clone(&runtime.state);
        runtime.run()?;
        assert_eq!(state.get(), WorkerState::Terminated);
        Ok(())
    }

    #[test]
    fn panicking_handler_is_reported_and_unregistered() -> Result<(), Box<dyn std::error::Error>> {
        let broker = broker();
        let handle = WorkerRuntime::new(Faulty, Arc::clone(&broker)).spawn()?;
        handle.wait_for(WorkerState::Running);
        let id = handle.id();

        broker.send_broadcast(SampleBroadcast::Notice(1));

        assert!(handle.wait_for_timeout(WorkerState::Terminated, WAIT));
        assert!(matches!(handle.join(), Err(WorkerError::Panicked { name }) if name == "faulty"));
        assert!(!broker.is_registered(id));
        Ok(())
    }

    #[test]
    fn state_cell_only_moves_forward() {
        let cell = StateCell::new();
        cell.advance(WorkerState::Running);
        cell.advance(WorkerState::Registered);
        assert_eq!(cell.get(), WorkerState::Running);
        assert!(cell.wait_for_timeout(WorkerState::Registered, Duration::from_millis(1)));
        assert!(!cell.wait_for_timeout(WorkerState::Terminated, Duration::from_millis(10)));
    }

    #[test]
    fn unbounded_state_wait_does_not_overflow() {
        let cell = Arc::new(StateCell::new());
        assert!(!cell.wait_for_timeout(WorkerState::Registered, Duration::ZERO));

        let writer = Arc::clone(&cell);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            writer.advance(WorkerState::Running);
        });
        assert!(cell.wait_for_timeout(WorkerState::Running, Duration::MAX));
        handle.join().unwrap();
    }
}
