//! [`Supervisor`] – spawns a set of heterogeneous workers against one broker
//! and joins them at the end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use switchyard_broker::MessageBroker;
use switchyard_types::{Protocol, SubscriberId, WorkerState};
use tracing::{error, info};

use crate::runtime::{WorkerError, WorkerHandle, WorkerRuntime};
use crate::worker::Worker;

/// Type-erased view of a [`WorkerHandle`].
trait Supervised: Send {
    fn name(&self) -> &str;
    fn state(&self) -> WorkerState;
    fn wait_for_timeout(&self, target: WorkerState, timeout: Duration) -> bool;
    fn join(self: Box<Self>) -> Result<(), WorkerError>;
}

impl<W: Send + 'static> Supervised for WorkerHandle<W> {
    fn name(&self) -> &str {
        WorkerHandle::name(self)
    }

    fn state(&self) -> WorkerState {
        WorkerHandle::state(self)
    }

    fn wait_for_timeout(&self, target: WorkerState, timeout: Duration) -> bool {
        WorkerHandle::wait_for_timeout(self, target, timeout)
    }

    fn join(self: Box<Self>) -> Result<(), WorkerError> {
        WorkerHandle::join(*self).map(drop)
    }
}

/// Owns the threads of every worker it spawned.
pub struct Supervisor<P: Protocol> {
    broker: Arc<MessageBroker<P>>,
    workers: Vec<Box<dyn Supervised>>,
}

impl<P: Protocol> Supervisor<P> {
    pub fn new(broker: Arc<MessageBroker<P>>) -> Self {
        Self {
            broker,
            workers: Vec::new(),
        }
    }

    pub fn broker(&self) -> &Arc<MessageBroker<P>> {
        &self.broker
    }

    /// Start `worker` on its own thread.
    pub fn spawn<W: Worker<P>>(&mut self, worker: W) -> Result<SubscriberId, WorkerError> {
        let handle = WorkerRuntime::new(worker, Arc::clone(&self.broker)).spawn()?;
        let id = handle.id();
        info!(worker = handle.name(), %id, "Spawned worker");
        self.workers.push(Box::new(handle));
        Ok(id)
    }

    /// Block until every worker has finished initialising, or `timeout`
    /// elapses. Workers that already terminated count as ready.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        self.workers.iter().all(|worker| {
            let remaining = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            worker.wait_for_timeout(WorkerState::Running, remaining)
        })
    }

    pub fn states(&self) -> Vec<(String, WorkerState)> {
        self.workers
            .iter()
            .map(|worker| (worker.name().to_string(), worker.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Join every worker. All threads are joined even when one fails; the
    /// first failure is returned.
    pub fn join_all(self) -> Result<(), WorkerError> {
        let mut first_error = None;
        for worker in self.workers {
            let name = worker.name().to_string();
            if let Err(e) = worker.join() {
                error!(worker = %name, error = %e, "Worker failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SampleBroadcast, SampleEvent, SampleProtocol, SampleTopic};
    use crate::worker::{HandlerTable, WorkerContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_types::EventEnvelope;

    struct Counter {
        name: &'static str,
        served: Arc<AtomicUsize>,
    }

    impl Worker<SampleProtocol> for Counter {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn initialize(&mut self, handlers: &mut HandlerTable<SampleProtocol, Self>, _ctx: &WorkerContext<SampleProtocol>) {
            handlers.on_event(SampleTopic::Request, |worker, ctx, envelope| {
                worker.served.fetch_add(1, Ordering::SeqCst);
                let SampleEvent::Request(n) = envelope.payload();
                ctx.complete(envelope.id(), *n);
            });
        }
    }

    struct Crasher;

    impl Worker<SampleProtocol> for Crasher {
        fn name(&self) -> String {
            "crasher".to_string()
        }

        fn initialize(&mut self, _handlers: &mut HandlerTable<SampleProtocol, Self>, _ctx: &WorkerContext<SampleProtocol>) {
            panic!("initialisation bug");
        }
    }

    #[test]
    fn events_are_spread_across_workers() -> Result<(), Box<dyn std::error::Error>> {
        let broker = Arc::new(MessageBroker::<SampleProtocol>::new());
        let mut supervisor = Supervisor::new(Arc::clone(&broker));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        supervisor.spawn(Counter { name: "first", served: Arc::clone(&first) })?;
        supervisor.spawn(Counter { name: "second", served: Arc::clone(&second) })?;
        assert_eq!(supervisor.len(), 2);
        assert!(supervisor.wait_ready(Duration::MAX));

        for n in 0..10 {
            let future = broker
                .send_event(EventEnvelope::new(SampleEvent::Request(n)))
                .ok_or("no subscriber")?;
            assert_eq!(future.get_timeout(Duration::from_secs(5)), Some(n));
        }

        assert_eq!(first.load(Ordering::SeqCst), 5);
        assert_eq!(second.load(Ordering::SeqCst), 5);
        assert!(supervisor.states().iter().all(|(_, s)| *s == WorkerState::Running));

        broker.send_broadcast(SampleBroadcast::Shutdown);
        supervisor.join_all()?;
        assert!(broker.event_subscribers(SampleTopic::Request).is_empty());
        Ok(())
    }

    #[test]
    fn join_all_reports_a_panicked_worker() -> Result<(), Box<dyn std::error::Error>> {
        let broker = Arc::new(MessageBroker::<SampleProtocol>::new());
        let mut supervisor = Supervisor::new(Arc::clone(&broker));
        let served = Arc::new(AtomicUsize::new(0));
        supervisor.spawn(Crasher)?;
        supervisor.spawn(Counter { name: "survivor", served })?;
        assert!(supervisor.wait_ready(Duration::from_secs(5)));

        broker.send_broadcast(SampleBroadcast::Shutdown);
        let outcome = supervisor.join_all();
        assert!(matches!(outcome, Err(WorkerError::Panicked { name }) if name == "crasher"));
        Ok(())
    }
}
