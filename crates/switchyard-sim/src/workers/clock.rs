use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use switchyard_broker::MessageBroker;
use switchyard_runtime::{HandlerTable, Worker, WorkerContext};
use tracing::{debug, error, info};

use super::CLOCK_NAME;
use crate::protocol::{SimBroadcast, SimProtocol, SimTopic};
use crate::stats::Statistics;

/// Broadcasts `Tick` every period for `duration` ticks, then `Terminated`.
///
/// Ticks are produced by a helper thread so the clock's own receive loop
/// stays free to react to `Crashed`. Dropping the stop sender wakes the
/// helper out of its sleep.
pub struct ClockWorker {
    period: Duration,
    duration: u64,
    stats: Arc<Statistics>,
    stop: Option<Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

impl ClockWorker {
    pub fn new(period: Duration, duration: u64, stats: Arc<Statistics>) -> Self {
        Self {
            period,
            duration,
            stats,
            stop: None,
            timer: None,
        }
    }

    fn stop_timer(&mut self) {
        drop(self.stop.take());
        if let Some(timer) = self.timer.take()
            && timer.join().is_err()
        {
            error!("Timer thread panicked");
        }
    }
}

impl Worker<SimProtocol> for ClockWorker {
    fn name(&self) -> String {
        CLOCK_NAME.to_string()
    }

    fn initialize(&mut self, handlers: &mut HandlerTable<SimProtocol, Self>, ctx: &WorkerContext<SimProtocol>) {
        handlers
            .on_broadcast(SimTopic::Crashed, |clock, ctx, crash| {
                if let SimBroadcast::Crashed { source, reason } = crash {
                    clock.stats.record_crash(source, reason);
                }
                clock.stop_timer();
                ctx.terminate();
            })
            .on_broadcast(SimTopic::Terminated, |clock, _ctx, _done| clock.stop_timer());

        // The timer may finish before the runtime subscribes us, so the
        // topics that end the clock are subscribed up front.
        let broker = ctx.broker();
        broker.subscribe_broadcast(SimTopic::Crashed, ctx.id());
        broker.subscribe_broadcast(SimTopic::Terminated, ctx.id());

        // Crashes are recorded before they are broadcast, so one that slipped
        // in before the subscription above shows up here.
        if self.stats.has_crashed() {
            info!("Run already crashed, clock not started");
            ctx.terminate();
            return;
        }

        let (stop_tx, stop_rx) = channel::bounded(0);
        let timer = Timer {
            broker,
            period: self.period,
            duration: self.duration,
            stats: Arc::clone(&self.stats),
            stop: stop_rx,
        };
        match thread::Builder::new()
            .name("clock-timer".to_string())
            .spawn(move || timer.run())
        {
            Ok(handle) => {
                self.stop = Some(stop_tx);
                self.timer = Some(handle);
                info!(period_ms = self.period.as_millis() as u64, duration = self.duration, "Clock started");
            }
            Err(e) => {
                error!(error = %e, "Failed to start timer thread");
                ctx.send_broadcast(SimBroadcast::Crashed {
                    source: CLOCK_NAME.to_string(),
                    reason: format!("timer thread failed to start: {e}"),
                });
            }
        }
    }
}

struct Timer {
    broker: Arc<MessageBroker<SimProtocol>>,
    period: Duration,
    duration: u64,
    stats: Arc<Statistics>,
    stop: Receiver<()>,
}

impl Timer {
    fn run(self) {
        for tick in 1..=self.duration {
            self.stats.record_tick();
            let reached = self.broker.send_broadcast(SimBroadcast::Tick { tick });
            debug!(tick, reached, "Tick");
            match self.stop.recv_timeout(self.period) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!(tick, "Timer stopped early");
                    return;
                }
            }
        }
        self.broker.send_broadcast(SimBroadcast::Terminated {
            source: CLOCK_NAME.to_string(),
        });
    }
}
