//! Wires the configured workers onto one broker and runs them to the end.

use std::sync::Arc;
use std::time::Duration;

use switchyard_broker::MessageBroker;
use switchyard_runtime::{Supervisor, WorkerError};
use tracing::{info, warn};

use crate::config::SimConfig;
use crate::protocol::{SimBroadcast, SimProtocol};
use crate::stats::{Statistics, StatisticsReport};
use crate::workers::{ClockWorker, FusionWorker, SensorWorker};

/// How long to wait for sensors and fusion workers before starting the
/// clock anyway.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one simulation on `broker` and block until every worker terminated.
///
/// The clock is spawned last, once every other worker is `Running`, so no
/// tick is broadcast before its subscribers exist. A crash recorded in
/// `stats` before that point (e.g. an operator stop) skips the clock.
pub fn run(
    config: &SimConfig,
    broker: Arc<MessageBroker<SimProtocol>>,
    stats: Arc<Statistics>,
) -> Result<StatisticsReport, WorkerError> {
    let mut supervisor = Supervisor::new(broker);

    if let Err(e) = spawn_workers(&mut supervisor, config, &stats) {
        // Release whatever did start before reporting.
        supervisor.broker().send_broadcast(SimBroadcast::Crashed {
            source: "supervisor".to_string(),
            reason: e.to_string(),
        });
        if let Err(join_error) = supervisor.join_all() {
            warn!(error = %join_error, "Worker failed during aborted start");
        }
        return Err(e);
    }

    supervisor.join_all()?;
    let report = stats.report();
    info!(ticks = report.runtime_ticks, tracked = report.tracked_objects, "Simulation finished");
    Ok(report)
}

fn spawn_workers(
    supervisor: &mut Supervisor<SimProtocol>,
    config: &SimConfig,
    stats: &Arc<Statistics>,
) -> Result<(), WorkerError> {
    for index in 0..config.fusion_workers {
        supervisor.spawn(FusionWorker::new(index, Arc::clone(stats)))?;
    }
    for sensor in &config.sensors {
        supervisor.spawn(SensorWorker::new(sensor.clone(), Arc::clone(stats)))?;
    }
    if !supervisor.wait_ready(READY_TIMEOUT) {
        warn!("Not every worker is running; starting the clock anyway");
    }
    if stats.has_crashed() {
        info!("Run stopped before the clock started");
        return Ok(());
    }
    supervisor.spawn(ClockWorker::new(config.tick(), config.duration, Arc::clone(stats)))?;
    Ok(())
}
