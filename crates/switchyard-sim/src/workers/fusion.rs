use std::sync::Arc;

use switchyard_runtime::{HandlerTable, Worker, WorkerContext};
use tracing::trace;

use crate::protocol::{SimEvent, SimProtocol, SimReply, SimTopic};
use crate::stats::Statistics;

/// Tracks detected objects and acknowledges each detection.
pub struct FusionWorker {
    index: usize,
    stats: Arc<Statistics>,
    handled: u64,
}

impl FusionWorker {
    pub fn new(index: usize, stats: Arc<Statistics>) -> Self {
        Self {
            index,
            stats,
            handled: 0,
        }
    }
}

impl Worker<SimProtocol> for FusionWorker {
    fn name(&self) -> String {
        format!("fusion-{}", self.index)
    }

    fn initialize(&mut self, handlers: &mut HandlerTable<SimProtocol, Self>, _ctx: &WorkerContext<SimProtocol>) {
        handlers
            .on_event(SimTopic::DetectObjects, |fusion, ctx, envelope| {
                let SimEvent::DetectObjects { sensor, tick, objects } = envelope.payload();
                fusion.handled += 1;
                trace!(
                    %sensor,
                    tick,
                    objects,
                    handled = fusion.handled,
                    latency_us = envelope.age().num_microseconds(),
                    "Fusing detection"
                );
                fusion.stats.record_tracked(*objects);
                ctx.complete(envelope.id(), SimReply::Acknowledged { tracked: *objects });
            })
            .on_broadcast(SimTopic::Crashed, |_fusion, ctx, _crash| ctx.terminate());
    }
}
