use std::sync::Arc;

use switchyard_broker::ReplyFuture;
use switchyard_runtime::{HandlerTable, Worker, WorkerContext};
use tracing::{debug, warn};

use crate::config::SensorConfig;
use crate::protocol::{SimBroadcast, SimEvent, SimProtocol, SimReply, SimTopic};
use crate::stats::Statistics;

/// Emits a `DetectObjects` event on every tick divisible by its frequency.
///
/// At `fail_at_tick` the sensor broadcasts `Crashed` instead and stops.
pub struct SensorWorker {
    config: SensorConfig,
    stats: Arc<Statistics>,
    last_reply: Option<ReplyFuture<SimReply>>,
}

impl SensorWorker {
    pub fn new(config: SensorConfig, stats: Arc<Statistics>) -> Self {
        Self {
            config,
            stats,
            last_reply: None,
        }
    }

    fn on_tick(&mut self, ctx: &WorkerContext<SimProtocol>, tick: u64) {
        if self.config.fail_at_tick == Some(tick) {
            let reason = format!("sensor failure at tick {tick}");
            warn!(tick, "Sensor failed");
            self.stats.record_crash(ctx.name(), &reason);
            ctx.send_broadcast(SimBroadcast::Crashed {
                source: ctx.name().to_string(),
                reason,
            });
            ctx.terminate();
            return;
        }
        if tick % self.config.frequency != 0 {
            return;
        }

        if let Some(SimReply::Acknowledged { tracked }) = self.last_reply.take().and_then(|f| f.try_get()) {
            debug!(tracked, "Previous detection acknowledged");
        }

        let objects = self.config.detections_per_tick;
        self.stats.record_detected(objects);
        let event = SimEvent::DetectObjects {
            sensor: self.config.id.clone(),
            tick,
            objects,
        };
        match ctx.send_event(event) {
            Some(reply) => self.last_reply = Some(reply),
            None => {
                self.stats.record_dropped();
                debug!(tick, "No fusion worker available, detection dropped");
            }
        }
    }
}

impl Worker<SimProtocol> for SensorWorker {
    fn name(&self) -> String {
        format!("sensor-{}", self.config.id)
    }

    fn initialize(&mut self, handlers: &mut HandlerTable<SimProtocol, Self>, _ctx: &WorkerContext<SimProtocol>) {
        handlers
            .on_broadcast(SimTopic::Tick, |sensor, ctx, broadcast| {
                if let SimBroadcast::Tick { tick } = broadcast {
                    sensor.on_tick(ctx, *tick);
                }
            })
            .on_broadcast(SimTopic::Crashed, |_sensor, ctx, _crash| ctx.terminate());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchyard_broker::MessageBroker;
    use switchyard_runtime::WorkerRuntime;
    use switchyard_types::{Message, SubscriberId, WorkerState};

    fn sensor(frequency: u64, fail_at_tick: Option<u64>) -> SensorConfig {
        SensorConfig {
            id: "front".to_string(),
            frequency,
            detections_per_tick: 2,
            fail_at_tick,
        }
    }

    fn ticks(duration: u64) -> Vec<SimBroadcast> {
        (1..=duration).map(|tick| SimBroadcast::Tick { tick }).collect()
    }

    #[test]
    fn detects_on_ticks_divisible_by_frequency() -> Result<(), Box<dyn std::error::Error>> {
        let broker = Arc::new(MessageBroker::new());
        let stats = Arc::new(Statistics::default());
        let fusion = SubscriberId::new();
        broker.register(fusion);
        broker.subscribe_event(SimTopic::DetectObjects, fusion);

        let handle = WorkerRuntime::new(SensorWorker::new(sensor(2, None), Arc::clone(&stats)), Arc::clone(&broker))
            .spawn()?;
        handle.wait_for(WorkerState::Running);
        for tick in ticks(5) {
            broker.send_broadcast(tick);
        }
        broker.send_broadcast(SimBroadcast::Terminated {
            source: "test".to_string(),
        });
        handle.join()?;

        let mut detected_at = Vec::new();
        while let Some(Message::Event(envelope)) = broker.await_message_timeout(fusion, Duration::ZERO)? {
            let SimEvent::DetectObjects { sensor, tick, objects } = envelope.payload();
            assert_eq!(sensor, "front");
            assert_eq!(*objects, 2);
            detected_at.push(*tick);
        }
        assert_eq!(detected_at, vec![2, 4]);
        assert_eq!(stats.report().detected_objects, 4);
        Ok(())
    }

    #[test]
    fn detections_without_fusion_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let broker = Arc::new(MessageBroker::new());
        let stats = Arc::new(Statistics::default());
        let handle = WorkerRuntime::new(SensorWorker::new(sensor(1, None), Arc::clone(&stats)), Arc::clone(&broker))
            .spawn()?;
        handle.wait_for(WorkerState::Running);
        for tick in ticks(3) {
            broker.send_broadcast(tick);
        }
        broker.send_broadcast(SimBroadcast::Terminated {
            source: "test".to_string(),
        });
        handle.join()?;
        assert_eq!(stats.report().dropped_events, 3);
        Ok(())
    }

    #[test]
    fn failing_sensor_broadcasts_crash_and_stops() -> Result<(), Box<dyn std::error::Error>> {
        let broker = Arc::new(MessageBroker::new());
        let stats = Arc::new(Statistics::default());
        let observer = SubscriberId::new();
        broker.register(observer);
        broker.subscribe_broadcast(SimTopic::Crashed, observer);

        let handle = WorkerRuntime::new(SensorWorker::new(sensor(1, Some(2)), Arc::clone(&stats)), Arc::clone(&broker))
            .spawn()?;
        handle.wait_for(WorkerState::Running);
        for tick in ticks(2) {
            broker.send_broadcast(tick);
        }
        handle.join()?;

        let crash = broker.await_message_timeout(observer, Duration::from_secs(1))?;
        let crash = crash.as_ref().and_then(Message::as_broadcast);
        assert!(matches!(crash, Some(SimBroadcast::Crashed { source, .. }) if source == "sensor-front"));
        let report = stats.report();
        assert_eq!(report.detected_objects, 2);
        assert_eq!(report.crashed.map(|c| c.source), Some("sensor-front".to_string()));
        Ok(())
    }
}
