//! Message vocabulary of the sensor-fusion simulation.

use switchyard_types::{Protocol, Routable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimTopic {
    Tick,
    Terminated,
    Crashed,
    DetectObjects,
}

/// Point-to-point requests, answered by one fusion worker each.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    DetectObjects { sensor: String, tick: u64, objects: u64 },
}

impl Routable for SimEvent {
    type Topic = SimTopic;

    fn topic(&self) -> SimTopic {
        match self {
            SimEvent::DetectObjects { .. } => SimTopic::DetectObjects,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimBroadcast {
    /// One clock period elapsed. Ticks start at 1.
    Tick { tick: u64 },
    /// The run reached its configured duration.
    Terminated { source: String },
    /// A participant failed; everyone stops early.
    Crashed { source: String, reason: String },
}

impl Routable for SimBroadcast {
    type Topic = SimTopic;

    fn topic(&self) -> SimTopic {
        match self {
            SimBroadcast::Tick { .. } => SimTopic::Tick,
            SimBroadcast::Terminated { .. } => SimTopic::Terminated,
            SimBroadcast::Crashed { .. } => SimTopic::Crashed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimReply {
    Acknowledged { tracked: u64 },
}

pub struct SimProtocol;

impl Protocol for SimProtocol {
    type Topic = SimTopic;
    type Event = SimEvent;
    type Broadcast = SimBroadcast;
    type Reply = SimReply;

    fn shutdown_topic() -> SimTopic {
        SimTopic::Terminated
    }
}
