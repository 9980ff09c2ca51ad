//! Protocol used by this crate's unit tests.

use switchyard_types::{Protocol, Routable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SampleTopic {
    Request,
    Notice,
    Shutdown,
}

#[derive(Debug, Clone)]
pub(crate) enum SampleEvent {
    Request(u32),
}

impl Routable for SampleEvent {
    type Topic = SampleTopic;

    fn topic(&self) -> SampleTopic {
        SampleTopic::Request
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SampleBroadcast {
    Notice(u32),
    Shutdown,
}

impl Routable for SampleBroadcast {
    type Topic = SampleTopic;

    fn topic(&self) -> SampleTopic {
        match self {
            SampleBroadcast::Notice(_) => SampleTopic::Notice,
            SampleBroadcast::Shutdown => SampleTopic::Shutdown,
        }
    }
}

pub(crate) struct SampleProtocol;

impl Protocol for SampleProtocol {
    type Topic = SampleTopic;
    type Event = SampleEvent;
    type Broadcast = SampleBroadcast;
    type Reply = u32;

    fn shutdown_topic() -> SampleTopic {
        SampleTopic::Shutdown
    }
}
