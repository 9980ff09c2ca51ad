//! Minimal protocol shared by the unit tests of this crate.

use switchyard_types::{Protocol, Routable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TestTopic {
    Ping,
    Req,
    Unknown,
    Tick,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TestEvent {
    Ping(u32),
    Req(u32),
    Unknown,
}

impl Routable for TestEvent {
    type Topic = TestTopic;

    fn topic(&self) -> TestTopic {
        match self {
            TestEvent::Ping(_) => TestTopic::Ping,
            TestEvent::Req(_) => TestTopic::Req,
            TestEvent::Unknown => TestTopic::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TestBroadcast {
    Tick(u32),
    Shutdown,
}

impl Routable for TestBroadcast {
    type Topic = TestTopic;

    fn topic(&self) -> TestTopic {
        match self {
            TestBroadcast::Tick(_) => TestTopic::Tick,
            TestBroadcast::Shutdown => TestTopic::Shutdown,
        }
    }
}

pub(crate) struct TestProtocol;

impl Protocol for TestProtocol {
    type Topic = TestTopic;
    type Event = TestEvent;
    type Broadcast = TestBroadcast;
    type Reply = u32;

    fn shutdown_topic() -> TestTopic {
        TestTopic::Shutdown
    }
}
