//! The simulation's participants.
//!
//! - [`ClockWorker`] – drives time with `Tick` broadcasts and ends the run.
//! - [`SensorWorker`] – turns ticks into `DetectObjects` events.
//! - [`FusionWorker`] – answers `DetectObjects` and tallies tracked objects.

mod clock;
mod fusion;
mod sensor;

pub use clock::ClockWorker;
pub use fusion::FusionWorker;
pub use sensor::SensorWorker;

/// Name the clock uses as the source of its `Terminated` broadcast.
pub const CLOCK_NAME: &str = "clock";
