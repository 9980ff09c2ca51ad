//! Run-wide counters shared by every worker, and the report built from them.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashReport {
    pub source: String,
    pub reason: String,
}

/// Snapshot of [`Statistics`] printed at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub runtime_ticks: u64,
    pub detected_objects: u64,
    pub tracked_objects: u64,
    /// Detections sent while no fusion worker was subscribed.
    pub dropped_events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crashed: Option<CrashReport>,
}

#[derive(Debug, Default)]
pub struct Statistics {
    runtime_ticks: AtomicU64,
    detected_objects: AtomicU64,
    tracked_objects: AtomicU64,
    dropped_events: AtomicU64,
    crashed: Mutex<Option<CrashReport>>,
}

impl Statistics {
    pub fn record_tick(&self) {
        self.runtime_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detected(&self, objects: u64) {
        self.detected_objects.fetch_add(objects, Ordering::Relaxed);
    }

    pub fn record_tracked(&self, objects: u64) {
        self.tracked_objects.fetch_add(objects, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember the first crash only; later ones are consequences.
    pub fn record_crash(&self, source: &str, reason: &str) -> bool {
        let mut crashed = self.crashed.lock();
        if crashed.is_some() {
            return false;
        }
        *crashed = Some(CrashReport {
            source: source.to_string(),
            reason: reason.to_string(),
        });
        true
    }

    pub fn has_crashed(&self) -> bool {
        self.crashed.lock().is_some()
    }

    pub fn runtime_ticks(&self) -> u64 {
        self.runtime_ticks.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> StatisticsReport {
        StatisticsReport {
            runtime_ticks: self.runtime_ticks(),
            detected_objects: self.detected_objects.load(Ordering::Relaxed),
            tracked_objects: self.tracked_objects.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            crashed: self.crashed.lock().clone(),
        }
    }
}
