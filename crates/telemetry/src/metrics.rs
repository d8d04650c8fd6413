//! Counters and histograms.
//!
//! Counters are lock-free atomics; histograms keep raw samples behind a
//! mutex, which is fine at the rates these services run (one sample per
//! workflow run or service tick, not per request).

use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by one.
    pub fn incr(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A histogram over f64 samples.
#[derive(Debug, Default)]
pub struct Histogram {
    samples: Mutex<Vec<f64>>,
}

/// Aggregates computed from a histogram's samples.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramSnapshot {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample.
    pub fn observe(&self, value: f64) {
        self.samples.lock().unwrap().push(value);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return HistogramSnapshot {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let sum: f64 = samples.iter().sum();
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        HistogramSnapshot {
            count: samples.len(),
            sum,
            min,
            max,
            mean: sum / samples.len() as f64,
        }
    }
}

/// The metrics sampled by the runtime's services.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    /// Workflow runs started.
    pub workflow_runs: Counter,
    /// Workflow runs that ended `failed`.
    pub workflow_failures: Counter,
    /// Total wall-clock duration per workflow run.
    pub workflow_duration_seconds: Histogram,

    /// Cron jobs fired.
    pub cron_runs: Counter,
    /// Cron jobs whose engine call failed or timed out.
    pub cron_failures: Counter,

    /// Heartbeats that reached the engine.
    pub heartbeat_runs: Counter,
}

/// A point-in-time view of all metrics, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub workflow_runs: u64,
    pub workflow_failures: u64,
    pub workflow_duration_seconds: HistogramSnapshot,
    pub cron_runs: u64,
    pub cron_failures: u64,
    pub heartbeat_runs: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workflow_runs: self.workflow_runs.get(),
            workflow_failures: self.workflow_failures.get(),
            workflow_duration_seconds: self.workflow_duration_seconds.snapshot(),
            cron_runs: self.cron_runs.get(),
            cron_failures: self.cron_failures.get(),
            heartbeat_runs: self.heartbeat_runs.get(),
        }
    }
}
