//! Live download progress (bytes done, rate, ETA).
//!
//! Workers publish their resume offsets into a shared [`ProgressTracker`];
//! a reporter (the CLI) polls [`ProgressTracker::snapshot`] on its own schedule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Per-worker byte counters shared between the workers and a reporter.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    state: Arc<RwLock<State>>,
}

#[derive(Debug)]
struct State {
    total_bytes: u64,
    /// Bytes already on disk when this run started (resume).
    resumed_bytes: u64,
    per_worker: Vec<AtomicU64>,
    started: Instant,
}

impl Default for State {
    fn default() -> Self {
        Self {
            total_bytes: 0,
            resumed_bytes: 0,
            per_worker: Vec::new(),
            started: Instant::now(),
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters for a new run. `done[i]` holds the bytes worker `i`
    /// already has on disk.
    pub(crate) fn begin(&self, total_bytes: u64, done: &[u64]) {
        if let Ok(mut state) = self.state.write() {
            *state = State {
                total_bytes,
                resumed_bytes: done.iter().sum(),
                per_worker: done.iter().map(|&d| AtomicU64::new(d)).collect(),
                started: Instant::now(),
            };
        }
    }

    /// Record that `worker` now has `bytes` of its range on disk.
    pub(crate) fn set_worker_bytes(&self, worker: usize, bytes: u64) {
        if let Ok(state) = self.state.read() {
            if let Some(a) = state.per_worker.get(worker) {
                a.store(bytes, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> ProgressStats {
        match self.state.read() {
            Ok(state) => ProgressStats {
                bytes_done: state
                    .per_worker
                    .iter()
                    .map(|a| a.load(Ordering::Relaxed))
                    .sum(),
                resumed_bytes: state.resumed_bytes,
                total_bytes: state.total_bytes,
                elapsed_secs: state.started.elapsed().as_secs_f64(),
                worker_count: state.per_worker.len(),
            },
            Err(_) => ProgressStats {
                bytes_done: 0,
                resumed_bytes: 0,
                total_bytes: 0,
                elapsed_secs: 0.0,
                worker_count: 0,
            },
        }
    }
}

/// Point-in-time view of a download's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes on disk, including bytes carried over from a previous run.
    pub bytes_done: u64,
    /// Bytes that were already on disk when this run started.
    pub resumed_bytes: u64,
    pub total_bytes: u64,
    pub elapsed_secs: f64,
    pub worker_count: usize,
}

impl ProgressStats {
    /// Bytes fetched by this run (excludes resumed bytes).
    pub fn fetched_bytes(&self) -> u64 {
        self.bytes_done.saturating_sub(self.resumed_bytes)
    }

    /// Rate of this run in bytes per second (0 if nothing elapsed).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.fetched_bytes() as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None while the rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
