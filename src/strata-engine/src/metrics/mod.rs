//! Per-operation engine metrics.
//!
//! Every engine records one entry per `ExecutionEngine` operation it
//! serves. Tests use the call counts to observe which engine operations a
//! run issued.

#![allow(clippy::significant_drop_tightening)] // Guards must stay alive for their scope

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Metrics for one engine operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationMetrics {
    /// Number of calls.
    pub calls: u64,
    /// Input rows across calls.
    pub rows_in: u64,
    /// Output rows across calls.
    pub rows_out: u64,
    /// Total time spent.
    pub exec_time: Duration,
}

/// Thread-safe collection of [`OperationMetrics`] keyed by operation name.
///
/// Clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    metrics: Arc<RwLock<BTreeMap<String, OperationMetrics>>>,
}

impl EngineMetrics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call of `operation`.
    pub fn record(&self, operation: &str, rows_in: usize, rows_out: usize, elapsed: Duration) {
        let mut guard = self.metrics.write().expect("metrics lock poisoned");
        let m = guard.entry(operation.to_string()).or_default();
        m.calls += 1;
        m.rows_in += rows_in as u64;
        m.rows_out += rows_out as u64;
        m.exec_time += elapsed;
    }

    /// Metrics for one operation.
    pub fn get(&self, operation: &str) -> Option<OperationMetrics> {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .get(operation)
            .cloned()
    }

    /// Number of calls of `operation`.
    pub fn calls(&self, operation: &str) -> u64 {
        self.get(operation).map_or(0, |m| m.calls)
    }

    /// Number of calls across all operations.
    pub fn total_calls(&self) -> u64 {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .values()
            .map(|m| m.calls)
            .sum()
    }

    /// Snapshot of all metrics.
    pub fn all(&self) -> BTreeMap<String, OperationMetrics> {
        self.metrics.read().expect("metrics lock poisoned").clone()
    }

    /// Clear all metrics.
    pub fn clear(&self) {
        self.metrics.write().expect("metrics lock poisoned").clear();
    }

    /// One line per operation, for logs.
    pub fn summary(&self) -> String {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        let mut output = String::new();
        for (op, m) in metrics.iter() {
            let _ = writeln!(
                output,
                "{op}: calls={}, rows_in={}, rows_out={}, time={:?}",
                m.calls, m.rows_in, m.rows_out, m.exec_time
            );
        }
        if output.is_empty() {
            output.push_str("No engine calls.\n");
        }
        output
    }
}

/// Timer for measuring operation time.
#[derive(Debug)]
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time without stopping.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for ExecutionTimer {
    fn default() -> Self {
        Self::start()
    }
}
