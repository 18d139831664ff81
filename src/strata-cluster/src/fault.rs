//! Simulated worker faults.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use common_error::{EngineFault, StrataError, StrataResult};
use log::warn;

use crate::worker::WorkerId;

/// Makes upcoming worker tasks fail, to exercise recovery paths.
///
/// Faults are consumed in order by whichever worker task asks next. Armed
/// transient faults are consumed before permanent ones.
#[derive(Debug, Default)]
pub struct FaultInjector {
    transient: AtomicU32,
    permanent: AtomicU32,
    injected: AtomicU64,
}

impl FaultInjector {
    /// No faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` worker tasks with a transient fault ("worker lost").
    pub fn fail_next(&self, n: u32) {
        self.transient.fetch_add(n, Ordering::SeqCst);
    }

    /// Fail the next `n` worker tasks with a permanent fault.
    pub fn fail_next_permanently(&self, n: u32) {
        self.permanent.fetch_add(n, Ordering::SeqCst);
    }

    /// Disarm all pending faults.
    pub fn clear(&self) {
        self.transient.store(0, Ordering::SeqCst);
        self.permanent.store(0, Ordering::SeqCst);
    }

    /// Number of faults raised so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    /// Called by a worker before it runs a task.
    pub(crate) fn check(&self, engine: &str, worker: WorkerId, what: &str) -> StrataResult<()> {
        let fault = if take_one(&self.transient) {
            EngineFault::transient(engine, format!("{worker} lost while running {what}"))
        } else if take_one(&self.permanent) {
            EngineFault::permanent(engine, format!("{worker} rejected {what}"))
        } else {
            return Ok(());
        };
        self.injected.fetch_add(1, Ordering::SeqCst);
        warn!("[{engine}] injected fault: {fault}");
        Err(StrataError::EngineExecutionError(
            fault.with_detail(worker.to_string()),
        ))
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_consumed() {
        let faults = FaultInjector::new();
        let worker = WorkerId::new(1);
        assert!(faults.check("cluster", worker, "map").is_ok());

        faults.fail_next(1);
        faults.fail_next_permanently(1);

        let err = faults.check("cluster", worker, "map").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.detail(), Some("worker#1"));

        let err = faults.check("cluster", worker, "map").unwrap_err();
        assert!(!err.is_transient());

        assert!(faults.check("cluster", worker, "map").is_ok());
        assert_eq!(faults.injected(), 2);
    }

    #[test]
    fn test_clear() {
        let faults = FaultInjector::new();
        faults.fail_next(3);
        faults.clear();
        assert!(faults.check("cluster", WorkerId::new(0), "map").is_ok());
        assert_eq!(faults.injected(), 0);
    }
}
