//! Memory managers and reservations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common_error::{StrataError, StrataResult};

/// Accounts for memory held by persisted frames.
///
/// Accounting only: exceeding the limit fails the reservation with a
/// `ResourceError`, it does not evict anything.
pub trait MemoryManager: Send + Sync + std::fmt::Debug {
    /// Reserve memory. Returns `ResourceError` if the limit would be exceeded.
    fn reserve(&self, bytes: usize) -> StrataResult<()>;

    /// Release previously reserved memory.
    fn release(&self, bytes: usize);

    /// Current usage in bytes.
    fn used(&self) -> usize;

    /// Limit in bytes (0 = unlimited).
    fn limit(&self) -> usize;

    /// Bytes still available (`usize::MAX` if unlimited).
    fn available(&self) -> usize {
        match self.limit() {
            0 => usize::MAX,
            limit => limit.saturating_sub(self.used()),
        }
    }
}

/// Memory manager enforcing a byte limit.
#[derive(Debug, Default)]
pub struct TrackingMemoryManager {
    used: AtomicUsize,
    limit: usize,
}

impl TrackingMemoryManager {
    /// Create a manager with `limit` bytes; 0 means unlimited.
    pub fn new(limit: usize) -> Self {
        Self {
            used: AtomicUsize::new(0),
            limit,
        }
    }
}

impl MemoryManager for TrackingMemoryManager {
    fn reserve(&self, bytes: usize) -> StrataResult<()> {
        if bytes == 0 {
            return Ok(());
        }
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new = current.saturating_add(bytes);
            if self.limit > 0 && new > self.limit {
                return Err(StrataError::resource(format!(
                    "memory limit exceeded: {current} + {bytes} > {} bytes",
                    self.limit
                )));
            }
            match self
                .used
                .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        // fetch_update never fails when the closure always returns Some
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    fn limit(&self) -> usize {
        self.limit
    }
}

/// RAII guard for a memory reservation; releases on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    manager: Arc<dyn MemoryManager>,
    bytes: usize,
}

impl MemoryReservation {
    /// Reserve `bytes` from `manager`.
    pub fn try_new(manager: Arc<dyn MemoryManager>, bytes: usize) -> StrataResult<Self> {
        manager.reserve(bytes)?;
        Ok(Self { manager, bytes })
    }

    /// Reserved size.
    pub fn size(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.manager.release(self.bytes);
        }
    }
}
