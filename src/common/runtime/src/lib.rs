//! Async runtime utilities for Strata.
//!
//! The driver and engines are async; synchronous entry points go through
//! [`block_on`]. The cluster engine fans worker tasks out with [`JoinSet`].

use std::future::Future;

use common_error::{StrataError, StrataResult};
use tokio::runtime::Runtime;

/// Create a multi-threaded Tokio runtime for blocking operations.
pub fn get_runtime() -> StrataResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| StrataError::InternalError(format!("Failed to create runtime: {e}")))
}

/// Block on a future using a fresh runtime.
///
/// Must not be called from inside an async context.
pub fn block_on<F: Future>(future: F) -> StrataResult<F::Output> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(StrataError::internal(
            "block_on called from within an async runtime",
        ));
    }
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// A handle to a set of spawned tasks.
pub struct JoinSet<T> {
    inner: tokio::task::JoinSet<T>,
}

impl<T: Send + 'static> JoinSet<T> {
    /// Create a new join set.
    pub fn new() -> Self {
        Self {
            inner: tokio::task::JoinSet::new(),
        }
    }

    /// Spawn a task into the set.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.inner.spawn(future);
    }

    /// Wait for the next task to complete. A panicked or cancelled task is
    /// reported as an internal error.
    pub async fn join_next(&mut self) -> Option<StrataResult<T>> {
        self.inner.join_next().await.map(|joined| {
            joined.map_err(|e| StrataError::internal(format!("spawned task failed: {e}")))
        })
    }

    /// Wait for every task, returning outputs in completion order.
    pub async fn join_all(mut self) -> StrataResult<Vec<T>> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(next) = self.join_next().await {
            out.push(next?);
        }
        Ok(out)
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the number of tasks in the set.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Send + 'static> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
