//! Workflow execution for Strata.
//!
//! The driver walks a finalized [`WorkflowDag`](strata_workflow::WorkflowDag)
//! in topological order against one bound
//! [`ExecutionEngine`](strata_engine::ExecutionEngine):
//!
//! - each task moves through [`TaskState`] from `Pending` to `Completed` or
//!   `Failed`
//! - every produced frame is released once its last consumer has finished,
//!   unless the task yields its result
//! - the first failure stops the walk unless fail-fast is turned off, and
//!   tasks downstream of a failure are reported as `UpstreamFailed`
//! - non-deterministic tasks are rerun on transient engine faults, per
//!   [`RetryPolicy`]
//!
//! # Example
//!
//! ```rust,ignore
//! let engine: Arc<dyn ExecutionEngine> = Arc::new(LocalEngine::default());
//! let result = strata_driver::run(&dag, engine, &RunOptions::default()).await?;
//! assert!(result.is_success());
//! ```

mod driver;
mod options;
mod release;
mod result;
mod state;

pub use driver::{Driver, run};
pub use options::{RetryPolicy, RunOptions};
pub use result::{RunResult, TaskFailure, TaskReport};
pub use state::TaskState;
