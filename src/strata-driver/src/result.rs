//! What a run reports.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use common_error::{ErrorCategory, StrataError, StrataResult};
use strata_engine::DataFrame;
use strata_workflow::TaskId;

use crate::state::TaskState;

/// Outcome of one task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task id.
    pub id: TaskId,
    /// Task name.
    pub name: String,
    /// Position in the graph's topological order.
    pub position: usize,
    /// Final state.
    pub state: TaskState,
    /// Number of times the body was started.
    pub attempts: u32,
    /// Wall time spent on the task, retries included.
    pub elapsed: Duration,
    /// Rows of the produced frame; `None` for output tasks and tasks that
    /// did not complete.
    pub output_rows: Option<usize>,
}

/// Why a task failed.
#[derive(Debug)]
pub struct TaskFailure {
    /// Task id.
    pub task: TaskId,
    /// Task name.
    pub name: String,
    /// Position in the graph's topological order.
    pub position: usize,
    /// Error category; `UpstreamFailed` for tasks aborted because an input failed.
    pub category: ErrorCategory,
    /// Error message.
    pub message: String,
    /// Supplementary backend detail.
    pub detail: Option<String>,
    pub(crate) error: Option<StrataError>,
}

impl TaskFailure {
    pub(crate) fn from_error(task: TaskId, name: &str, position: usize, error: StrataError) -> Self {
        Self {
            task,
            name: name.to_string(),
            position,
            category: error.category(),
            message: error.to_string(),
            detail: error.detail().map(str::to_string),
            error: Some(error),
        }
    }

    pub(crate) fn upstream(task: TaskId, name: &str, position: usize, failed_input: &str) -> Self {
        Self {
            task,
            name: name.to_string(),
            position,
            category: ErrorCategory::UpstreamFailed,
            message: format!("input task '{failed_input}' failed"),
            detail: None,
            error: None,
        }
    }

    /// The original error; `None` for upstream failures.
    pub fn error(&self) -> Option<&StrataError> {
        self.error.as_ref()
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task '{}' ({}, position {}) failed with {}: {}",
            self.name, self.task, self.position, self.category, self.message
        )
    }
}

/// Result of running a workflow.
#[derive(Debug, Default)]
pub struct RunResult {
    /// One report per task, in topological order.
    pub reports: Vec<TaskReport>,
    /// Failed tasks, in topological order. Root causes come before the
    /// tasks aborted because of them. Failures to release a task's output
    /// are appended when they happen.
    pub failures: Vec<TaskFailure>,
    /// Frames of tasks marked to yield their result, by task name.
    pub yielded: BTreeMap<String, DataFrame>,
    /// Tasks whose output was released, in release order.
    pub released: Vec<TaskId>,
}

impl RunResult {
    /// Whether every task completed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.reports.iter().all(|r| r.state == TaskState::Completed)
    }

    /// Report of the task called `name`.
    pub fn report(&self, name: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    /// Final state of the task called `name`.
    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.report(name).map(|r| r.state)
    }

    /// Failure of the task called `name`.
    pub fn failure(&self, name: &str) -> Option<&TaskFailure> {
        self.failures.iter().find(|f| f.name == name)
    }

    /// Yielded frame of the task called `name`.
    pub fn yielded(&self, name: &str) -> Option<&DataFrame> {
        self.yielded.get(name)
    }

    /// The result itself, or the first root-cause error if any task failed.
    pub fn into_result(mut self) -> StrataResult<Self> {
        let root = self
            .failures
            .iter_mut()
            .find_map(|f| f.error.take());
        match root {
            Some(error) => Err(error),
            None if self.failures.is_empty() => Ok(self),
            None => Err(StrataError::internal("run failed without a root cause")),
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.reports {
            write!(
                f,
                "{:>3} {:<24} {:<10} attempts={} elapsed={:?}",
                report.position, report.name, report.state, report.attempts, report.elapsed
            )?;
            if let Some(rows) = report.output_rows {
                write!(f, " rows={rows}")?;
            }
            writeln!(f)?;
        }
        for failure in &self.failures {
            writeln!(f, "{failure}")?;
        }
        Ok(())
    }
}
