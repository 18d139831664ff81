//! Per-task execution state.

use std::fmt;

use common_error::{StrataError, StrataResult};
use log::debug;

/// Where a task is in its execution.
///
/// ```text
/// Pending -> ResolvingInputs -> Partitioning -> Executing -> Completed
///    \              \                \              \
///     +--------------+----------------+--------------+--> Failed
/// ```
///
/// A retry re-enters `ResolvingInputs` from any non-terminal running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Not started.
    Pending,
    /// Looking up input frames.
    ResolvingInputs,
    /// Applying the task's partition spec to its inputs.
    Partitioning,
    /// Running the task body.
    Executing,
    /// Finished successfully.
    Completed,
    /// Failed, or aborted because an input failed.
    Failed,
}

impl TaskState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a valid transition.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Pending, ResolvingInputs)
            | (ResolvingInputs, Partitioning)
            | (Partitioning, Executing)
            | (Executing, Completed) => true,
            (ResolvingInputs | Partitioning | Executing, ResolvingInputs) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::ResolvingInputs => "ResolvingInputs",
            Self::Partitioning => "Partitioning",
            Self::Executing => "Executing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.pad(name)
    }
}

/// Tracks the state of one task during a run.
#[derive(Debug)]
pub(crate) struct TaskProgress {
    name: String,
    state: TaskState,
}

impl TaskProgress {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: TaskState::Pending,
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`; an invalid transition is an internal error.
    pub(crate) fn advance(&mut self, next: TaskState) -> StrataResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(StrataError::internal(format!(
                "task '{}' cannot move from {} to {next}",
                self.name, self.state
            )));
        }
        debug!("task '{}': {} -> {next}", self.name, self.state);
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut progress = TaskProgress::new("t");
        for next in [
            TaskState::ResolvingInputs,
            TaskState::Partitioning,
            TaskState::Executing,
            TaskState::Completed,
        ] {
            progress.advance(next).unwrap();
        }
        assert_eq!(progress.state(), TaskState::Completed);
        assert!(progress.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TaskState::Completed, TaskState::Failed] {
            for next in [TaskState::Pending, TaskState::Executing, TaskState::Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_invalid_transition() {
        let mut progress = TaskProgress::new("t");
        let err = progress.advance(TaskState::Executing).unwrap_err();
        assert!(matches!(err, StrataError::InternalError(_)));
        assert_eq!(progress.state(), TaskState::Pending);
    }

    #[test]
    fn test_retry_and_abort() {
        assert!(TaskState::Executing.can_transition_to(TaskState::ResolvingInputs));
        assert!(TaskState::Pending.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Completed));
    }
}
