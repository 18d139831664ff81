//! Structural validation of a workflow before schema propagation.

use std::fmt;

use crate::task::{GraphId, Task, TaskId, TaskKind};

/// A structural problem in a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralIssue {
    /// The workflow has no tasks.
    EmptyWorkflow,

    /// A reserved task was never defined.
    UndefinedTask {
        /// The reserved id.
        id: TaskId,
    },

    /// A task has the wrong number of inputs for its kind.
    InvalidArity {
        /// Task name.
        task: String,
        /// Body kind.
        kind: TaskKind,
        /// Accepted input counts.
        expected: &'static str,
        /// Actual input count.
        actual: usize,
    },

    /// An output task requests something only producing tasks can do.
    OutputFlag {
        /// Task name.
        task: String,
        /// The offending setting.
        flag: &'static str,
    },
}

impl StructuralIssue {
    /// Whether this issue is a missing definition rather than a malformed task.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::UndefinedTask { .. })
    }
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "workflow has no tasks"),
            Self::UndefinedTask { id } => write!(f, "{id} was reserved but never defined"),
            Self::InvalidArity {
                task,
                kind,
                expected,
                actual,
            } => write!(
                f,
                "{kind} task '{task}' takes {expected}, got {actual}"
            ),
            Self::OutputFlag { task, flag } => {
                write!(f, "output task '{task}' produces no data and cannot {flag}")
            }
        }
    }
}

/// Collect every structural issue of the declared slots of graph `graph`.
pub fn validate(graph: GraphId, slots: &[Option<Task>]) -> Vec<StructuralIssue> {
    let mut issues = Vec::new();
    if slots.is_empty() {
        issues.push(StructuralIssue::EmptyWorkflow);
    }
    for task in slots.iter().flatten() {
        validate_task(task, &mut issues);
    }
    for (index, slot) in slots.iter().enumerate() {
        if slot.is_none() {
            issues.push(StructuralIssue::UndefinedTask {
                id: TaskId::new(graph, index),
            });
        }
    }
    issues
}

fn validate_task(task: &Task, issues: &mut Vec<StructuralIssue>) {
    let actual = task.inputs.len();
    let (ok, expected) = match task.kind() {
        TaskKind::Create => (actual == 0, "no inputs"),
        TaskKind::Transform => (actual == 1, "exactly one input"),
        TaskKind::Process | TaskKind::Output => (actual >= 1, "at least one input"),
    };
    if !ok {
        issues.push(StructuralIssue::InvalidArity {
            task: task.name.clone(),
            kind: task.kind(),
            expected,
            actual,
        });
    }

    if task.kind() == TaskKind::Output {
        let flags = [
            (task.persist.is_some(), "be persisted"),
            (task.broadcast, "be broadcast"),
            (task.checkpoint, "be checkpointed"),
            (task.yield_result, "yield a result"),
            (task.declared_schema.is_some(), "declare an output schema"),
        ];
        for (set, flag) in flags {
            if set {
                issues.push(StructuralIssue::OutputFlag {
                    task: task.name.clone(),
                    flag,
                });
            }
        }
    }
}
