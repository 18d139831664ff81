//! Schema propagation and contract checks.
//!
//! Output schemas are propagated through the graph in topological order:
//! - a task's output schema is the declared one, or the one inferred by a
//!   dry run of its body when nothing is declared
//! - a declared schema that disagrees with the inferred one is a violation
//! - every input slot's contract must accept its producer's schema
//! - the task's partition spec must resolve against every input schema

use std::fmt;

use common_error::{StrataError, StrataResult};
use log::debug;
use strata_core::Schema;

use crate::task::{Task, TaskBody, TaskId};

/// A contract problem found during propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractIssue {
    /// Producer and consumer schemas disagree.
    Schema {
        /// Task name.
        task: String,
        /// What went wrong.
        message: String,
    },
    /// The task's partition spec does not fit an input.
    Partition {
        /// Task name.
        task: String,
        /// What went wrong.
        message: String,
    },
}

impl ContractIssue {
    fn schema(task: &Task, message: impl Into<String>) -> Self {
        Self::Schema {
            task: task.name.clone(),
            message: message.into(),
        }
    }

    /// Whether this is a schema contract violation.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }
}

impl fmt::Display for ContractIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { task, message } | Self::Partition { task, message } => {
                write!(f, "task '{task}': {message}")
            }
        }
    }
}

/// Compute the output schema of every task, indexed by task index.
///
/// Output tasks and tasks downstream of an unknown schema get `None`.
pub fn propagate(tasks: &[Task], order: &[TaskId]) -> Result<Vec<Option<Schema>>, Vec<ContractIssue>> {
    let mut schemas: Vec<Option<Schema>> = vec![None; tasks.len()];
    let mut issues = Vec::new();

    for id in order {
        let task = &tasks[id.index()];
        let inputs: Option<Vec<Schema>> = task
            .inputs
            .iter()
            .map(|input| schemas[input.task.index()].clone())
            .collect();
        // An upstream problem was already reported.
        let Some(inputs) = inputs else {
            continue;
        };

        check_inputs(task, &inputs, &mut issues);
        schemas[id.index()] = output_schema(task, &inputs, &mut issues);
    }

    if issues.is_empty() {
        Ok(schemas)
    } else {
        Err(issues)
    }
}

fn check_inputs(task: &Task, inputs: &[Schema], issues: &mut Vec<ContractIssue>) {
    for (slot, schema) in inputs.iter().enumerate() {
        let producer = task.inputs[slot].task;
        if let Some(violation) = task.input_contract(slot).and_then(|c| c.violation(schema)) {
            issues.push(ContractIssue::schema(
                task,
                format!("input {slot} from {producer}: {violation}"),
            ));
        }
        if let TaskBody::Transform(transformer) = &task.body {
            if let Some(violation) = transformer.input_contract().and_then(|c| c.violation(schema)) {
                issues.push(ContractIssue::schema(
                    task,
                    format!("{} rejects input from {producer}: {violation}", transformer.name()),
                ));
            }
        }
        if !task.partition.is_unspecified() {
            if let Err(e) = task.partition.resolve(schema) {
                issues.push(ContractIssue::Partition {
                    task: task.name.clone(),
                    message: format!("input {slot} from {producer}: {e}"),
                });
            }
        }
    }
}

fn output_schema(task: &Task, inputs: &[Schema], issues: &mut Vec<ContractIssue>) -> Option<Schema> {
    let inferred: StrataResult<Option<Schema>> = match &task.body {
        TaskBody::Output(_) => return None,
        TaskBody::Create(creator) => creator.output_schema().map(Some),
        TaskBody::Transform(transformer) => transformer.output_schema(&inputs[0]).map(Some),
        TaskBody::Process(processor) => processor.output_schema(inputs),
    };

    match (task.declared_schema.as_ref(), inferred) {
        (Some(declared), Ok(Some(inferred))) => {
            if declared.is_compatible_with(&inferred) {
                Some(inferred)
            } else {
                issues.push(ContractIssue::schema(
                    task,
                    format!("declares output [{declared}] but produces [{inferred}]"),
                ));
                None
            }
        }
        (Some(declared), Ok(None)) => Some(declared.clone()),
        (Some(declared), Err(e)) if !matches!(e, StrataError::SchemaContractError(_)) => {
            debug!(
                "dry run of '{}' failed ({e}); trusting declared output [{declared}]",
                task.name
            );
            Some(declared.clone())
        }
        (None, Ok(Some(inferred))) => Some(inferred),
        (None, Ok(None)) => {
            issues.push(ContractIssue::schema(
                task,
                "declares no output schema and none can be inferred",
            ));
            None
        }
        (_, Err(e)) => {
            issues.push(ContractIssue::schema(
                task,
                format!("cannot determine output schema: {e}"),
            ));
            None
        }
    }
}
