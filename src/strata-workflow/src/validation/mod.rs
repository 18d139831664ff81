//! Whole-graph validation performed by `WorkflowBuilder::finalize`.

pub mod contract;
pub mod structural;

use common_error::{StrataError, StrataResult};
use strata_core::Schema;

pub use contract::ContractIssue;
pub use structural::StructuralIssue;

use crate::task::{GraphId, Task, TaskId};

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fail with `UnknownTaskError` when a reservation was never defined, or
/// `GraphError` listing every other structural issue.
pub(crate) fn check_structure(graph: GraphId, slots: &[Option<Task>]) -> StrataResult<()> {
    let issues = structural::validate(graph, slots);
    if issues.is_empty() {
        return Ok(());
    }
    if issues.iter().any(StructuralIssue::is_undefined) {
        Err(StrataError::unknown_task(join(&issues)))
    } else {
        Err(StrataError::graph(join(&issues)))
    }
}

/// Propagate schemas, failing with one `SchemaContractError` that lists every
/// violation, or `PartitionError` when only partition specs are at fault.
pub(crate) fn check_contracts(tasks: &[Task], order: &[TaskId]) -> StrataResult<Vec<Option<Schema>>> {
    contract::propagate(tasks, order).map_err(|issues| {
        let count = issues.len();
        if issues.iter().any(ContractIssue::is_schema) {
            StrataError::contract(format!("{count} violation(s): {}", join(&issues)))
        } else {
            StrataError::partition(format!("{count} invalid partition spec(s): {}", join(&issues)))
        }
    })
}
