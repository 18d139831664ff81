//! Workflow graphs for Strata.
//!
//! A workflow is a directed acyclic graph of tasks over DataFrames. It is
//! declared with a [`WorkflowBuilder`] and frozen into a [`WorkflowDag`] by
//! [`WorkflowBuilder::finalize`], which validates the whole graph before any
//! engine is involved:
//!
//! - **Structure**: inputs refer to earlier tasks, input counts fit each
//!   task kind, reserved tasks are defined
//! - **Schemas**: every task's output schema is known (declared or inferred
//!   by a dry run) and satisfies each consumer's input contract
//! - **Partitioning**: every partition spec resolves against its inputs
//!
//! # Example
//!
//! ```rust,ignore
//! let mut builder = WorkflowBuilder::new();
//! let t1 = builder.add_task(TaskSpec::create(CreateData::new(source)))?;
//! let t2 = builder.add_task(
//!     TaskSpec::transform(upper)
//!         .input(t1)
//!         .partition(PartitionSpec::by_keys(["id"]).with_num_partitions(2)),
//! )?;
//! builder.add_task(TaskSpec::output(SinkOutput::new(sink)).input(t2))?;
//! let dag = builder.finalize()?;
//! println!("{}", dag.explain());
//! ```

mod builder;
mod dag;
pub mod task;
pub mod validation;

pub use builder::WorkflowBuilder;
pub use dag::WorkflowDag;
pub use task::{
    CreateData, Creator, GraphId, Join, JoinType, Outputter, Processor, SinkOutput, Task,
    TaskBody, TaskId, TaskInput, TaskKind, TaskSpec, UnionAll,
};
