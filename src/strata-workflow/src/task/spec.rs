//! Task declarations.

use std::sync::Arc;

use strata_core::{PartitionSpec, Schema, SchemaContract};
use strata_engine::{PersistLevel, Transformer};

use super::{Creator, Outputter, Processor, TaskBody, TaskId, TaskInput};

/// Declaration of a task, handed to
/// [`WorkflowBuilder::add_task`](crate::WorkflowBuilder::add_task).
///
/// # Example
///
/// ```rust,ignore
/// let t2 = builder.add_task(
///     TaskSpec::transform(upper)
///         .name("upper")
///         .input(t1)
///         .partition(PartitionSpec::by_keys(["id"]).with_num_partitions(2)),
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub(crate) name: Option<String>,
    pub(crate) body: TaskBody,
    pub(crate) inputs: Vec<TaskInput>,
    pub(crate) partition: PartitionSpec,
    pub(crate) output_schema: Option<Schema>,
    pub(crate) input_contracts: Vec<(usize, SchemaContract)>,
    pub(crate) deterministic: bool,
    pub(crate) persist: Option<PersistLevel>,
    pub(crate) broadcast: bool,
    pub(crate) checkpoint: bool,
    pub(crate) yield_result: bool,
}

impl TaskSpec {
    /// Task running `body`.
    pub fn new(body: TaskBody) -> Self {
        Self {
            name: None,
            body,
            inputs: Vec::new(),
            partition: PartitionSpec::unspecified(),
            output_schema: None,
            input_contracts: Vec::new(),
            deterministic: true,
            persist: None,
            broadcast: false,
            checkpoint: false,
            yield_result: false,
        }
    }

    /// Ingestion task.
    pub fn create(creator: impl Creator + 'static) -> Self {
        Self::new(TaskBody::Create(Arc::new(creator)))
    }

    /// Per-partition map task.
    pub fn transform(transformer: impl Transformer + 'static) -> Self {
        Self::new(TaskBody::Transform(Arc::new(transformer)))
    }

    /// Whole-frame map task.
    pub fn process(processor: impl Processor + 'static) -> Self {
        Self::new(TaskBody::Process(Arc::new(processor)))
    }

    /// Output task.
    pub fn output(outputter: impl Outputter + 'static) -> Self {
        Self::new(TaskBody::Output(Arc::new(outputter)))
    }

    /// Set a unique task name. Unnamed tasks are called `<kind>_<index>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append an input slot fed by `task`.
    pub fn input(mut self, task: TaskId) -> Self {
        self.inputs.push(TaskInput { task, name: None });
        self
    }

    /// Append a named input slot fed by `task`.
    pub fn named_input(mut self, name: impl Into<String>, task: TaskId) -> Self {
        self.inputs.push(TaskInput {
            task,
            name: Some(name.into()),
        });
        self
    }

    /// Require the inputs to be distributed as `spec` before the body runs.
    pub fn partition(mut self, spec: PartitionSpec) -> Self {
        self.partition = spec;
        self
    }

    /// Declare the output schema.
    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Require input slot `slot` to satisfy `contract`.
    pub fn expect_input(mut self, slot: usize, contract: SchemaContract) -> Self {
        self.input_contracts.push((slot, contract));
        self
    }

    /// Mark the task as (non-)deterministic. Tasks are deterministic unless
    /// marked otherwise; only non-deterministic tasks are retried.
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Persist the output at `level`.
    pub fn persist(mut self, level: PersistLevel) -> Self {
        self.persist = Some(level);
        self
    }

    /// Broadcast the output to every worker.
    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Checkpoint the output under the run's checkpoint directory.
    pub fn checkpoint(mut self) -> Self {
        self.checkpoint = true;
        self
    }

    /// Return the output frame to the caller of the run.
    pub fn yield_result(mut self) -> Self {
        self.yield_result = true;
        self
    }
}
