//! Workflow tasks.

mod body;
mod spec;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_core::{PartitionSpec, Schema, SchemaContract};
use strata_engine::{PersistLevel, Transformer};

pub use body::{
    CreateData, Creator, Join, JoinType, Outputter, Processor, SinkOutput, UnionAll,
};
pub use spec::TaskSpec;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the builder (and thus the graph) a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        Self(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifies a task within one workflow.
///
/// Ids are handed out by [`WorkflowBuilder`](crate::WorkflowBuilder) and are
/// only meaningful for the builder that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    graph: GraphId,
    index: usize,
}

impl TaskId {
    pub(crate) fn new(graph: GraphId, index: usize) -> Self {
        Self { graph, index }
    }

    /// Position of the task in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The graph this id belongs to.
    pub fn graph(&self) -> GraphId {
        self.graph
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.index)
    }
}

/// One input slot of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    /// Producing task.
    pub task: TaskId,
    /// Optional name under which the frame is passed to the body.
    pub name: Option<String>,
}

/// The four kinds of task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Zero inputs, produces a frame.
    Create,
    /// Per-partition map over one input.
    Transform,
    /// Whole-frame map over one or more inputs.
    Process,
    /// Side effect over one or more inputs; produces nothing.
    Output,
}

impl TaskKind {
    /// Lowercase name, used for default task names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Transform => "transform",
            Self::Process => "process",
            Self::Output => "output",
        }
    }

    /// Whether tasks of this kind produce a frame.
    pub fn produces_output(&self) -> bool {
        !matches!(self, Self::Output)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The function a task runs.
#[derive(Clone)]
pub enum TaskBody {
    /// Ingest data into the engine.
    Create(Arc<dyn Creator>),
    /// Apply a function to each partition of the single input.
    Transform(Arc<dyn Transformer>),
    /// Compute a new frame from whole input frames.
    Process(Arc<dyn Processor>),
    /// Write the inputs somewhere.
    Output(Arc<dyn Outputter>),
}

impl TaskBody {
    /// Body kind.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Create(_) => TaskKind::Create,
            Self::Transform(_) => TaskKind::Transform,
            Self::Process(_) => TaskKind::Process,
            Self::Output(_) => TaskKind::Output,
        }
    }

    /// Name of the wrapped function.
    pub fn name(&self) -> &str {
        match self {
            Self::Create(c) => c.name(),
            Self::Transform(t) => t.name(),
            Self::Process(p) => p.name(),
            Self::Output(o) => o.name(),
        }
    }
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.name())
    }
}

/// A task of a workflow. Immutable once the workflow is finalized.
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) body: TaskBody,
    pub(crate) inputs: Vec<TaskInput>,
    pub(crate) partition: PartitionSpec,
    pub(crate) declared_schema: Option<Schema>,
    pub(crate) input_contracts: Vec<Option<SchemaContract>>,
    pub(crate) deterministic: bool,
    pub(crate) persist: Option<PersistLevel>,
    pub(crate) broadcast: bool,
    pub(crate) checkpoint: bool,
    pub(crate) yield_result: bool,
    pub(crate) fingerprint: u64,
}

impl Task {
    /// Task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Unique task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task body.
    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    /// Body kind.
    pub fn kind(&self) -> TaskKind {
        self.body.kind()
    }

    /// Input slots, in order.
    pub fn inputs(&self) -> &[TaskInput] {
        &self.inputs
    }

    /// Producing tasks, in input order.
    pub fn input_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.inputs.iter().map(|i| i.task)
    }

    /// Distribution required of the inputs before the body runs.
    pub fn partition(&self) -> &PartitionSpec {
        &self.partition
    }

    /// Output schema declared by the user, if any.
    pub fn declared_schema(&self) -> Option<&Schema> {
        self.declared_schema.as_ref()
    }

    /// Contract on input slot `slot`, if one was declared.
    pub fn input_contract(&self, slot: usize) -> Option<&SchemaContract> {
        self.input_contracts.get(slot).and_then(Option::as_ref)
    }

    /// Whether rerunning the task yields the same output.
    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Requested persistence of the output.
    pub fn persist_level(&self) -> Option<&PersistLevel> {
        self.persist.as_ref()
    }

    /// Whether the output should be broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Whether the output should be checkpointed to disk.
    pub fn is_checkpoint(&self) -> bool {
        self.checkpoint
    }

    /// Whether the output is returned to the caller of the run.
    pub fn is_yielded(&self) -> bool {
        self.yield_result
    }

    /// Stable hash of the task's definition and of everything upstream of it.
    ///
    /// Zero until the workflow is finalized.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}
