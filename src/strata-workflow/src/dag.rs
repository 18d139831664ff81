//! The finalized workflow graph.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use common_display::{DisplayTree, TreeNode};
use common_error::{StrataError, StrataResult};
use serde_json::json;
use strata_core::Schema;

use crate::task::{GraphId, Task, TaskId};
use crate::validation;

/// An immutable, validated, acyclic graph of tasks.
///
/// Built by [`WorkflowBuilder::finalize`](crate::WorkflowBuilder::finalize).
/// Every task's output schema is known, every input contract holds and every
/// partition spec resolves against its inputs.
#[derive(Debug, Clone)]
pub struct WorkflowDag {
    graph: GraphId,
    tasks: Vec<Task>,
    order: Vec<TaskId>,
    positions: Vec<usize>,
    schemas: Vec<Option<Schema>>,
    consumers: Vec<Vec<TaskId>>,
}

impl WorkflowDag {
    pub(crate) fn new(graph: GraphId, mut tasks: Vec<Task>) -> StrataResult<Self> {
        let consumers = consumers_of(&tasks);
        let order = topological_order(&tasks, &consumers)?;
        let schemas = validation::check_contracts(&tasks, &order)?;

        for id in &order {
            let fingerprint = fingerprint_of(&tasks, &tasks[id.index()]);
            tasks[id.index()].fingerprint = fingerprint;
        }

        let mut positions = vec![0; tasks.len()];
        for (position, id) in order.iter().enumerate() {
            positions[id.index()] = position;
        }

        Ok(Self {
            graph,
            tasks,
            order,
            positions,
            schemas,
            consumers,
        })
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks, in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Check whether `id` belongs to this graph.
    pub fn contains(&self, id: TaskId) -> bool {
        id.graph() == self.graph && id.index() < self.tasks.len()
    }

    /// The task with id `id`. Fails with `UnknownTaskError` for an id of
    /// another graph.
    pub fn task(&self, id: TaskId) -> StrataResult<&Task> {
        if self.contains(id) {
            Ok(&self.tasks[id.index()])
        } else {
            Err(StrataError::unknown_task(format!(
                "{id} is not part of this workflow"
            )))
        }
    }

    /// The task called `name`.
    pub fn task_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    /// Task ids in execution order: producers before consumers, ties broken
    /// by declaration order.
    pub fn topological_order(&self) -> &[TaskId] {
        &self.order
    }

    /// Position of `id` in [`topological_order`](Self::topological_order).
    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.contains(id).then(|| self.positions[id.index()])
    }

    /// Distinct tasks consuming the output of `id`.
    pub fn consumers(&self, id: TaskId) -> &[TaskId] {
        if self.contains(id) {
            &self.consumers[id.index()]
        } else {
            &[]
        }
    }

    /// Output schema of `id`; `None` for output tasks.
    pub fn output_schema(&self, id: TaskId) -> Option<&Schema> {
        if self.contains(id) {
            self.schemas[id.index()].as_ref()
        } else {
            None
        }
    }

    /// Tasks nothing depends on, in declaration order.
    pub fn terminal_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| self.consumers[t.id().index()].is_empty())
    }

    /// Render the graph as a forest rooted at its terminal tasks.
    pub fn explain(&self) -> String {
        let roots: Vec<ExplainNode> = self
            .terminal_tasks()
            .map(|t| ExplainNode::build(self, t))
            .collect();
        let refs: Vec<&dyn TreeNode> = roots.iter().map(|n| n as &dyn TreeNode).collect();
        DisplayTree::forest(refs).to_string()
    }
}

// =============================================================================
// Graph helpers
// =============================================================================

fn consumers_of(tasks: &[Task]) -> Vec<Vec<TaskId>> {
    let mut consumers: Vec<Vec<TaskId>> = vec![Vec::new(); tasks.len()];
    for task in tasks {
        for producer in task.input_ids() {
            let list = &mut consumers[producer.index()];
            if !list.contains(&task.id()) {
                list.push(task.id());
            }
        }
    }
    consumers
}

/// Kahn's algorithm, always picking the lowest ready index.
fn topological_order(tasks: &[Task], consumers: &[Vec<TaskId>]) -> StrataResult<Vec<TaskId>> {
    let mut pending: Vec<usize> = tasks
        .iter()
        .map(|t| {
            let mut producers: Vec<TaskId> = t.input_ids().collect();
            producers.sort();
            producers.dedup();
            producers.len()
        })
        .collect();
    let mut ready: BTreeSet<usize> = (0..tasks.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(index) = ready.pop_first() {
        order.push(tasks[index].id());
        for consumer in &consumers[index] {
            let count = &mut pending[consumer.index()];
            *count -= 1;
            if *count == 0 {
                ready.insert(consumer.index());
            }
        }
    }

    if order.len() != tasks.len() {
        return Err(StrataError::cyclic(
            "workflow contains a dependency cycle",
        ));
    }
    Ok(order)
}

fn fingerprint_of(tasks: &[Task], task: &Task) -> u64 {
    let inputs: Vec<serde_json::Value> = task
        .inputs()
        .iter()
        .map(|input| {
            json!({
                "name": input.name,
                "fingerprint": tasks[input.task.index()].fingerprint(),
            })
        })
        .collect();
    let description = json!({
        "name": task.name(),
        "kind": task.kind().as_str(),
        "body": task.body().name(),
        "inputs": inputs,
        "partition": task.partition().to_string(),
        "schema": task.declared_schema().map(ToString::to_string),
        "deterministic": task.is_deterministic(),
        "persist": task.persist_level().map(ToString::to_string),
        "broadcast": task.is_broadcast(),
        "checkpoint": task.is_checkpoint(),
        "yield": task.is_yielded(),
    });
    let mut hasher = DefaultHasher::new();
    description.to_string().hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Explain
// =============================================================================

struct ExplainNode {
    label: String,
    details: Option<String>,
    children: Vec<ExplainNode>,
}

impl ExplainNode {
    fn build(dag: &WorkflowDag, task: &Task) -> Self {
        let mut details = Vec::new();
        if let Some(schema) = dag.output_schema(task.id()) {
            details.push(format!("[{schema}]"));
        }
        if !task.partition().is_unspecified() {
            details.push(format!("partition: {}", task.partition()));
        }
        if !task.is_deterministic() {
            details.push("non-deterministic".to_string());
        }
        if let Some(level) = task.persist_level() {
            details.push(format!("persist: {level}"));
        }
        if task.is_broadcast() {
            details.push("broadcast".to_string());
        }
        if task.is_checkpoint() {
            details.push("checkpoint".to_string());
        }
        if task.is_yielded() {
            details.push("yield".to_string());
        }

        Self {
            label: format!("{} {}: {}", task.kind(), task.name(), task.body().name()),
            details: (!details.is_empty()).then(|| details.join(", ")),
            children: task
                .input_ids()
                .map(|id| Self::build(dag, &dag.tasks[id.index()]))
                .collect(),
        }
    }
}

impl TreeNode for ExplainNode {
    fn name(&self) -> &str {
        &self.label
    }

    fn children(&self) -> Vec<&dyn TreeNode> {
        self.children.iter().map(|c| c as &dyn TreeNode).collect()
    }

    fn details(&self) -> Option<String> {
        self.details.clone()
    }
}
