//! Incremental workflow construction.

use std::collections::HashMap;

use common_error::{StrataError, StrataResult};
use log::debug;
use strata_core::SchemaContract;

use crate::dag::WorkflowDag;
use crate::task::{GraphId, Task, TaskId, TaskKind, TaskSpec};
use crate::validation;

/// Builds a [`WorkflowDag`] one task at a time.
///
/// Inputs must refer to tasks that are already defined, so the graph is
/// acyclic by construction. A task can be declared ahead of its definition
/// with [`reserve`](Self::reserve); referencing it before
/// [`define`](Self::define) is a `CyclicDependencyError`.
#[derive(Debug)]
pub struct WorkflowBuilder {
    graph: GraphId,
    slots: Vec<Option<Task>>,
    names: HashMap<String, TaskId>,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            graph: GraphId::next(),
            slots: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Number of declared tasks, reserved ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether no task has been declared.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Id of the task called `name`.
    pub fn task_id(&self, name: &str) -> Option<TaskId> {
        self.names.get(name).copied()
    }

    /// Add a task and return its id.
    ///
    /// Fails with `UnknownTaskError` for an input id this builder never
    /// issued, `CyclicDependencyError` for an input that is reserved but not
    /// yet defined, `GraphError` for an input that is an output task, and
    /// `InvalidParameter` for a duplicate name or a contract on a missing
    /// input slot.
    pub fn add_task(&mut self, spec: TaskSpec) -> StrataResult<TaskId> {
        let id = TaskId::new(self.graph, self.slots.len());
        let task = self.build_task(id, spec)?;
        self.slots.push(None);
        self.install(task);
        Ok(id)
    }

    /// Declare a task to be defined later.
    pub fn reserve(&mut self) -> TaskId {
        let id = TaskId::new(self.graph, self.slots.len());
        self.slots.push(None);
        id
    }

    /// Define a previously reserved task.
    pub fn define(&mut self, id: TaskId, spec: TaskSpec) -> StrataResult<()> {
        self.check_issued(id)?;
        if self.slots[id.index()].is_some() {
            return Err(StrataError::invalid_parameter(format!(
                "{id} is already defined"
            )));
        }
        let task = self.build_task(id, spec)?;
        self.install(task);
        Ok(())
    }

    /// Validate the whole graph and freeze it.
    ///
    /// Structural problems (undefined reservations, wrong input counts,
    /// output flags on output tasks) fail first. Then output schemas are
    /// propagated through the graph; every schema contract violation is
    /// collected and reported together in one `SchemaContractError`.
    pub fn finalize(self) -> StrataResult<WorkflowDag> {
        validation::check_structure(self.graph, &self.slots)?;
        let tasks: Vec<Task> = self.slots.into_iter().flatten().collect();
        let dag = WorkflowDag::new(self.graph, tasks)?;
        debug!("finalized workflow with {} tasks", dag.len());
        Ok(dag)
    }

    fn install(&mut self, task: Task) {
        debug!("declared {} '{}' ({})", task.id, task.name, task.kind());
        self.names.insert(task.name.clone(), task.id);
        let index = task.id.index();
        self.slots[index] = Some(task);
    }

    fn check_issued(&self, id: TaskId) -> StrataResult<()> {
        if id.graph() != self.graph {
            return Err(StrataError::unknown_task(format!(
                "{id} belongs to another workflow"
            )));
        }
        if id.index() >= self.slots.len() {
            return Err(StrataError::unknown_task(format!("{id} was never declared")));
        }
        Ok(())
    }

    fn check_input(&self, task: TaskId, input: TaskId) -> StrataResult<()> {
        self.check_issued(input)?;
        match &self.slots[input.index()] {
            None => Err(StrataError::cyclic(format!(
                "{task} depends on {input}, which is not defined yet"
            ))),
            Some(producer) if producer.kind() == TaskKind::Output => {
                Err(StrataError::graph(format!(
                    "{task} depends on output task '{}', which produces no data",
                    producer.name
                )))
            }
            Some(_) => Ok(()),
        }
    }

    fn build_task(&self, id: TaskId, spec: TaskSpec) -> StrataResult<Task> {
        for input in &spec.inputs {
            self.check_input(id, input.task)?;
        }

        let name = spec
            .name
            .unwrap_or_else(|| format!("{}_{}", spec.body.kind(), id.index()));
        if self.names.contains_key(&name) {
            return Err(StrataError::invalid_parameter(format!(
                "duplicate task name '{name}'"
            )));
        }

        let mut input_contracts: Vec<Option<SchemaContract>> = vec![None; spec.inputs.len()];
        for (slot, contract) in spec.input_contracts {
            let entry = input_contracts.get_mut(slot).ok_or_else(|| {
                StrataError::invalid_parameter(format!(
                    "task '{name}' has {} inputs but declares a contract on slot {slot}",
                    spec.inputs.len()
                ))
            })?;
            *entry = Some(contract);
        }

        Ok(Task {
            id,
            name,
            body: spec.body,
            inputs: spec.inputs,
            partition: spec.partition,
            declared_schema: spec.output_schema,
            input_contracts,
            deterministic: spec.deterministic,
            persist: spec.persist,
            broadcast: spec.broadcast,
            checkpoint: spec.checkpoint,
            yield_result: spec.yield_result,
            fingerprint: 0,
        })
    }
}
