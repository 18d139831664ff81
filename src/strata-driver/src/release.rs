//! Reference-counted ownership of intermediate frames.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use strata_engine::{DataFrame, FrameId};
use strata_workflow::{Task, TaskId, WorkflowDag};

/// A frame ready for `unpersist`, with every task whose output it was.
#[derive(Debug)]
pub(crate) struct Release {
    pub(crate) tasks: Vec<TaskId>,
    pub(crate) df: DataFrame,
}

/// Holds every produced frame until its last consumer has run.
///
/// Each frame starts with one reference per distinct consuming task. A frame
/// whose count reaches zero is handed back for release, unless its task
/// yields its result, in which case the frame is kept for the caller.
///
/// Engines free storage per frame id, and a task may hand its input on
/// unchanged. A frame is therefore only handed back once no other held
/// frame shares its id; until then its task waits in `deferred`.
#[derive(Debug)]
pub(crate) struct FrameRegistry {
    frames: HashMap<TaskId, DataFrame>,
    remaining: HashMap<TaskId, usize>,
    yielded: HashSet<TaskId>,
    deferred: HashMap<FrameId, Vec<TaskId>>,
}

impl FrameRegistry {
    pub(crate) fn new(dag: &WorkflowDag) -> Self {
        let mut remaining = HashMap::new();
        let mut yielded = HashSet::new();
        for task in dag.tasks() {
            remaining.insert(task.id(), dag.consumers(task.id()).len());
            if task.is_yielded() {
                yielded.insert(task.id());
            }
        }
        Self {
            frames: HashMap::new(),
            remaining,
            yielded,
            deferred: HashMap::new(),
        }
    }

    /// Turn a frame no longer needed by `id` into a release, or defer it
    /// while another held frame still shares its storage.
    fn hand_back(&mut self, id: TaskId, df: DataFrame) -> Option<Release> {
        if self.frames.values().any(|held| held.id() == df.id()) {
            debug!("output of {id} shares {} with a held frame, deferring release", df.id());
            self.deferred.entry(df.id()).or_default().push(id);
            return None;
        }
        let mut tasks = self.deferred.remove(&df.id()).unwrap_or_default();
        tasks.push(id);
        Some(Release { tasks, df })
    }

    /// Record the output of `id`. Returns the frame back when nothing will
    /// ever consume it and it is not yielded.
    pub(crate) fn insert(&mut self, id: TaskId, df: DataFrame) -> Option<Release> {
        let unused = self.remaining.get(&id).copied().unwrap_or(0) == 0;
        if unused && !self.yielded.contains(&id) {
            return self.hand_back(id, df);
        }
        self.frames.insert(id, df);
        None
    }

    /// Output of `id`, if it is held.
    pub(crate) fn get(&self, id: TaskId) -> Option<&DataFrame> {
        self.frames.get(&id)
    }

    /// Drop one reference from each distinct input of `consumer`, which has
    /// reached a terminal state. Returns the frames that are no longer needed.
    pub(crate) fn consumed(&mut self, consumer: &Task) -> Vec<Release> {
        let mut producers: Vec<TaskId> = consumer.input_ids().collect();
        producers.sort();
        producers.dedup();

        let mut released = Vec::new();
        for producer in producers {
            let Some(count) = self.remaining.get_mut(&producer) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count == 0 && !self.yielded.contains(&producer) {
                if let Some(release) = self
                    .frames
                    .remove(&producer)
                    .and_then(|df| self.hand_back(producer, df))
                {
                    released.push(release);
                }
            }
        }
        released
    }

    /// Every frame still held that is not yielded, in task order.
    pub(crate) fn drain_unyielded(&mut self) -> Vec<Release> {
        let mut ids: Vec<TaskId> = self
            .frames
            .keys()
            .filter(|id| !self.yielded.contains(id))
            .copied()
            .collect();
        ids.sort();
        let mut released = Vec::new();
        for id in ids {
            if let Some(release) = self.frames.remove(&id).and_then(|df| self.hand_back(id, df)) {
                released.push(release);
            }
        }
        released
    }

    /// Yielded frames by task name.
    pub(crate) fn take_yielded(&mut self, dag: &WorkflowDag) -> BTreeMap<String, DataFrame> {
        let mut out = BTreeMap::new();
        for id in self.yielded.iter() {
            if let (Some(df), Ok(task)) = (self.frames.remove(id), dag.task(*id)) {
                out.insert(task.name().to_string(), df);
            }
        }
        out
    }
}
