//! The workflow driver.

use std::collections::HashSet;
use std::sync::Arc;

use common_error::{StrataError, StrataResult};
use log::{debug, info, warn};
use strata_engine::{DataFrame, DataFrames, ExecutionEngine, ExecutionTimer, PersistLevel};
use strata_workflow::{Task, TaskBody, TaskId, WorkflowDag};

use crate::options::RunOptions;
use crate::release::{FrameRegistry, Release};
use crate::result::{RunResult, TaskFailure, TaskReport};
use crate::state::{TaskProgress, TaskState};

/// Runs finalized workflows against one bound engine.
///
/// Tasks run one at a time in topological order; each producer completes,
/// side effects included, before any of its consumers starts. All data
/// parallelism happens inside the engine.
#[derive(Debug, Clone)]
pub struct Driver {
    engine: Arc<dyn ExecutionEngine>,
}

impl Driver {
    /// Bind `engine`.
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { engine }
    }

    /// The bound engine.
    pub fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.engine
    }

    /// Run `dag` to completion or first failure.
    ///
    /// Returns `Err` only when the options do not fit the graph; this is
    /// checked before any engine call. Task failures are reported in the
    /// [`RunResult`].
    pub async fn run(&self, dag: &WorkflowDag, options: &RunOptions) -> StrataResult<RunResult> {
        options.validate(dag)?;
        info!(
            "running workflow of {} tasks on {} ({})",
            dag.len(),
            self.engine.name(),
            self.engine.id()
        );

        let mut registry = FrameRegistry::new(dag);
        let mut result = RunResult::default();
        let mut failed: HashSet<TaskId> = HashSet::new();
        let mut halted = false;

        for (position, &id) in dag.topological_order().iter().enumerate() {
            let task = dag.task(id)?;
            let mut progress = TaskProgress::new(task.name());
            let timer = ExecutionTimer::start();
            let mut attempts = 0;
            let mut output_rows = None;

            if let Some(bad_input) = task.input_ids().find(|i| failed.contains(i)) {
                progress.advance(TaskState::Failed)?;
                failed.insert(id);
                let input_name = dag.task(bad_input)?.name();
                result
                    .failures
                    .push(TaskFailure::upstream(id, task.name(), position, input_name));
            } else if !halted {
                let (outcome, tries) = self.execute(dag, task, options, &registry, &mut progress).await;
                attempts = tries;
                match outcome {
                    Ok(Some(df)) => {
                        output_rows = Some(df.count());
                        if let Some(unused) = registry.insert(id, df) {
                            self.release(dag, unused, &mut result).await;
                        }
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!("task '{}' failed: {error}", task.name());
                        progress.advance(TaskState::Failed)?;
                        failed.insert(id);
                        result
                            .failures
                            .push(TaskFailure::from_error(id, task.name(), position, error));
                        halted = options.fail_fast;
                    }
                }
            }

            if progress.state().is_terminal() {
                for release in registry.consumed(task) {
                    self.release(dag, release, &mut result).await;
                }
            }

            result.reports.push(TaskReport {
                id,
                name: task.name().to_string(),
                position,
                state: progress.state(),
                attempts,
                elapsed: timer.elapsed(),
                output_rows,
            });
        }

        for release in registry.drain_unyielded() {
            self.release(dag, release, &mut result).await;
        }
        result.yielded = registry.take_yielded(dag);

        info!(
            "workflow finished: {} completed, {} failed, {} released",
            result
                .reports
                .iter()
                .filter(|r| r.state == TaskState::Completed)
                .count(),
            result.failures.len(),
            result.released.len()
        );
        Ok(result)
    }

    /// Blocking variant of [`run`](Self::run). Must not be called from
    /// inside an async runtime.
    pub fn run_sync(&self, dag: &WorkflowDag, options: &RunOptions) -> StrataResult<RunResult> {
        common_runtime::block_on(self.run(dag, options))?
    }

    /// Run one task, retrying transient engine faults as the policy allows.
    async fn execute(
        &self,
        dag: &WorkflowDag,
        task: &Task,
        options: &RunOptions,
        registry: &FrameRegistry,
        progress: &mut TaskProgress,
    ) -> (StrataResult<Option<DataFrame>>, u32) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(dag, task, options, registry, progress).await {
                Ok(out) => return (Ok(out), attempts),
                Err(e) if options.retry.should_retry(task.is_deterministic(), attempts, &e) => {
                    warn!(
                        "task '{}' hit a transient fault on attempt {attempts}, retrying: {e}",
                        task.name()
                    );
                }
                Err(e) => return (Err(e), attempts),
            }
        }
    }

    async fn attempt(
        &self,
        dag: &WorkflowDag,
        task: &Task,
        options: &RunOptions,
        registry: &FrameRegistry,
        progress: &mut TaskProgress,
    ) -> StrataResult<Option<DataFrame>> {
        let engine = self.engine.as_ref();

        progress.advance(TaskState::ResolvingInputs)?;
        let mut inputs: Vec<(Option<String>, DataFrame)> = Vec::with_capacity(task.inputs().len());
        for input in task.inputs() {
            let df = registry.get(input.task).ok_or_else(|| {
                StrataError::internal(format!(
                    "output of {} is not available to task '{}'",
                    input.task,
                    task.name()
                ))
            })?;
            inputs.push((input.name.clone(), df.clone()));
        }

        progress.advance(TaskState::Partitioning)?;
        let spec = options.partition_for(task.id(), task.partition());
        if !spec.is_unspecified() {
            for (_, df) in inputs.iter_mut() {
                *df = engine.repartition(df, spec).await?;
            }
        }

        progress.advance(TaskState::Executing)?;
        let produced = match task.body() {
            TaskBody::Create(creator) => Some(creator.create(engine).await?),
            TaskBody::Transform(transformer) => {
                let (_, input) = inputs.first().ok_or_else(|| {
                    StrataError::internal(format!("task '{}' has no input", task.name()))
                })?;
                let schema = expected_schema(dag, task)?;
                Some(
                    engine
                        .map_partitions(input, transformer.clone(), schema)
                        .await?,
                )
            }
            TaskBody::Process(processor) => {
                Some(processor.process(engine, &to_frames(inputs)).await?)
            }
            TaskBody::Output(outputter) => {
                outputter.output(engine, &to_frames(inputs)).await?;
                None
            }
        };

        let produced = match produced {
            Some(df) => Some(self.finish_output(dag, task, options, df).await?),
            None => None,
        };
        if let Err(e) = progress.advance(TaskState::Completed) {
            if let Some(df) = &produced {
                self.discard(task, df).await;
            }
            return Err(e);
        }
        Ok(produced)
    }

    /// Check a produced frame and apply the task's persist, checkpoint and
    /// broadcast settings.
    ///
    /// When a later step fails, a frame this call persisted is unpersisted
    /// before the error is returned.
    async fn finish_output(
        &self,
        dag: &WorkflowDag,
        task: &Task,
        options: &RunOptions,
        df: DataFrame,
    ) -> StrataResult<DataFrame> {
        let engine = self.engine.as_ref();
        df.check_engine(engine)?;

        let expected = expected_schema(dag, task)?;
        if !df.schema().is_compatible_with(expected) {
            return Err(StrataError::contract(format!(
                "task '{}' produced [{}] but [{expected}] was validated",
                task.name(),
                df.schema()
            )));
        }

        let already_persisted = df.persist_level().is_some();
        let mut df = df;
        let checkpoint_dir = match (&options.checkpoint_dir, task.is_checkpoint()) {
            (Some(dir), true) => Some(dir.join(format!("{}-{:016x}", task.name(), task.fingerprint()))),
            (None, true) => {
                warn!(
                    "task '{}' asks for a checkpoint but no checkpoint directory is set",
                    task.name()
                );
                None
            }
            (_, false) => None,
        };
        if let Some(dir) = checkpoint_dir {
            info!("checkpointing task '{}' to {}", task.name(), dir.display());
            df = engine.persist(&df, PersistLevel::Disk(dir)).await?;
        } else if let Some(level) = task.persist_level() {
            df = engine.persist(&df, level.clone()).await?;
        }
        if task.is_broadcast() {
            match engine.broadcast(&df).await {
                Ok(broadcast) => df = broadcast,
                Err(e) => {
                    if !already_persisted && df.persist_level().is_some() {
                        self.discard(task, &df).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(df)
    }

    /// Unpersist the output of a failed attempt. The attempt's own error is
    /// what gets reported; a cleanup failure is logged.
    async fn discard(&self, task: &Task, df: &DataFrame) {
        match self.engine.unpersist(df).await {
            Ok(()) => debug!("discarded output {} of failed task '{}'", df.id(), task.name()),
            Err(e) => warn!("failed to discard output {} of task '{}': {e}", df.id(), task.name()),
        }
    }

    /// Unpersist a frame nobody needs any more. A failure is recorded against
    /// the task that produced it.
    async fn release(&self, dag: &WorkflowDag, release: Release, result: &mut RunResult) {
        let Release { tasks, df } = release;
        match self.engine.unpersist(&df).await {
            Ok(()) => {
                debug!("released {} (output of {} tasks)", df.id(), tasks.len());
                result.released.extend(tasks);
            }
            Err(e) => {
                let Some(&producer) = tasks.first() else {
                    return;
                };
                warn!("failed to release output of {producer}: {e}");
                let position = dag
                    .topological_order()
                    .iter()
                    .position(|t| *t == producer)
                    .unwrap_or_default();
                let name = dag.task(producer).map(|t| t.name().to_string()).unwrap_or_default();
                result
                    .failures
                    .push(TaskFailure::from_error(producer, &name, position, e));
            }
        }
    }
}

fn expected_schema<'a>(dag: &'a WorkflowDag, task: &Task) -> StrataResult<&'a strata_core::Schema> {
    dag.output_schema(task.id()).ok_or_else(|| {
        StrataError::internal(format!("task '{}' has no validated output schema", task.name()))
    })
}

fn to_frames(inputs: Vec<(Option<String>, DataFrame)>) -> DataFrames {
    let mut frames = DataFrames::new();
    for (name, df) in inputs {
        match name {
            Some(name) => frames.push_named(name, df),
            None => frames.push(df),
        }
    }
    frames
}

/// Run `dag` on `engine`. Shorthand for [`Driver::run`].
pub async fn run(
    dag: &WorkflowDag,
    engine: Arc<dyn ExecutionEngine>,
    options: &RunOptions,
) -> StrataResult<RunResult> {
    Driver::new(engine).run(dag, options).await
}
