//! Integration tests for workflow runs on the local engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use arrow::array::{AsArray, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
use async_trait::async_trait;

use common_error::{ErrorCategory, StrataError, StrataResult};
use strata_core::{PartitionSpec, Schema, TypeMapping, Value};
use strata_driver::{Driver, RetryPolicy, RunOptions, TaskState, run};
use strata_engine::{
    DataFrame, DataFrames, EngineId, EngineMetrics, ExecutionEngine, LocalEngine, LocalEngineConfig,
    MemoryManager, MemorySink, PersistLevel, Sink, TabularSource, Transformer, ops, transformer_fn,
};
use strata_workflow::{CreateData, Processor, SinkOutput, TaskSpec, WorkflowBuilder, WorkflowDag};

fn input_schema() -> Schema {
    "id:int,val:str".parse().unwrap()
}

fn source() -> TabularSource {
    let rows = [(1, "a"), (2, "b"), (3, "c")]
        .iter()
        .map(|(id, v)| vec![Value::Int(*id), Value::from(*v)])
        .collect();
    TabularSource::rows(input_schema(), rows)
}

fn engine() -> Arc<LocalEngine> {
    Arc::new(LocalEngine::new(LocalEngineConfig::default().with_parallelism(2)))
}

/// Appends `upper = upper(val)`.
fn upper() -> impl Transformer + 'static {
    transformer_fn("upper", |_, batch: RecordBatch| {
        let val = batch
            .column_by_name("val")
            .ok_or_else(|| StrataError::invalid_parameter("missing column 'val'"))?;
        let upper: StringArray = val
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(str::to_uppercase))
            .collect();
        let mut fields = batch.schema().fields().to_vec();
        fields.push(Arc::new(ArrowField::new("upper", DataType::Utf8, true)));
        let mut columns = batch.columns().to_vec();
        columns.push(Arc::new(upper));
        Ok(RecordBatch::try_new(
            Arc::new(ArrowSchema::new(fields)),
            columns,
        )?)
    })
}

/// Builds T1 (create) -> T2 (upper, by id, 2 partitions) -> T3 (output).
fn upper_workflow(
    sink: Arc<MemorySink>,
    t2: impl FnOnce(TaskSpec) -> TaskSpec,
) -> WorkflowDag {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())).name("t1"))
        .unwrap();
    let spec = TaskSpec::transform(upper())
        .name("t2")
        .input(t1)
        .partition(PartitionSpec::by_keys(["id"]).with_num_partitions(2));
    let t2 = builder.add_task(t2(spec)).unwrap();
    builder
        .add_task(TaskSpec::output(SinkOutput::new(sink)).name("t3").input(t2))
        .unwrap();
    builder.finalize().unwrap()
}

/// Passes its single input through, failing the first `failures` calls.
struct Flaky {
    failures: u32,
    transient: bool,
    calls: AtomicU32,
}

impl Flaky {
    fn new(failures: u32, transient: bool) -> Self {
        Self {
            failures,
            transient,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Processor for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn output_schema(&self, inputs: &[Schema]) -> StrataResult<Option<Schema>> {
        Ok(inputs.first().cloned())
    }

    async fn process(
        &self,
        _engine: &dyn ExecutionEngine,
        inputs: &DataFrames,
    ) -> StrataResult<DataFrame> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(if self.transient {
                StrataError::transient("local", "worker lost")
            } else {
                StrataError::execution("local", "plan rejected")
            });
        }
        Ok(inputs.single()?.clone())
    }
}

/// Builds T1 (create) -> P (processor) -> OUT (output).
fn processor_workflow(
    processor: impl Processor + 'static,
    p: impl FnOnce(TaskSpec) -> TaskSpec,
) -> WorkflowDag {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())).name("t1"))
        .unwrap();
    let p_id = builder
        .add_task(p(TaskSpec::process(processor).name("p").input(t1)))
        .unwrap();
    builder
        .add_task(
            TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new())))
                .name("out")
                .input(p_id),
        )
        .unwrap();
    builder.finalize().unwrap()
}

// =============================================================================
// Successful runs
// =============================================================================

#[tokio::test]
async fn test_upper_workflow_end_to_end() {
    let engine = engine();
    let sink = Arc::new(MemorySink::new());
    let dag = upper_workflow(sink.clone(), |t2| t2);

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.is_success(), "{result}");
    for name in ["t1", "t2", "t3"] {
        assert_eq!(result.state(name), Some(TaskState::Completed));
        assert_eq!(result.report(name).unwrap().attempts, 1);
    }
    assert_eq!(result.report("t2").unwrap().output_rows, Some(3));
    assert_eq!(result.report("t3").unwrap().output_rows, None);

    let mut rows = sink.rows().unwrap();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::from("a"), Value::from("A")],
            vec![Value::Int(2), Value::from("b"), Value::from("B")],
            vec![Value::Int(3), Value::from("c"), Value::from("C")],
        ]
    );
    assert_eq!(sink.finish_count(), 1);
}

#[tokio::test]
async fn test_each_intermediate_released_once() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| t2);
    let order = dag.topological_order().to_vec();

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.released, vec![order[0], order[1]]);
    assert_eq!(engine.metrics().calls(ops::UNPERSIST), 2);
    assert_eq!(engine.persisted_count(), 0);
}

#[tokio::test]
async fn test_persisted_frames_released() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| {
        t2.persist(PersistLevel::Memory)
    });

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(engine.metrics().calls(ops::PERSIST), 1);
    assert_eq!(engine.persisted_count(), 0);
    assert_eq!(engine.memory().used(), 0);
}

#[tokio::test]
async fn test_yielded_frame_kept() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| {
        t2.persist(PersistLevel::Memory).yield_result()
    });
    let t1 = dag.task_by_name("t1").unwrap().id();

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.released, vec![t1]);
    assert_eq!(engine.persisted_count(), 1);

    let yielded = result.yielded("t2").unwrap();
    assert_eq!(yielded.schema().to_string(), "id:int,val:str,upper:str");
    let batches = engine.collect(yielded).await.unwrap();
    assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 3);

    engine.unpersist(yielded).await.unwrap();
    assert_eq!(engine.persisted_count(), 0);
}

#[tokio::test]
async fn test_broadcast_flag_applied() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| {
        t2.broadcast().yield_result()
    });

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.yielded("t2").unwrap().is_broadcast());
    assert_eq!(engine.metrics().calls(ops::BROADCAST), 1);
}

#[tokio::test]
async fn test_checkpoint_spills_to_checkpoint_dir() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| {
        t2.checkpoint().yield_result()
    });
    let t2 = dag.task_by_name("t2").unwrap();
    let expected = dir
        .path()
        .join(format!("t2-{:016x}", t2.fingerprint()));

    let options = RunOptions::default().with_checkpoint_dir(dir.path());
    let result = run(&dag, engine.clone(), &options).await.unwrap();

    let yielded = result.yielded("t2").unwrap();
    assert_eq!(
        yielded.persist_level(),
        Some(&PersistLevel::Disk(expected.clone()))
    );
    assert!(expected.is_dir());

    engine.unpersist(yielded).await.unwrap();
    assert_eq!(engine.persisted_count(), 0);
}

#[tokio::test]
async fn test_checkpoint_without_dir_is_ignored() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| {
        t2.checkpoint().yield_result()
    });

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.yielded("t2").unwrap().persist_level(), None);
    assert_eq!(engine.metrics().calls(ops::PERSIST), 0);
}

#[test]
fn test_run_sync() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| t2);
    let driver = Driver::new(engine);

    let result = driver.run_sync(&dag, &RunOptions::default()).unwrap();
    assert!(result.is_success());
    assert_eq!(driver.engine().name(), "local");
}

// =============================================================================
// Retries
// =============================================================================

#[tokio::test]
async fn test_transient_fault_retried_once() {
    let dag = processor_workflow(Flaky::new(1, true), |p| p.deterministic(false));

    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    assert!(result.is_success(), "{result}");
    assert_eq!(result.report("p").unwrap().attempts, 2);
}

#[tokio::test]
async fn test_retry_gives_up_after_one_rerun() {
    let dag = processor_workflow(Flaky::new(5, true), |p| p.deterministic(false));

    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    assert_eq!(result.state("p"), Some(TaskState::Failed));
    assert_eq!(result.report("p").unwrap().attempts, 2);
    let failure = result.failure("p").unwrap();
    assert_eq!(failure.category, ErrorCategory::EngineExecution);
    assert!(failure.error().unwrap().is_transient());
}

#[tokio::test]
async fn test_deterministic_task_not_retried() {
    let dag = processor_workflow(Flaky::new(1, true), |p| p);

    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    assert_eq!(result.state("p"), Some(TaskState::Failed));
    assert_eq!(result.report("p").unwrap().attempts, 1);
}

#[tokio::test]
async fn test_permanent_fault_not_retried() {
    let dag = processor_workflow(Flaky::new(1, false), |p| p.deterministic(false));

    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    assert_eq!(result.report("p").unwrap().attempts, 1);
    assert!(!result.failure("p").unwrap().error().unwrap().is_transient());
}

#[tokio::test]
async fn test_retry_policy_from_options() {
    let dag = processor_workflow(Flaky::new(1, true), |p| p);

    let options = RunOptions::default().with_retry(RetryPolicy {
        max_retries: 1,
        retry_deterministic: true,
    });
    let result = run(&dag, engine(), &options).await.unwrap();
    assert!(result.is_success());

    let dag = processor_workflow(Flaky::new(1, true), |p| p.deterministic(false));
    let options = RunOptions::default().with_retry(RetryPolicy::none());
    let result = run(&dag, engine(), &options).await.unwrap();
    assert_eq!(result.state("p"), Some(TaskState::Failed));
}

// =============================================================================
// Failures
// =============================================================================

/// t1 -> bad -> after, and t1 -> upper (independent of `bad`).
fn branching_workflow() -> WorkflowDag {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())).name("t1"))
        .unwrap();
    let bad = builder
        .add_task(
            TaskSpec::process(Flaky::new(u32::MAX, false))
                .name("bad")
                .input(t1),
        )
        .unwrap();
    builder
        .add_task(TaskSpec::transform(upper()).name("upper").input(t1))
        .unwrap();
    builder
        .add_task(
            TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new())))
                .name("after")
                .input(bad),
        )
        .unwrap();
    builder.finalize().unwrap()
}

#[tokio::test]
async fn test_fail_fast_leaves_rest_pending() {
    let engine = engine();
    let dag = branching_workflow();

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.state("t1"), Some(TaskState::Completed));
    assert_eq!(result.state("bad"), Some(TaskState::Failed));
    assert_eq!(result.state("upper"), Some(TaskState::Pending));
    assert_eq!(result.report("upper").unwrap().attempts, 0);
    assert_eq!(engine.metrics().calls(ops::MAP_PARTITIONS), 0);

    let after = result.failure("after").unwrap();
    assert_eq!(after.category, ErrorCategory::UpstreamFailed);
    assert!(after.error().is_none());
    assert_eq!(result.state("after"), Some(TaskState::Failed));

    // t1 is still referenced by the pending task and is released at the end.
    let t1 = dag.task_by_name("t1").unwrap().id();
    assert_eq!(result.released, vec![t1]);
}

#[tokio::test]
async fn test_without_fail_fast_independent_branches_run() {
    let dag = branching_workflow();
    let options = RunOptions::default().with_fail_fast(false);

    let result = run(&dag, engine(), &options).await.unwrap();

    assert_eq!(result.state("bad"), Some(TaskState::Failed));
    assert_eq!(result.state("upper"), Some(TaskState::Completed));
    assert_eq!(result.state("after"), Some(TaskState::Failed));
    assert_eq!(
        result.failure("after").unwrap().category,
        ErrorCategory::UpstreamFailed
    );
}

#[tokio::test]
async fn test_into_result_returns_root_cause() {
    let dag = branching_workflow();
    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    assert_eq!(result.failures.len(), 2);
    let err = result.into_result().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::EngineExecution);
}

/// Declares one schema but returns its input unchanged.
struct Drifting;

#[async_trait]
impl Processor for Drifting {
    fn output_schema(&self, _inputs: &[Schema]) -> StrataResult<Option<Schema>> {
        Ok(Some("id:int".parse()?))
    }

    async fn process(
        &self,
        _engine: &dyn ExecutionEngine,
        inputs: &DataFrames,
    ) -> StrataResult<DataFrame> {
        Ok(inputs.single()?.clone())
    }
}

#[tokio::test]
async fn test_output_schema_checked_at_run_time() {
    let dag = processor_workflow(Drifting, |p| p);

    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    let failure = result.failure("p").unwrap();
    assert_eq!(failure.category, ErrorCategory::SchemaContract);
}

/// Produces its frame on an engine of its own.
struct Foreign(LocalEngine);

#[async_trait]
impl Processor for Foreign {
    fn output_schema(&self, inputs: &[Schema]) -> StrataResult<Option<Schema>> {
        Ok(inputs.first().cloned())
    }

    async fn process(
        &self,
        _engine: &dyn ExecutionEngine,
        _inputs: &DataFrames,
    ) -> StrataResult<DataFrame> {
        self.0.to_dataframe(source()).await
    }
}

#[tokio::test]
async fn test_frame_from_other_engine_rejected() {
    let dag = processor_workflow(Foreign(LocalEngine::default()), |p| p);

    let result = run(&dag, engine(), &RunOptions::default()).await.unwrap();

    assert_eq!(
        result.failure("p").unwrap().category,
        ErrorCategory::EngineMismatch
    );
}

// =============================================================================
// Release and cleanup
// =============================================================================

#[tokio::test]
async fn test_passthrough_keeps_persisted_input_alive() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let sink = Arc::new(MemorySink::new());

    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(
            TaskSpec::create(CreateData::new(source()))
                .name("t1")
                .persist(PersistLevel::Disk(dir.path().to_path_buf())),
        )
        .unwrap();
    let p = builder
        .add_task(TaskSpec::process(Flaky::new(0, true)).name("p").input(t1))
        .unwrap();
    builder
        .add_task(TaskSpec::output(SinkOutput::new(sink.clone())).name("out").input(p))
        .unwrap();
    let dag = builder.finalize().unwrap();

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(result.is_success(), "{result}");
    assert_eq!(sink.num_rows(), 3);
    // t1 and p share one frame, so it is unpersisted once, after `out`.
    assert_eq!(result.released, vec![t1, p]);
    assert_eq!(engine.metrics().calls(ops::UNPERSIST), 1);
    assert_eq!(engine.persisted_count(), 0);
}

#[tokio::test]
async fn test_persisted_output_discarded_when_broadcast_fails() {
    let engine = Arc::new(LocalEngine::new(
        LocalEngineConfig::default()
            .with_parallelism(2)
            .with_broadcast_threshold(1),
    ));
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| {
        t2.persist(PersistLevel::Memory).broadcast()
    });

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.failure("t2").unwrap().category, ErrorCategory::Resource);
    assert_eq!(engine.metrics().calls(ops::PERSIST), 1);
    assert_eq!(engine.persisted_count(), 0);
    assert_eq!(engine.memory().used(), 0);
}

#[tokio::test]
async fn test_persisted_input_kept_when_passthrough_broadcast_fails() {
    let engine = Arc::new(LocalEngine::new(
        LocalEngineConfig::default().with_broadcast_threshold(1),
    ));
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(
            TaskSpec::create(CreateData::new(source()))
                .name("t1")
                .persist(PersistLevel::Memory),
        )
        .unwrap();
    let p = builder
        .add_task(
            TaskSpec::process(Flaky::new(0, true))
                .name("p")
                .input(t1)
                .persist(PersistLevel::Memory)
                .broadcast(),
        )
        .unwrap();
    builder
        .add_task(
            TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new())))
                .name("out")
                .input(p),
        )
        .unwrap();
    let dag = builder.finalize().unwrap();

    let result = run(&dag, engine.clone(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.failure("p").unwrap().category, ErrorCategory::Resource);
    // The failed task does not unpin storage it did not pin; t1's release does.
    assert_eq!(result.released, vec![t1]);
    assert_eq!(engine.metrics().calls(ops::UNPERSIST), 1);
    assert_eq!(engine.persisted_count(), 0);
    assert_eq!(engine.memory().used(), 0);
}

/// Local engine whose `unpersist` always fails.
#[derive(Debug, Default)]
struct StickyEngine(LocalEngine);

#[async_trait]
impl ExecutionEngine for StickyEngine {
    fn id(&self) -> EngineId {
        self.0.id()
    }

    fn name(&self) -> &str {
        "sticky"
    }

    fn default_parallelism(&self) -> usize {
        self.0.default_parallelism()
    }

    fn type_mapping(&self) -> &dyn TypeMapping {
        self.0.type_mapping()
    }

    fn metrics(&self) -> &EngineMetrics {
        self.0.metrics()
    }

    async fn to_dataframe(&self, source: TabularSource) -> StrataResult<DataFrame> {
        self.0.to_dataframe(source).await
    }

    async fn repartition(&self, df: &DataFrame, spec: &PartitionSpec) -> StrataResult<DataFrame> {
        self.0.repartition(df, spec).await
    }

    async fn map_partitions(
        &self,
        df: &DataFrame,
        func: Arc<dyn Transformer>,
        output_schema: &Schema,
    ) -> StrataResult<DataFrame> {
        self.0.map_partitions(df, func, output_schema).await
    }

    async fn broadcast(&self, df: &DataFrame) -> StrataResult<DataFrame> {
        self.0.broadcast(df).await
    }

    async fn persist(&self, df: &DataFrame, level: PersistLevel) -> StrataResult<DataFrame> {
        self.0.persist(df, level).await
    }

    async fn unpersist(&self, _df: &DataFrame) -> StrataResult<()> {
        Err(StrataError::execution("sticky", "object store unreachable"))
    }

    async fn output(&self, df: &DataFrame, sink: &dyn Sink) -> StrataResult<()> {
        self.0.output(df, sink).await
    }

    async fn collect(&self, df: &DataFrame) -> StrataResult<Vec<RecordBatch>> {
        self.0.collect(df).await
    }
}

#[tokio::test]
async fn test_release_failure_reported() {
    let sink = Arc::new(MemorySink::new());
    let dag = upper_workflow(sink.clone(), |t2| t2);

    let result = run(&dag, Arc::new(StickyEngine::default()), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(sink.num_rows(), 3);
    for name in ["t1", "t2", "t3"] {
        assert_eq!(result.state(name), Some(TaskState::Completed));
    }
    assert!(result.released.is_empty());
    assert!(!result.is_success());

    let failure = result.failure("t1").unwrap();
    assert_eq!(failure.category, ErrorCategory::EngineExecution);
    assert_eq!(failure.position, 0);
    assert!(result.failure("t2").is_some());

    let err = result.into_result().unwrap_err();
    assert!(matches!(err, StrataError::EngineExecutionError(_)));
}

// =============================================================================
// Overrides
// =============================================================================

#[tokio::test]
async fn test_override_replaces_declared_spec() {
    let engine = engine();
    let sink = Arc::new(MemorySink::new());
    let dag = upper_workflow(sink.clone(), |t2| t2);
    let t2 = dag.task_by_name("t2").unwrap().id();

    let options = RunOptions::default().with_override(t2, PartitionSpec::by_count(3));
    let result = run(&dag, engine.clone(), &options).await.unwrap();

    assert!(result.is_success());
    assert_eq!(engine.metrics().calls(ops::REPARTITION), 1);
    assert_eq!(sink.num_rows(), 3);
}

#[tokio::test]
async fn test_invalid_overrides_fail_before_running() {
    let engine = engine();
    let dag = upper_workflow(Arc::new(MemorySink::new()), |t2| t2);
    let t1 = dag.task_by_name("t1").unwrap().id();
    let t2 = dag.task_by_name("t2").unwrap().id();

    let options = RunOptions::default().with_override(t2, PartitionSpec::by_keys(["missing"]));
    let err = run(&dag, engine.clone(), &options).await.unwrap_err();
    assert!(matches!(err, StrataError::PartitionError(_)));

    let options = RunOptions::default().with_override(t1, PartitionSpec::by_count(2));
    let err = run(&dag, engine.clone(), &options).await.unwrap_err();
    assert!(matches!(err, StrataError::InvalidParameter(_)));

    let other = upper_workflow(Arc::new(MemorySink::new()), |t2| t2);
    let foreign = other.task_by_name("t2").unwrap().id();
    let options = RunOptions::default().with_override(foreign, PartitionSpec::by_count(2));
    let err = run(&dag, engine.clone(), &options).await.unwrap_err();
    assert!(matches!(err, StrataError::UnknownTaskError(_)));

    assert_eq!(engine.metrics().total_calls(), 0);
}
