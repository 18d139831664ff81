//! Integration tests for workflow construction and validation.

use std::sync::Arc;

use arrow::array::{AsArray, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
use async_trait::async_trait;

use common_error::{StrataError, StrataResult};
use strata_core::{PartitionSpec, Schema, SchemaContract, Value};
use strata_core::batch_to_rows;
use strata_engine::{
    DataFrame, DataFrames, ExecutionEngine, LocalEngine, MemorySink, PersistLevel, TabularSource,
    Transformer, transformer_fn,
};
use strata_workflow::{
    CreateData, Join, Processor, SinkOutput, TaskKind, TaskSpec, UnionAll, WorkflowBuilder,
    WorkflowDag,
};

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
fn upper_workflow(t2: impl FnOnce(TaskSpec) -> TaskSpec) -> StrataResult<WorkflowDag> {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder.add_task(TaskSpec::create(CreateData::new(source())).name("t1"))?;
    let spec = TaskSpec::transform(upper())
        .name("t2")
        .input(t1)
        .partition(PartitionSpec::by_keys(["id"]).with_num_partitions(2));
    let t2 = builder.add_task(t2(spec))?;
    builder.add_task(
        TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new())))
            .name("t3")
            .input(t2),
    )?;
    builder.finalize()
}

/// A processor that cannot tell its output schema in advance.
struct Opaque;

#[async_trait]
impl Processor for Opaque {
    async fn process(
        &self,
        _engine: &dyn ExecutionEngine,
        inputs: &DataFrames,
    ) -> StrataResult<DataFrame> {
        Ok(inputs.single()?.clone())
    }
}

// =============================================================================
// Valid graphs
// =============================================================================

#[test]
fn test_upper_workflow_finalizes() {
    let dag = upper_workflow(|t2| t2).unwrap();
    let ids = dag.topological_order().to_vec();
    assert_eq!(ids.len(), 3);

    let names: Vec<&str> = ids.iter().map(|id| dag.task(*id).unwrap().name()).collect();
    assert_eq!(names, vec!["t1", "t2", "t3"]);

    assert_eq!(dag.output_schema(ids[0]), Some(&input_schema()));
    assert_eq!(
        dag.output_schema(ids[1]).unwrap().to_string(),
        "id:int,val:str,upper:str"
    );
    assert_eq!(dag.output_schema(ids[2]), None);
    assert_eq!(dag.consumers(ids[0]), &[ids[1]]);
    assert!(dag.consumers(ids[2]).is_empty());
    assert_eq!(dag.task(ids[2]).unwrap().kind(), TaskKind::Output);
    assert_eq!(dag.position(ids[2]), Some(2));
}

#[test]
fn test_declared_schema_matching_inference() {
    let declared: Schema = "id:int,val:str,upper:str".parse().unwrap();
    let dag = upper_workflow(|t2| t2.output_schema(declared.clone())).unwrap();
    let t2 = dag.task_by_name("t2").unwrap();
    assert_eq!(dag.output_schema(t2.id()), Some(&declared));
}

#[test]
fn test_explain_shows_every_task() {
    let dag = upper_workflow(|t2| t2.persist(PersistLevel::Memory)).unwrap();
    let text = dag.explain();
    assert!(text.starts_with("output t3: sink_output"));
    assert!(text.contains("transform t2: upper"));
    assert!(text.contains("partition: by=id num=2"));
    assert!(text.contains("persist: memory"));
    assert!(text.contains("create t1: create_data ([id:int,val:str])"));
}

#[test]
fn test_fingerprints() {
    let a = upper_workflow(|t2| t2).unwrap();
    let b = upper_workflow(|t2| t2).unwrap();
    let c = upper_workflow(|t2| t2.deterministic(false)).unwrap();

    let fp = |dag: &WorkflowDag, name: &str| dag.task_by_name(name).unwrap().fingerprint();
    assert_eq!(fp(&a, "t1"), fp(&b, "t1"));
    assert_eq!(fp(&a, "t3"), fp(&b, "t3"));
    assert_eq!(fp(&a, "t1"), fp(&c, "t1"));
    assert_ne!(fp(&a, "t2"), fp(&c, "t2"));
    // Downstream tasks change with their inputs.
    assert_ne!(fp(&a, "t3"), fp(&c, "t3"));
}

#[test]
fn test_reserved_task_runs_after_its_inputs() {
    let mut builder = WorkflowBuilder::new();
    let later = builder.reserve();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    builder
        .define(later, TaskSpec::transform(upper()).input(t1))
        .unwrap();
    let out = builder
        .add_task(TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new()))).input(later))
        .unwrap();

    let dag = builder.finalize().unwrap();
    assert_eq!(dag.topological_order(), &[t1, later, out]);
    assert_eq!(dag.task(later).unwrap().name(), "transform_0");
}

#[test]
fn test_union_of_matching_inputs() {
    let mut builder = WorkflowBuilder::new();
    let a = builder.add_task(TaskSpec::create(CreateData::new(source()))).unwrap();
    let b = builder.add_task(TaskSpec::create(CreateData::new(source()))).unwrap();
    let u = builder
        .add_task(TaskSpec::process(UnionAll).named_input("left", a).named_input("right", b))
        .unwrap();
    let dag = builder.finalize().unwrap();
    assert_eq!(dag.output_schema(u), Some(&input_schema()));
    assert_eq!(dag.consumers(a), &[u]);
}

fn scores() -> TabularSource {
    let rows = vec![
        vec![Value::Int(1), Value::Float(0.5)],
        vec![Value::Int(1), Value::Float(0.7)],
        vec![Value::Int(3), Value::Float(0.9)],
        vec![Value::Null, Value::Float(0.1)],
    ];
    TabularSource::rows("id:int,score:double".parse().unwrap(), rows)
}

#[test]
fn test_join_schema_inferred() {
    let mut builder = WorkflowBuilder::new();
    let a = builder.add_task(TaskSpec::create(CreateData::new(source()))).unwrap();
    let b = builder.add_task(TaskSpec::create(CreateData::new(scores()))).unwrap();
    let j = builder
        .add_task(TaskSpec::process(Join::left(["id"])).input(a).input(b))
        .unwrap();
    let dag = builder.finalize().unwrap();
    assert_eq!(
        dag.output_schema(j),
        Some(&"id:int,val:str,score:double".parse().unwrap())
    );
}

#[test]
fn test_join_column_collision_rejected() {
    let mut builder = WorkflowBuilder::new();
    let a = builder.add_task(TaskSpec::create(CreateData::new(source()))).unwrap();
    let b = builder.add_task(TaskSpec::transform(upper()).input(a)).unwrap();
    builder
        .add_task(TaskSpec::process(Join::inner(["id"])).input(a).input(b))
        .unwrap();
    let err = builder.finalize().unwrap_err();
    assert!(matches!(err, StrataError::SchemaContractError(_)));
}

#[tokio::test]
async fn test_join_rows() {
    let engine = LocalEngine::default();
    let mut inputs = DataFrames::new();
    inputs.push(engine.to_dataframe(source()).await.unwrap());
    inputs.push(engine.to_dataframe(scores()).await.unwrap());

    let mut outputs = Vec::new();
    for join in [Join::inner(["id"]), Join::left(["id"])] {
        let df = join.process(&engine, &inputs).await.unwrap();
        let mut rows = Vec::new();
        for batch in engine.collect(&df).await.unwrap() {
            rows.extend(batch_to_rows(&batch).unwrap());
        }
        rows.sort();
        outputs.push(rows);
    }

    let row = |id: i64, val: &str, score: Option<f64>| {
        vec![Value::Int(id), Value::from(val), Value::from(score)]
    };
    assert_eq!(
        outputs[0],
        vec![row(1, "a", Some(0.5)), row(1, "a", Some(0.7)), row(3, "c", Some(0.9))]
    );
    assert_eq!(
        outputs[1],
        vec![
            row(1, "a", Some(0.5)),
            row(1, "a", Some(0.7)),
            row(2, "b", None),
            row(3, "c", Some(0.9)),
        ]
    );
}

// =============================================================================
// Build-time errors
// =============================================================================

#[test]
fn test_forward_reference_is_cyclic() {
    let mut builder = WorkflowBuilder::new();
    let later = builder.reserve();
    let err = builder
        .add_task(TaskSpec::transform(upper()).input(later))
        .unwrap_err();
    assert!(matches!(err, StrataError::CyclicDependencyError(_)));

    // A reserved task cannot feed itself either.
    let err = builder
        .define(later, TaskSpec::transform(upper()).input(later))
        .unwrap_err();
    assert!(matches!(err, StrataError::CyclicDependencyError(_)));
}

#[test]
fn test_unknown_inputs() {
    let mut other = WorkflowBuilder::new();
    let foreign = other
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();

    let mut builder = WorkflowBuilder::new();
    let err = builder
        .add_task(TaskSpec::transform(upper()).input(foreign))
        .unwrap_err();
    assert!(matches!(err, StrataError::UnknownTaskError(_)));
}

#[test]
fn test_output_task_cannot_be_an_input() {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    let out = builder
        .add_task(TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new()))).input(t1))
        .unwrap();
    let err = builder
        .add_task(TaskSpec::transform(upper()).input(out))
        .unwrap_err();
    assert!(matches!(err, StrataError::GraphError(_)));
}

#[test]
fn test_duplicate_names() {
    let mut builder = WorkflowBuilder::new();
    builder
        .add_task(TaskSpec::create(CreateData::new(source())).name("load"))
        .unwrap();
    let err = builder
        .add_task(TaskSpec::create(CreateData::new(source())).name("load"))
        .unwrap_err();
    assert!(matches!(err, StrataError::InvalidParameter(_)));
    assert!(builder.task_id("load").is_some());
}

#[test]
fn test_contract_on_missing_slot() {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    let err = builder
        .add_task(
            TaskSpec::transform(upper())
                .input(t1)
                .expect_input(1, SchemaContract::Subset(input_schema())),
        )
        .unwrap_err();
    assert!(matches!(err, StrataError::InvalidParameter(_)));
}

// =============================================================================
// Finalize-time errors
// =============================================================================

#[test]
fn test_declared_output_omitting_computed_column() {
    let err = upper_workflow(|t2| t2.output_schema(input_schema())).unwrap_err();
    assert!(matches!(err, StrataError::SchemaContractError(_)));
    assert!(err.to_string().contains("t2"));
}

#[test]
fn test_consumer_contract_violations_are_aggregated() {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    builder
        .add_task(
            TaskSpec::transform(upper())
                .name("wants_long")
                .input(t1)
                .expect_input(0, SchemaContract::Exact("id:long,val:str".parse().unwrap())),
        )
        .unwrap();
    builder
        .add_task(
            TaskSpec::transform(upper())
                .name("wants_extra")
                .input(t1)
                .expect_input(0, SchemaContract::Subset("extra:str".parse().unwrap())),
        )
        .unwrap();

    let err = builder.finalize().unwrap_err();
    assert!(matches!(err, StrataError::SchemaContractError(_)));
    let message = err.to_string();
    assert!(message.contains("2 violation(s)"), "{message}");
    assert!(message.contains("wants_long"));
    assert!(message.contains("missing column 'extra'"));
}

#[test]
fn test_transformer_input_contract() {
    let strict = transformer_fn("strict", |_, batch| Ok(batch))
        .with_input_contract(SchemaContract::Exact("id:int".parse().unwrap()));
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    builder
        .add_task(TaskSpec::transform(strict).input(t1))
        .unwrap();
    let err = builder.finalize().unwrap_err();
    assert!(matches!(err, StrataError::SchemaContractError(_)));
}

#[test]
fn test_partition_spec_must_resolve() {
    let err = upper_workflow(|t2| t2.partition(PartitionSpec::by_keys(["missing"]))).unwrap_err();
    assert!(matches!(err, StrataError::PartitionError(_)));

    let err = upper_workflow(|t2| t2.partition(PartitionSpec::by_count(0))).unwrap_err();
    assert!(matches!(err, StrataError::PartitionError(_)));
}

#[test]
fn test_process_schema_must_be_known() {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    builder.add_task(TaskSpec::process(Opaque).input(t1)).unwrap();
    let err = builder.finalize().unwrap_err();
    assert!(matches!(err, StrataError::SchemaContractError(_)));

    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    let p = builder
        .add_task(TaskSpec::process(Opaque).input(t1).output_schema(input_schema()))
        .unwrap();
    let dag = builder.finalize().unwrap();
    assert_eq!(dag.output_schema(p), Some(&input_schema()));
}

#[test]
fn test_union_of_mismatched_inputs() {
    let mut builder = WorkflowBuilder::new();
    let a = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    let b = builder.add_task(TaskSpec::transform(upper()).input(a)).unwrap();
    builder
        .add_task(TaskSpec::process(UnionAll).input(a).input(b))
        .unwrap();
    let err = builder.finalize().unwrap_err();
    assert!(matches!(err, StrataError::SchemaContractError(_)));
}

#[test]
fn test_structural_errors() {
    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    builder
        .add_task(TaskSpec::transform(upper()).input(t1).input(t1))
        .unwrap();
    assert!(matches!(
        builder.finalize(),
        Err(StrataError::GraphError(_))
    ));

    let mut builder = WorkflowBuilder::new();
    let t1 = builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    builder
        .add_task(
            TaskSpec::output(SinkOutput::new(Arc::new(MemorySink::new())))
                .input(t1)
                .broadcast(),
        )
        .unwrap();
    assert!(matches!(
        builder.finalize(),
        Err(StrataError::GraphError(_))
    ));

    assert!(matches!(
        WorkflowBuilder::new().finalize(),
        Err(StrataError::GraphError(_))
    ));

    let mut builder = WorkflowBuilder::new();
    builder.reserve();
    builder
        .add_task(TaskSpec::create(CreateData::new(source())))
        .unwrap();
    assert!(matches!(
        builder.finalize(),
        Err(StrataError::UnknownTaskError(_))
    ));
}
