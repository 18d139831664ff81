//! Per-partition functions.

use std::fmt;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use common_error::{StrataError, StrataResult};
use strata_core::{PartitionCursor, Schema, SchemaContract};

/// A function applied independently to each partition (or key group) of a
/// frame by `ExecutionEngine::map_partitions`.
///
/// Implementations receive canonical Arrow batches and must not share
/// mutable state between invocations: engines may run partitions
/// concurrently and in any order.
pub trait Transformer: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str {
        "transformer"
    }

    /// Transform the rows of one partition slice.
    fn transform(&self, cursor: &PartitionCursor, batch: RecordBatch) -> StrataResult<RecordBatch>;

    /// Output schema for a given input schema.
    ///
    /// The default performs a dry run on an empty batch with the input
    /// layout and reads the schema of the result.
    fn output_schema(&self, input: &Schema) -> StrataResult<Schema> {
        let empty = RecordBatch::new_empty(input.to_arrow());
        let out = self.transform(&PartitionCursor::default(), empty)?;
        Schema::from_arrow(&out.schema()).map_err(|e| {
            StrataError::contract(format!(
                "{} produces a layout with no logical schema: {e}",
                self.name()
            ))
        })
    }

    /// Contract the transformer places on its input, if any.
    fn input_contract(&self) -> Option<SchemaContract> {
        None
    }
}

/// Transformer backed by a closure.
pub struct FnTransformer<F> {
    name: String,
    func: F,
    input_contract: Option<SchemaContract>,
}

impl<F> FnTransformer<F>
where
    F: Fn(&PartitionCursor, RecordBatch) -> StrataResult<RecordBatch> + Send + Sync,
{
    /// Wrap `func`.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            input_contract: None,
        }
    }

    /// Require the input to satisfy `contract`.
    pub fn with_input_contract(mut self, contract: SchemaContract) -> Self {
        self.input_contract = Some(contract);
        self
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(&PartitionCursor, RecordBatch) -> StrataResult<RecordBatch> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, cursor: &PartitionCursor, batch: RecordBatch) -> StrataResult<RecordBatch> {
        (self.func)(cursor, batch)
    }

    fn input_contract(&self) -> Option<SchemaContract> {
        self.input_contract.clone()
    }
}

impl<F> fmt::Debug for FnTransformer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransformer")
            .field("name", &self.name)
            .field("input_contract", &self.input_contract)
            .finish_non_exhaustive()
    }
}

/// Build a transformer from a closure.
pub fn transformer_fn<F>(name: impl Into<String>, func: F) -> FnTransformer<F>
where
    F: Fn(&PartitionCursor, RecordBatch) -> StrataResult<RecordBatch> + Send + Sync,
{
    FnTransformer::new(name, func)
}

/// Check a batch produced by `transformer` against the declared output
/// schema and rebind it to the canonical Arrow layout `expected_arrow`.
///
/// This is the full-scan output check engines apply in `map_partitions`;
/// a mismatch fails with `SchemaContractError`.
pub fn conform_output(
    transformer: &dyn Transformer,
    batch: RecordBatch,
    expected: &Schema,
    expected_arrow: &SchemaRef,
) -> StrataResult<RecordBatch> {
    let produced = Schema::from_arrow(&batch.schema()).map_err(|e| {
        StrataError::contract(format!(
            "{} produced a layout with no logical schema: {e}",
            transformer.name()
        ))
    })?;
    if !produced.is_compatible_with(expected) {
        return Err(StrataError::contract(format!(
            "{} produced [{produced}] but declared [{expected}]",
            transformer.name()
        )));
    }
    RecordBatch::try_new(expected_arrow.clone(), batch.columns().to_vec()).map_err(|e| {
        StrataError::contract(format!("{} produced invalid output: {e}", transformer.name()))
    })
}
