//! A partition map executed by one worker.

use std::sync::Arc;

use arrow_schema::SchemaRef;
use common_error::StrataResult;
use strata_core::partition::partitioner::{concat, split_key_groups};
use strata_core::{PartitionCursor, Schema, cast_batch};
use strata_engine::{Transformer, conform_output};

use super::Cluster;
use crate::ENGINE_NAME;
use crate::frame::StoredPartition;

/// Applies a transformer to one stored partition on the worker hosting it
/// and stores the result on the same worker.
///
/// User code only ever sees canonical batches: the input is cast from the
/// native layout before the call and the output is cast back after it.
pub(crate) struct WorkerTask {
    pub(crate) partition: usize,
    pub(crate) input: Arc<StoredPartition>,
    pub(crate) input_native: SchemaRef,
    pub(crate) input_canonical: SchemaRef,
    pub(crate) keys: Vec<String>,
    pub(crate) func: Arc<dyn Transformer>,
    pub(crate) output_schema: Schema,
    pub(crate) output_canonical: SchemaRef,
    pub(crate) output_native: SchemaRef,
}

impl WorkerTask {
    pub(crate) fn execute(self, cluster: &Cluster) -> StrataResult<StoredPartition> {
        let worker = self.input.worker().clone();
        cluster
            .faults()
            .check(ENGINE_NAME, worker.id(), self.func.name())?;

        let native = self.input.fetch(&self.input_native)?;
        let batch = cast_batch(&native, &self.input_canonical)?;

        let mut produced = Vec::new();
        for (slice, (key_values, rows)) in split_key_groups(&batch, &self.keys)?.into_iter().enumerate() {
            let cursor = if self.keys.is_empty() {
                PartitionCursor::new(self.partition)
            } else {
                PartitionCursor::for_keys(self.partition, slice, self.keys.clone(), key_values)
            };
            let out = self.func.transform(&cursor, rows)?;
            produced.push(conform_output(
                self.func.as_ref(),
                out,
                &self.output_schema,
                &self.output_canonical,
            )?);
        }

        let out = concat(&self.output_canonical, &produced)?;
        let out = cast_batch(&out, &self.output_native)?;
        StoredPartition::store(&worker, &self.output_native, &out)
    }

    /// Task label for logs.
    pub(crate) fn describe(&self) -> String {
        format!(
            "{} on partition {} ({})",
            self.func.name(),
            self.partition,
            self.input.worker().id()
        )
    }
}
