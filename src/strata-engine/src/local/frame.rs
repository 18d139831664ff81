//! Native frame of the local engine.

use std::any::Any;
use std::path::PathBuf;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use common_error::{StrataError, StrataResult};
use strata_core::partition::partitioner::concat;

use crate::frame::NativeFrame;
use crate::spill::read_ipc_file;

#[derive(Debug)]
enum Storage {
    Memory(Vec<RecordBatch>),
    /// One IPC file per partition.
    Spilled(Vec<PathBuf>),
}

/// Partitions held by the local engine: one canonical batch per partition,
/// in memory or spilled to disk.
#[derive(Debug)]
pub struct LocalFrame {
    schema: SchemaRef,
    storage: Storage,
    num_rows: usize,
    num_partitions: usize,
    memory_size: usize,
}

impl LocalFrame {
    /// In-memory frame.
    pub fn new(schema: SchemaRef, partitions: Vec<RecordBatch>) -> Self {
        let num_rows = partitions.iter().map(RecordBatch::num_rows).sum();
        let memory_size = partitions.iter().map(RecordBatch::get_array_memory_size).sum();
        Self {
            schema,
            num_partitions: partitions.len(),
            storage: Storage::Memory(partitions),
            num_rows,
            memory_size,
        }
    }

    /// Frame whose partitions live in IPC files.
    pub fn spilled(schema: SchemaRef, files: Vec<PathBuf>, num_rows: usize) -> Self {
        Self {
            schema,
            num_partitions: files.len(),
            storage: Storage::Spilled(files),
            num_rows,
            memory_size: 0,
        }
    }

    /// Canonical Arrow schema.
    pub fn arrow_schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Partition batches, reading them back from disk if spilled.
    pub fn partitions(&self) -> StrataResult<Vec<RecordBatch>> {
        match &self.storage {
            Storage::Memory(parts) => Ok(parts.clone()),
            Storage::Spilled(files) => files
                .iter()
                .map(|path| {
                    let batches = read_ipc_file(path).map_err(|e| {
                        StrataError::resource(format!(
                            "spilled partition {} is unavailable: {e}",
                            path.display()
                        ))
                    })?;
                    concat(&self.schema, &batches)
                })
                .collect(),
        }
    }

}

impl NativeFrame for LocalFrame {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    fn memory_size(&self) -> usize {
        self.memory_size
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
