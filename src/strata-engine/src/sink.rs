//! Output sinks.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use arrow_array::RecordBatch;
use async_trait::async_trait;
use common_error::StrataResult;
use strata_core::{Value, batch_to_rows};

use crate::spill::write_ipc_file;

/// Destination of `ExecutionEngine::output`.
///
/// Engines call [`write`](Self::write) once per non-empty partition with a
/// canonical batch, then [`finish`](Self::finish) once. Idempotency across
/// retries is up to the sink.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Write the rows of one partition.
    async fn write(&self, partition: usize, batch: RecordBatch) -> StrataResult<()>;

    /// Called after the last partition has been written.
    async fn finish(&self) -> StrataResult<()> {
        Ok(())
    }
}

/// Sink collecting batches in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(usize, RecordBatch)>>,
    finished: Mutex<u32>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches written so far, ordered by partition.
    pub fn batches(&self) -> Vec<RecordBatch> {
        let mut batches = self.batches.lock().expect("sink lock poisoned").clone();
        batches.sort_by_key(|(p, _)| *p);
        batches.into_iter().map(|(_, b)| b).collect()
    }

    /// Rows written so far.
    pub fn rows(&self) -> StrataResult<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        for batch in self.batches() {
            rows.extend(batch_to_rows(&batch)?);
        }
        Ok(rows)
    }

    /// Number of rows written so far.
    pub fn num_rows(&self) -> usize {
        self.batches
            .lock()
            .expect("sink lock poisoned")
            .iter()
            .map(|(_, b)| b.num_rows())
            .sum()
    }

    /// How many times `finish` was called.
    pub fn finish_count(&self) -> u32 {
        *self.finished.lock().expect("sink lock poisoned")
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, partition: usize, batch: RecordBatch) -> StrataResult<()> {
        self.batches
            .lock()
            .expect("sink lock poisoned")
            .push((partition, batch));
        Ok(())
    }

    async fn finish(&self) -> StrataResult<()> {
        *self.finished.lock().expect("sink lock poisoned") += 1;
        Ok(())
    }
}

/// Sink writing one Arrow IPC file per partition write into a directory.
#[derive(Debug)]
pub struct IpcFileSink {
    dir: PathBuf,
    files: Mutex<Vec<PathBuf>>,
}

impl IpcFileSink {
    /// Write into `dir`, which is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Mutex::new(Vec::new()),
        }
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far.
    pub fn files(&self) -> Vec<PathBuf> {
        self.files.lock().expect("sink lock poisoned").clone()
    }
}

#[async_trait]
impl Sink for IpcFileSink {
    async fn write(&self, partition: usize, batch: RecordBatch) -> StrataResult<()> {
        let mut files = self.files.lock().expect("sink lock poisoned");
        let path = self
            .dir
            .join(format!("part-{partition:05}-{:04}.arrow", files.len()));
        write_ipc_file(&path, &batch.schema(), &[batch])?;
        files.push(path);
        Ok(())
    }
}
