//! The local engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arrow_array::RecordBatch;
use async_trait::async_trait;
use common_error::{StrataError, StrataResult};
use log::{debug, info};
use strata_core::partition::partitioner::{concat, partition_batch, split_key_groups};
use strata_core::{CanonicalTypeMapping, PartitionCursor, PartitionSpec, Schema, TypeMapping};

use super::{LocalEngineConfig, LocalFrame};
use crate::engine::{ExecutionEngine, PersistLevel, ops};
use crate::frame::{DataFrame, EngineId, FrameId, NativeFrame};
use crate::memory::{MemoryManager, MemoryReservation, TrackingMemoryManager};
use crate::metrics::{EngineMetrics, ExecutionTimer};
use crate::sink::Sink;
use crate::source::TabularSource;
use crate::spill::{remove_file, write_ipc_file};
use crate::transformer::{Transformer, conform_output};

const ENGINE_NAME: &str = "local";

/// What the engine holds for a persisted frame.
#[derive(Debug)]
enum Persisted {
    Memory(MemoryReservation),
    Disk(Vec<PathBuf>),
}

/// Single-process reference engine.
///
/// Each partition is one canonical Arrow batch. Partition functions run
/// sequentially on the calling task.
#[derive(Debug)]
pub struct LocalEngine {
    id: EngineId,
    config: LocalEngineConfig,
    memory: Arc<dyn MemoryManager>,
    persisted: Mutex<HashMap<FrameId, Persisted>>,
    metrics: EngineMetrics,
}

impl LocalEngine {
    /// Create an engine.
    pub fn new(config: LocalEngineConfig) -> Self {
        let memory: Arc<dyn MemoryManager> = Arc::new(TrackingMemoryManager::new(config.memory_limit));
        Self {
            id: EngineId::next(),
            config,
            memory,
            persisted: Mutex::new(HashMap::new()),
            metrics: EngineMetrics::new(),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &LocalEngineConfig {
        &self.config
    }

    /// Memory manager accounting persisted frames.
    pub fn memory(&self) -> &Arc<dyn MemoryManager> {
        &self.memory
    }

    /// Number of frames currently persisted.
    pub fn persisted_count(&self) -> usize {
        self.persisted.lock().expect("persist lock poisoned").len()
    }

    fn frame<'a>(&self, df: &'a DataFrame) -> StrataResult<&'a LocalFrame> {
        df.native_as::<LocalFrame>(self)
    }

    fn new_frame(&self, schema: Schema, partitions: Vec<RecordBatch>) -> DataFrame {
        let native = LocalFrame::new(schema.to_arrow(), partitions);
        DataFrame::new(self, schema, Arc::new(native))
    }

    fn spill(&self, df: &DataFrame, frame: &LocalFrame, dir: &Path) -> StrataResult<Vec<PathBuf>> {
        let frame_dir = dir.join(format!("frame-{}", df.id().as_u64()));
        let mut files = Vec::with_capacity(frame.num_partitions());
        for (p, batch) in frame.partitions()?.iter().enumerate() {
            let path = frame_dir.join(format!("part-{p:05}.arrow"));
            write_ipc_file(&path, frame.arrow_schema(), std::slice::from_ref(batch))
                .map_err(|e| e.into_engine_fault(ENGINE_NAME))?;
            files.push(path);
        }
        Ok(files)
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new(LocalEngineConfig::default())
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn default_parallelism(&self) -> usize {
        self.config.parallelism
    }

    fn type_mapping(&self) -> &dyn TypeMapping {
        &CanonicalTypeMapping
    }

    fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    async fn to_dataframe(&self, source: TabularSource) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let (schema, batches) = source.into_batches()?;
        let batch = concat(&schema.to_arrow(), &batches)?;
        let rows = batch.num_rows();
        let df = self.new_frame(schema, vec![batch]);
        debug!("[{ENGINE_NAME}] ingested {} with {rows} rows", df.id());
        self.metrics.record(ops::TO_DATAFRAME, rows, rows, timer.elapsed());
        Ok(df)
    }

    async fn repartition(&self, df: &DataFrame, spec: &PartitionSpec) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let frame = self.frame(df)?;
        let resolved = spec.resolve(df.schema())?;
        let parallelism = self.default_parallelism();
        if resolved.satisfied_by(df.partitioning(), parallelism) {
            debug!("[{ENGINE_NAME}] {} already partitioned as {spec}", df.id());
            self.metrics.record(ops::REPARTITION, df.count(), df.count(), timer.elapsed());
            return Ok(df.clone());
        }

        let n = resolved.num_partitions_or(parallelism);
        let all = concat(frame.arrow_schema(), &frame.partitions()?)?;
        let parts = partition_batch(&all, &resolved, n)?;
        let out = self
            .new_frame(df.schema().clone(), parts)
            .with_partitioning(Some(resolved.with_default_parallelism(parallelism)));
        debug!(
            "[{ENGINE_NAME}] repartitioned {} into {} ({spec}, {n} partitions)",
            df.id(),
            out.id()
        );
        self.metrics.record(ops::REPARTITION, all.num_rows(), all.num_rows(), timer.elapsed());
        Ok(out)
    }

    async fn map_partitions(
        &self,
        df: &DataFrame,
        func: Arc<dyn Transformer>,
        output_schema: &Schema,
    ) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let frame = self.frame(df)?;
        let keys: Vec<String> = df.partitioning().map(|p| p.keys.clone()).unwrap_or_default();
        let expected_arrow = output_schema.to_arrow();

        let mut out_parts = Vec::with_capacity(frame.num_partitions());
        let mut rows_out = 0;
        for (p, part) in frame.partitions()?.into_iter().enumerate() {
            let mut produced = Vec::new();
            for (slice, (key_values, rows)) in split_key_groups(&part, &keys)?.into_iter().enumerate() {
                let cursor = if keys.is_empty() {
                    PartitionCursor::new(p)
                } else {
                    PartitionCursor::for_keys(p, slice, keys.clone(), key_values)
                };
                let result = func.transform(&cursor, rows)?;
                produced.push(conform_output(func.as_ref(), result, output_schema, &expected_arrow)?);
            }
            let batch = concat(&expected_arrow, &produced)?;
            rows_out += batch.num_rows();
            out_parts.push(batch);
        }

        let out = self.new_frame(output_schema.clone(), out_parts);
        debug!(
            "[{ENGINE_NAME}] mapped {} through {} into {}",
            df.id(),
            func.name(),
            out.id()
        );
        self.metrics.record(ops::MAP_PARTITIONS, df.count(), rows_out, timer.elapsed());
        Ok(out)
    }

    async fn broadcast(&self, df: &DataFrame) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let frame = self.frame(df)?;
        let size = frame.memory_size();
        if size > self.config.broadcast_threshold {
            return Err(StrataError::resource(format!(
                "{} is {size} bytes, above the broadcast threshold of {} bytes",
                df.id(),
                self.config.broadcast_threshold
            )));
        }
        self.metrics.record(ops::BROADCAST, df.count(), df.count(), timer.elapsed());
        Ok(df.clone().with_broadcast(true))
    }

    async fn persist(&self, df: &DataFrame, level: PersistLevel) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let frame = self.frame(df)?;
        let mut persisted = self.persisted.lock().expect("persist lock poisoned");
        if persisted.contains_key(&df.id()) {
            return Ok(df.clone());
        }

        let out = match &level {
            PersistLevel::Memory => {
                let bytes = frame.memory_size();
                let reservation = MemoryReservation::try_new(self.memory.clone(), bytes)?;
                persisted.insert(df.id(), Persisted::Memory(reservation));
                info!("[{ENGINE_NAME}] persisted {} in memory ({bytes} bytes)", df.id());
                df.clone()
            }
            PersistLevel::Disk(dir) => {
                let files = self.spill(df, frame, dir)?;
                let native = LocalFrame::spilled(frame.arrow_schema().clone(), files.clone(), df.count());
                info!("[{ENGINE_NAME}] spilled {} to {} files under {}", df.id(), files.len(), dir.display());
                persisted.insert(df.id(), Persisted::Disk(files));
                df.clone().with_native(Arc::new(native))
            }
        };
        self.metrics.record(ops::PERSIST, df.count(), df.count(), timer.elapsed());
        Ok(out.with_persist_level(Some(level)))
    }

    async fn unpersist(&self, df: &DataFrame) -> StrataResult<()> {
        let timer = ExecutionTimer::start();
        df.check_engine(self)?;
        let released = self
            .persisted
            .lock()
            .expect("persist lock poisoned")
            .remove(&df.id());
        match released {
            Some(Persisted::Memory(reservation)) => {
                debug!("[{ENGINE_NAME}] released {} bytes held by {}", reservation.size(), df.id());
            }
            Some(Persisted::Disk(files)) => {
                for file in &files {
                    remove_file(file).map_err(|e| e.into_engine_fault(ENGINE_NAME))?;
                }
                if let Some(dir) = files.first().and_then(|f| f.parent()) {
                    let _ = std::fs::remove_dir(dir);
                }
                debug!("[{ENGINE_NAME}] removed {} spill files of {}", files.len(), df.id());
            }
            None => debug!("[{ENGINE_NAME}] released {}", df.id()),
        }
        self.metrics.record(ops::UNPERSIST, 0, 0, timer.elapsed());
        Ok(())
    }

    async fn output(&self, df: &DataFrame, sink: &dyn Sink) -> StrataResult<()> {
        let timer = ExecutionTimer::start();
        let frame = self.frame(df)?;
        let mut rows = 0;
        for (p, batch) in frame.partitions()?.into_iter().enumerate() {
            if batch.num_rows() == 0 {
                continue;
            }
            rows += batch.num_rows();
            sink.write(p, batch).await?;
        }
        sink.finish().await?;
        self.metrics.record(ops::OUTPUT, rows, rows, timer.elapsed());
        Ok(())
    }

    async fn collect(&self, df: &DataFrame) -> StrataResult<Vec<RecordBatch>> {
        let timer = ExecutionTimer::start();
        let parts = self.frame(df)?.partitions()?;
        self.metrics.record(ops::COLLECT, df.count(), df.count(), timer.elapsed());
        Ok(parts)
    }
}
