//! The cluster engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use common_error::{StrataError, StrataResult};
use common_runtime::JoinSet;
use log::{debug, info};
use strata_core::partition::partitioner::concat;
use strata_core::{PartitionSpec, Schema, TypeMapping, cast_batch};
use strata_engine::spill::{remove_file, write_ipc_file};
use strata_engine::{
    DataFrame, EngineId, EngineMetrics, ExecutionEngine, ExecutionTimer, FrameId, MemoryManager,
    MemoryReservation, NativeFrame, PersistLevel, Sink, TabularSource, TrackingMemoryManager,
    Transformer, ops,
};

use crate::ENGINE_NAME;
use crate::config::ClusterEngineConfig;
use crate::exchange;
use crate::fault::FaultInjector;
use crate::frame::{ClusterFrame, StoredPartition};
use crate::mapping::ClusterTypeMapping;
use crate::worker::{Cluster, WorkerTask};

/// What the engine holds for a persisted frame. Holding the partitions
/// keeps their objects alive until `unpersist`, even if every handle to the
/// frame is dropped first.
#[derive(Debug)]
struct Pin {
    _partitions: Vec<Arc<StoredPartition>>,
    hold: Hold,
}

/// Storage backing a pin on top of the pinned worker objects.
#[derive(Debug)]
enum Hold {
    /// Pinned bytes counted against the memory manager.
    Memory(MemoryReservation),
    /// One canonical Arrow IPC file per partition. Reads keep going to the
    /// pinned worker objects; the files are a durable copy that outlives
    /// the cluster and is deleted on `unpersist`.
    Disk(Vec<PathBuf>),
}

/// Delegate engine over a cluster of workers.
///
/// Partitions live in the workers' object stores as Arrow IPC streams in the
/// cluster's own column layout ([`ClusterTypeMapping`]). Partition maps run
/// as one worker task per partition, concurrently. Objects are freed when the
/// last frame handle referencing them is dropped.
///
/// Async operations spawn onto the ambient tokio runtime.
#[derive(Debug)]
pub struct ClusterEngine {
    id: EngineId,
    config: ClusterEngineConfig,
    cluster: Arc<Cluster>,
    memory: Arc<dyn MemoryManager>,
    pinned: Mutex<HashMap<FrameId, Pin>>,
    metrics: EngineMetrics,
}

impl ClusterEngine {
    /// Start an engine. Only in-process clusters are supported; a config
    /// with an address fails with `NotImplemented`.
    pub fn new(config: ClusterEngineConfig) -> StrataResult<Self> {
        if let Some(address) = &config.address {
            return Err(StrataError::not_implemented(format!(
                "connecting to a remote cluster at {address}"
            )));
        }
        Ok(Self::start(config))
    }

    /// In-process cluster with `num_workers` workers.
    pub fn local(num_workers: usize) -> Self {
        Self::start(ClusterEngineConfig::local(num_workers))
    }

    fn start(config: ClusterEngineConfig) -> Self {
        let memory: Arc<dyn MemoryManager> = Arc::new(TrackingMemoryManager::new(config.memory_limit));
        info!(
            "[{ENGINE_NAME}] started {} workers (parallelism {})",
            config.num_workers,
            config.parallelism()
        );
        Self {
            id: EngineId::next(),
            cluster: Arc::new(Cluster::start(config.num_workers)),
            config,
            memory,
            pinned: Mutex::new(HashMap::new()),
            metrics: EngineMetrics::new(),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &ClusterEngineConfig {
        &self.config
    }

    /// The workers.
    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Fault hooks of the workers.
    pub fn faults(&self) -> &FaultInjector {
        self.cluster.faults()
    }

    /// Objects stored across all workers.
    pub fn live_objects(&self) -> usize {
        self.cluster.live_objects()
    }

    /// Memory manager accounting pinned frames.
    pub fn memory(&self) -> &Arc<dyn MemoryManager> {
        &self.memory
    }

    /// Number of frames currently persisted.
    pub fn pinned_count(&self) -> usize {
        self.pinned.lock().expect("pin lock poisoned").len()
    }

    fn frame<'a>(&self, df: &'a DataFrame) -> StrataResult<&'a ClusterFrame> {
        df.native_as::<ClusterFrame>(self)
    }

    fn native_schema(&self, schema: &Schema) -> SchemaRef {
        ClusterTypeMapping.native_schema(schema)
    }

    fn new_frame(&self, schema: Schema, native: SchemaRef, partitions: Vec<Arc<StoredPartition>>) -> DataFrame {
        DataFrame::new(self, schema, Arc::new(ClusterFrame::new(native, partitions)))
    }

    /// Slice `batch` into `n` contiguous partitions and store them.
    fn distribute(&self, batch: &RecordBatch, native: &SchemaRef, n: usize) -> StrataResult<Vec<Arc<StoredPartition>>> {
        let batch = cast_batch(batch, native)?;
        let rows = batch.num_rows();
        let chunk = rows.div_ceil(n).max(1);
        (0..n)
            .map(|p| {
                let start = (p * chunk).min(rows);
                let len = chunk.min(rows - start);
                StoredPartition::store(self.cluster.worker_for(p), native, &batch.slice(start, len))
                    .map(Arc::new)
            })
            .collect()
    }

    fn spill(&self, df: &DataFrame, frame: &ClusterFrame, dir: &Path) -> StrataResult<Vec<PathBuf>> {
        let canonical = df.schema().to_arrow();
        let frame_dir = dir.join(format!("frame-{}", df.id().as_u64()));
        let mut files = Vec::with_capacity(frame.num_partitions());
        for (p, batch) in exchange::gather(frame, &canonical)?.iter().enumerate() {
            let path = frame_dir.join(format!("part-{p:05}.arrow"));
            write_ipc_file(&path, &canonical, std::slice::from_ref(batch))
                .map_err(|e| e.into_engine_fault(ENGINE_NAME))?;
            files.push(path);
        }
        Ok(files)
    }
}

#[async_trait]
impl ExecutionEngine for ClusterEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn default_parallelism(&self) -> usize {
        self.config.parallelism()
    }

    fn type_mapping(&self) -> &dyn TypeMapping {
        &ClusterTypeMapping
    }

    fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    async fn to_dataframe(&self, source: TabularSource) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let (schema, batches) = source.into_batches()?;
        let batch = concat(&schema.to_arrow(), &batches)?;
        let native = self.native_schema(&schema);
        let parts = self.distribute(&batch, &native, self.default_parallelism())?;
        let df = self.new_frame(schema, native, parts);
        debug!(
            "[{ENGINE_NAME}] ingested {} with {} rows in {} partitions",
            df.id(),
            batch.num_rows(),
            df.num_partitions()
        );
        self.metrics
            .record(ops::TO_DATAFRAME, batch.num_rows(), batch.num_rows(), timer.elapsed());
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
        let (parts, stats) = exchange::shuffle(&self.cluster, frame, &df.schema().to_arrow(), &resolved, n)?;
        let out = self
            .new_frame(df.schema().clone(), frame.native_schema().clone(), parts)
            .with_partitioning(Some(resolved.with_default_parallelism(parallelism)));
        debug!(
            "[{ENGINE_NAME}] repartitioned {} into {} ({spec}, {} bytes moved)",
            df.id(),
            out.id(),
            stats.bytes_sent
        );
        self.metrics
            .record(ops::REPARTITION, df.count(), stats.total_rows(), timer.elapsed());
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
        let input_canonical = df.schema().to_arrow();
        let output_canonical = output_schema.to_arrow();
        let output_native = self.native_schema(output_schema);

        let mut tasks = JoinSet::new();
        for (p, input) in frame.partitions().iter().enumerate() {
            let task = WorkerTask {
                partition: p,
                input: input.clone(),
                input_native: frame.native_schema().clone(),
                input_canonical: input_canonical.clone(),
                keys: keys.clone(),
                func: func.clone(),
                output_schema: output_schema.clone(),
                output_canonical: output_canonical.clone(),
                output_native: output_native.clone(),
            };
            let cluster = self.cluster.clone();
            tasks.spawn(async move {
                debug!("[{ENGINE_NAME}] running {}", task.describe());
                (p, task.execute(&cluster))
            });
        }

        let mut results = tasks.join_all().await?;
        results.sort_by_key(|(p, _)| *p);
        let parts = results
            .into_iter()
            .map(|(_, stored)| stored.map(Arc::new))
            .collect::<StrataResult<Vec<_>>>()?;

        let out = self.new_frame(output_schema.clone(), output_native, parts);
        debug!(
            "[{ENGINE_NAME}] mapped {} through {} into {}",
            df.id(),
            func.name(),
            out.id()
        );
        self.metrics
            .record(ops::MAP_PARTITIONS, df.count(), out.count(), timer.elapsed());
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
        if df.is_broadcast() {
            return Ok(df.clone());
        }

        let (replicas, stats) = exchange::broadcast(&self.cluster, frame).await?;
        let native = frame.with_replicas(replicas);
        info!(
            "[{ENGINE_NAME}] broadcast {} to {} workers ({} bytes)",
            df.id(),
            self.cluster.num_workers(),
            stats.bytes_sent
        );
        self.metrics.record(ops::BROADCAST, df.count(), df.count(), timer.elapsed());
        Ok(df.clone().with_native(Arc::new(native)).with_broadcast(true))
    }

    async fn persist(&self, df: &DataFrame, level: PersistLevel) -> StrataResult<DataFrame> {
        let timer = ExecutionTimer::start();
        let frame = self.frame(df)?;
        let mut pinned = self.pinned.lock().expect("pin lock poisoned");
        if pinned.contains_key(&df.id()) {
            return Ok(df.clone());
        }

        let hold = match &level {
            PersistLevel::Memory => {
                let bytes = frame.memory_size();
                let reservation = MemoryReservation::try_new(self.memory.clone(), bytes)?;
                info!("[{ENGINE_NAME}] pinned {} ({bytes} bytes)", df.id());
                Hold::Memory(reservation)
            }
            PersistLevel::Disk(dir) => {
                let files = self.spill(df, frame, dir)?;
                info!(
                    "[{ENGINE_NAME}] pinned {} with {} spill files under {}",
                    df.id(),
                    files.len(),
                    dir.display()
                );
                Hold::Disk(files)
            }
        };
        pinned.insert(
            df.id(),
            Pin {
                _partitions: frame.partitions().to_vec(),
                hold,
            },
        );
        self.metrics.record(ops::PERSIST, df.count(), df.count(), timer.elapsed());
        Ok(df.clone().with_persist_level(Some(level)))
    }

    async fn unpersist(&self, df: &DataFrame) -> StrataResult<()> {
        let timer = ExecutionTimer::start();
        df.check_engine(self)?;
        let pin = self.pinned.lock().expect("pin lock poisoned").remove(&df.id());
        match pin.map(|p| p.hold) {
            Some(Hold::Memory(reservation)) => {
                debug!("[{ENGINE_NAME}] unpinned {} ({} bytes)", df.id(), reservation.size());
            }
            Some(Hold::Disk(files)) => {
                for file in &files {
                    remove_file(file).map_err(|e| e.into_engine_fault(ENGINE_NAME))?;
                }
                if let Some(dir) = files.first().and_then(|f| f.parent()) {
                    let _ = std::fs::remove_dir(dir);
                }
                debug!("[{ENGINE_NAME}] unpinned {} and removed {} spill files", df.id(), files.len());
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
        for (p, batch) in exchange::gather(frame, &df.schema().to_arrow())?.into_iter().enumerate() {
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
        let batches = exchange::gather(self.frame(df)?, &df.schema().to_arrow())?;
        self.metrics.record(ops::COLLECT, df.count(), df.count(), timer.elapsed());
        Ok(batches)
    }
}
