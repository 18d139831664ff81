//! The execution engine contract.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use arrow_array::RecordBatch;
use async_trait::async_trait;
use common_error::StrataResult;
use serde::{Deserialize, Serialize};
use strata_core::{PartitionSpec, Schema, TypeMapping};

use crate::frame::{DataFrame, EngineId};
use crate::metrics::EngineMetrics;
use crate::sink::Sink;
use crate::source::TabularSource;
use crate::transformer::Transformer;

/// Operation names used as metric keys.
pub mod ops {
    pub const TO_DATAFRAME: &str = "to_dataframe";
    pub const REPARTITION: &str = "repartition";
    pub const MAP_PARTITIONS: &str = "map_partitions";
    pub const BROADCAST: &str = "broadcast";
    pub const PERSIST: &str = "persist";
    pub const UNPERSIST: &str = "unpersist";
    pub const OUTPUT: &str = "output";
    pub const COLLECT: &str = "collect";
}

/// Where a persisted frame is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistLevel {
    /// Keep in memory, accounted against the engine's memory limit.
    #[default]
    Memory,
    /// Spill to Arrow IPC files under the given directory.
    Disk(PathBuf),
}

impl fmt::Display for PersistLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk(dir) => write!(f, "disk({})", dir.display()),
        }
    }
}

/// The capability contract every backend adapter implements.
///
/// All frames passed in must have been produced by this engine instance;
/// otherwise operations fail with `EngineMismatchError`. Failures inside the
/// backend's physical execution surface as `EngineExecutionError`; errors
/// raised by user functions pass through unchanged.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + fmt::Debug {
    /// Identity of this engine instance.
    fn id(&self) -> EngineId;

    /// Short engine name.
    fn name(&self) -> &str;

    /// Natural parallelism: the partition count used when a spec leaves it open.
    fn default_parallelism(&self) -> usize;

    /// The distribution the engine uses when a task specifies none.
    fn default_partition_spec(&self) -> PartitionSpec {
        PartitionSpec::by_count(i64::try_from(self.default_parallelism()).unwrap_or(i64::MAX))
    }

    /// Mapping between logical types and the engine's native column types.
    fn type_mapping(&self) -> &dyn TypeMapping;

    /// Per-operation call metrics.
    fn metrics(&self) -> &EngineMetrics;

    /// Ingest external tabular data.
    ///
    /// Fails with `ConversionError` on an unsupported layout.
    async fn to_dataframe(&self, source: TabularSource) -> StrataResult<DataFrame>;

    /// Redistribute `df` according to `spec`, preserving rows and schema.
    ///
    /// When the spec has keys or presort columns, rows within each partition
    /// are in a stable sorted order. Fails with `PartitionError` when the spec
    /// does not resolve against the frame's schema.
    async fn repartition(&self, df: &DataFrame, spec: &PartitionSpec) -> StrataResult<DataFrame>;

    /// Apply `func` to each partition of `df` independently.
    ///
    /// A frame partitioned by keys is processed one key group at a time.
    /// Empty partitions are skipped. Every produced batch is checked against
    /// `output_schema`; a mismatch fails with `SchemaContractError`.
    async fn map_partitions(
        &self,
        df: &DataFrame,
        func: Arc<dyn Transformer>,
        output_schema: &Schema,
    ) -> StrataResult<DataFrame>;

    /// Mark `df` for replication to every worker.
    ///
    /// Fails with `ResourceError` above the engine's broadcast threshold.
    async fn broadcast(&self, df: &DataFrame) -> StrataResult<DataFrame>;

    /// Cache `df`. Advisory: never required for correctness.
    async fn persist(&self, df: &DataFrame, level: PersistLevel) -> StrataResult<DataFrame>;

    /// Release everything the engine holds for `df`. Releasing a frame that
    /// holds nothing is a no-op.
    async fn unpersist(&self, df: &DataFrame) -> StrataResult<()>;

    /// Write every partition of `df` to `sink`.
    async fn output(&self, df: &DataFrame, sink: &dyn Sink) -> StrataResult<()>;

    /// Materialize `df` as canonical batches, one per partition.
    async fn collect(&self, df: &DataFrame) -> StrataResult<Vec<RecordBatch>>;

    /// Number of rows of `df`.
    async fn count(&self, df: &DataFrame) -> StrataResult<usize> {
        df.check_owner(self.id(), self.name())?;
        Ok(df.count())
    }
}

/// Move a frame from one engine to another by collecting it and ingesting
/// the batches. Frames cannot otherwise cross engines.
pub async fn transfer(
    df: &DataFrame,
    from: &dyn ExecutionEngine,
    to: &dyn ExecutionEngine,
) -> StrataResult<DataFrame> {
    let batches = from.collect(df).await?;
    log::debug!(
        "transferring {} ({} batches) from {} to {}",
        df.id(),
        batches.len(),
        from.name(),
        to.name()
    );
    to.to_dataframe(TabularSource::batches(df.schema().clone(), batches))
        .await
}
