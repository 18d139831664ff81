//! Data movement between workers.
//!
//! An exchange is a synchronization boundary: every source partition is read
//! before any target partition is written.
//!
//! - **Shuffle** redistributes rows by a resolved partition spec.
//! - **Broadcast** copies every partition to every other worker.
//! - **Gather** brings every partition back to the coordinator.

use std::fmt;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use common_error::StrataResult;
use futures::future::try_join_all;
use log::debug;
use strata_core::partition::partitioner::{concat, partition_batch};
use strata_core::{ResolvedPartitionSpec, cast_batch};

use crate::ENGINE_NAME;
use crate::frame::{ClusterFrame, StoredPartition};
use crate::worker::Cluster;

/// Kind of exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExchangeMode {
    /// Repartition rows across workers.
    #[default]
    Shuffle,
    /// Replicate to all workers.
    Broadcast,
}

impl fmt::Display for ExchangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shuffle => write!(f, "Shuffle"),
            Self::Broadcast => write!(f, "Broadcast"),
        }
    }
}

/// What an exchange moved.
#[derive(Debug, Clone, Default)]
pub struct ExchangeStats {
    /// Kind of exchange.
    pub mode: ExchangeMode,
    /// Rows written per target partition (per target worker for a
    /// broadcast).
    pub rows_sent: Vec<usize>,
    /// Encoded bytes written.
    pub bytes_sent: usize,
}

impl ExchangeStats {
    fn new(mode: ExchangeMode, num_partitions: usize) -> Self {
        Self {
            mode,
            rows_sent: vec![0; num_partitions],
            bytes_sent: 0,
        }
    }

    fn record(&mut self, partition: usize, rows: usize, bytes: usize) {
        if let Some(sent) = self.rows_sent.get_mut(partition) {
            *sent += rows;
        }
        self.bytes_sent += bytes;
    }

    /// Total rows written.
    pub fn total_rows(&self) -> usize {
        self.rows_sent.iter().sum()
    }
}

/// Every partition of `frame` in the canonical layout.
pub(crate) fn gather(frame: &ClusterFrame, canonical: &SchemaRef) -> StrataResult<Vec<RecordBatch>> {
    frame
        .fetch_all()?
        .iter()
        .map(|batch| cast_batch(batch, canonical))
        .collect()
}

/// Redistribute `frame` into `num_partitions` partitions by `spec`.
///
/// Rows are routed with the shared partitioner, so a shuffle produces the
/// same distribution as any other engine would.
pub(crate) fn shuffle(
    cluster: &Cluster,
    frame: &ClusterFrame,
    canonical: &SchemaRef,
    spec: &ResolvedPartitionSpec,
    num_partitions: usize,
) -> StrataResult<(Vec<Arc<StoredPartition>>, ExchangeStats)> {
    for part in frame.partitions() {
        cluster
            .faults()
            .check(ENGINE_NAME, part.worker().id(), "shuffle")?;
    }
    let all = concat(canonical, &gather(frame, canonical)?)?;
    let native = frame.native_schema();

    let mut stats = ExchangeStats::new(ExchangeMode::Shuffle, num_partitions);
    let mut out = Vec::with_capacity(num_partitions);
    for (p, part) in partition_batch(&all, spec, num_partitions)?.into_iter().enumerate() {
        let part = cast_batch(&part, native)?;
        let stored = StoredPartition::store(cluster.worker_for(p), native, &part)?;
        stats.record(p, stored.num_rows(), stored.size());
        out.push(Arc::new(stored));
    }
    debug!(
        "[{ENGINE_NAME}] shuffled {} rows into {num_partitions} partitions ({} bytes)",
        stats.total_rows(),
        stats.bytes_sent
    );
    Ok((out, stats))
}

/// Copy every partition of `frame` to each worker not already hosting it.
/// Workers are filled concurrently.
pub(crate) async fn broadcast(
    cluster: &Cluster,
    frame: &ClusterFrame,
) -> StrataResult<(Vec<Arc<StoredPartition>>, ExchangeStats)> {
    let per_worker = cluster.workers().iter().map(|worker| async move {
        frame
            .partitions()
            .iter()
            .filter(|part| part.worker().id() != worker.id())
            .map(|part| part.replicate_to(worker).map(Arc::new))
            .collect::<StrataResult<Vec<_>>>()
    });
    let replicas: Vec<Arc<StoredPartition>> = try_join_all(per_worker).await?.into_iter().flatten().collect();

    let mut stats = ExchangeStats::new(ExchangeMode::Broadcast, cluster.num_workers());
    for replica in &replicas {
        stats.record(replica.worker().id().index(), replica.num_rows(), replica.size());
    }
    debug!(
        "[{ENGINE_NAME}] broadcast {} partitions as {} replicas ({} bytes)",
        frame.partitions().len(),
        replicas.len(),
        stats.bytes_sent
    );
    Ok((replicas, stats))
}
