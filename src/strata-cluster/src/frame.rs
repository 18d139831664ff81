//! Native frame of the cluster engine.

use std::any::Any;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use common_error::StrataResult;
use log::trace;
use strata_core::partition::partitioner::concat;
use strata_engine::NativeFrame;

use crate::ENGINE_NAME;
use crate::transport::ArrowTransport;
use crate::worker::{ObjectId, Worker};

/// One partition stored on a worker. The object is deleted when the last
/// reference goes away.
#[derive(Debug)]
pub struct StoredPartition {
    worker: Arc<Worker>,
    object: ObjectId,
    num_rows: usize,
    size: usize,
}

impl StoredPartition {
    /// Encode `batch` and store it on `worker`.
    pub fn store(worker: &Arc<Worker>, schema: &SchemaRef, batch: &RecordBatch) -> StrataResult<Self> {
        let bytes = ArrowTransport::serialize(schema, std::slice::from_ref(batch))
            .map_err(|e| e.into_engine_fault(ENGINE_NAME))?;
        let size = bytes.len();
        let object = worker.put(bytes);
        Ok(Self {
            worker: worker.clone(),
            object,
            num_rows: batch.num_rows(),
            size,
        })
    }

    /// Copy this partition to `worker`.
    pub fn replicate_to(&self, worker: &Arc<Worker>) -> StrataResult<Self> {
        let bytes = self.worker.get(self.object)?;
        let object = worker.put(bytes.to_vec());
        Ok(Self {
            worker: worker.clone(),
            object,
            num_rows: self.num_rows,
            size: self.size,
        })
    }

    /// Read the partition back as one native batch.
    pub fn fetch(&self, schema: &SchemaRef) -> StrataResult<RecordBatch> {
        let bytes = self.worker.get(self.object)?;
        let batches = ArrowTransport::deserialize(&bytes).map_err(|e| e.into_engine_fault(ENGINE_NAME))?;
        concat(schema, &batches)
    }

    /// Hosting worker.
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Rows in the partition.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for StoredPartition {
    fn drop(&mut self) {
        if self.worker.delete(self.object) {
            trace!("[{ENGINE_NAME}] freed {} on {}", self.object, self.worker.id());
        }
    }
}

/// Partitions of a frame spread across workers, in the cluster's native
/// Arrow layout. Broadcast frames additionally hold a replica of every
/// partition on each other worker.
#[derive(Debug)]
pub struct ClusterFrame {
    schema: SchemaRef,
    partitions: Vec<Arc<StoredPartition>>,
    replicas: Vec<Arc<StoredPartition>>,
}

impl ClusterFrame {
    /// Frame over stored partitions in `schema` (native layout).
    pub fn new(schema: SchemaRef, partitions: Vec<Arc<StoredPartition>>) -> Self {
        Self {
            schema,
            partitions,
            replicas: Vec::new(),
        }
    }

    /// The same partitions plus `replicas`.
    pub fn with_replicas(&self, replicas: Vec<Arc<StoredPartition>>) -> Self {
        Self {
            schema: self.schema.clone(),
            partitions: self.partitions.clone(),
            replicas,
        }
    }

    /// Native Arrow schema.
    pub fn native_schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Stored partitions in order.
    pub fn partitions(&self) -> &[Arc<StoredPartition>] {
        &self.partitions
    }

    /// Broadcast replicas.
    pub fn replicas(&self) -> &[Arc<StoredPartition>] {
        &self.replicas
    }

    /// Every partition as a native batch.
    pub fn fetch_all(&self) -> StrataResult<Vec<RecordBatch>> {
        self.partitions.iter().map(|p| p.fetch(&self.schema)).collect()
    }
}

impl NativeFrame for ClusterFrame {
    fn num_rows(&self) -> usize {
        self.partitions.iter().map(|p| p.num_rows()).sum()
    }

    fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    fn memory_size(&self) -> usize {
        self.partitions.iter().map(|p| p.size()).sum()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use arrow_array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    use super::*;
    use crate::worker::WorkerId;

    fn batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_dropping_last_reference_frees_object() {
        let worker = Arc::new(Worker::new(WorkerId::new(0)));
        let b = batch(vec![1, 2, 3]);
        let stored = Arc::new(StoredPartition::store(&worker, &b.schema(), &b).unwrap());
        assert_eq!(worker.object_count(), 1);

        let frame = ClusterFrame::new(b.schema(), vec![stored.clone()]);
        assert_eq!(frame.num_rows(), 3);
        assert_eq!(frame.fetch_all().unwrap(), vec![b]);

        drop(stored);
        assert_eq!(worker.object_count(), 1);
        drop(frame);
        assert_eq!(worker.object_count(), 0);
    }

    #[test]
    fn test_replica_lives_on_target_worker() {
        let a = Arc::new(Worker::new(WorkerId::new(0)));
        let b = Arc::new(Worker::new(WorkerId::new(1)));
        let data = batch(vec![7]);
        let stored = StoredPartition::store(&a, &data.schema(), &data).unwrap();
        let replica = stored.replicate_to(&b).unwrap();

        assert_eq!(b.object_count(), 1);
        assert_eq!(replica.fetch(&data.schema()).unwrap(), data);
        drop(stored);
        assert_eq!(a.object_count(), 0);
        assert_eq!(b.object_count(), 1);
    }
}
