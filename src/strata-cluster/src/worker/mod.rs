//! Workers and their object stores.

mod task;

pub(crate) use task::WorkerTask;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use common_error::{StrataError, StrataResult};

use crate::fault::FaultInjector;

/// Identity of a worker within its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Worker number `index`.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index of the worker.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// Key of an object in a worker's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// A worker process: an object store of Arrow IPC-encoded partitions.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    store: Mutex<HashMap<ObjectId, Arc<[u8]>>>,
    next_object: AtomicU64,
}

impl Worker {
    /// Start an empty worker.
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            store: Mutex::new(HashMap::new()),
            next_object: AtomicU64::new(1),
        }
    }

    /// Worker identity.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Store `bytes` and return their key.
    pub fn put(&self, bytes: Vec<u8>) -> ObjectId {
        let object = ObjectId(self.next_object.fetch_add(1, Ordering::Relaxed));
        self.store
            .lock()
            .expect("object store lock poisoned")
            .insert(object, Arc::from(bytes));
        object
    }

    /// Bytes of `object`. Fails with a permanent engine fault when the
    /// object is gone.
    pub fn get(&self, object: ObjectId) -> StrataResult<Arc<[u8]>> {
        self.store
            .lock()
            .expect("object store lock poisoned")
            .get(&object)
            .cloned()
            .ok_or_else(|| {
                StrataError::execution(
                    crate::ENGINE_NAME,
                    format!("{object} is no longer stored on {}", self.id),
                )
            })
    }

    /// Remove `object`. Returns whether it was stored.
    pub fn delete(&self, object: ObjectId) -> bool {
        self.store
            .lock()
            .expect("object store lock poisoned")
            .remove(&object)
            .is_some()
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.store.lock().expect("object store lock poisoned").len()
    }

    /// Total size of stored objects in bytes.
    pub fn stored_bytes(&self) -> usize {
        self.store
            .lock()
            .expect("object store lock poisoned")
            .values()
            .map(|bytes| bytes.len())
            .sum()
    }
}

/// The set of workers behind one engine.
#[derive(Debug)]
pub struct Cluster {
    workers: Vec<Arc<Worker>>,
    faults: FaultInjector,
}

impl Cluster {
    /// Start `num_workers` workers (at least one).
    pub fn start(num_workers: usize) -> Self {
        Self {
            workers: (0..num_workers.max(1))
                .map(|i| Arc::new(Worker::new(WorkerId::new(i))))
                .collect(),
            faults: FaultInjector::new(),
        }
    }

    /// All workers.
    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Number of workers.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Worker that hosts partition `partition`.
    pub fn worker_for(&self, partition: usize) -> &Arc<Worker> {
        &self.workers[partition % self.workers.len()]
    }

    /// Fault hooks shared by every worker.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Objects stored across all workers.
    pub fn live_objects(&self) -> usize {
        self.workers.iter().map(|w| w.object_count()).sum()
    }

    /// Bytes stored across all workers.
    pub fn stored_bytes(&self) -> usize {
        self.workers.iter().map(|w| w.stored_bytes()).sum()
    }
}
