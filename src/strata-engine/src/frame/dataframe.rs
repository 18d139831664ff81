//! The DataFrame handle.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common_error::{StrataError, StrataResult};
use strata_core::{ResolvedPartitionSpec, Schema};

use crate::engine::{ExecutionEngine, PersistLevel};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Identity of the data behind a frame. Handles derived by `persist` or
/// `broadcast` share the id of the frame they were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for file and object names.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Engine-owned data behind a [`DataFrame`].
///
/// Only the engine that created a native frame knows its concrete type; it
/// recovers it with [`DataFrame::native_as`].
pub trait NativeFrame: Send + Sync + fmt::Debug {
    /// Total number of rows. May require engine-side evaluation.
    fn num_rows(&self) -> usize;

    /// Number of physical partitions.
    fn num_partitions(&self) -> usize;

    /// Approximate in-memory size in bytes.
    fn memory_size(&self) -> usize;

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
}

/// Handle to an engine-resident table plus its schema.
///
/// Handles are immutable and cheap to clone. Every handle is bound to the
/// engine instance that produced it; passing it to another engine fails
/// with `EngineMismatchError`.
#[derive(Clone)]
pub struct DataFrame {
    id: FrameId,
    schema: Schema,
    engine: EngineId,
    engine_name: Arc<str>,
    native: Arc<dyn NativeFrame>,
    partitioning: Option<ResolvedPartitionSpec>,
    broadcast: bool,
    persist_level: Option<PersistLevel>,
}

impl DataFrame {
    /// Wrap native data produced by `engine`. Intended for engine
    /// implementations.
    pub fn new(engine: &dyn ExecutionEngine, schema: Schema, native: Arc<dyn NativeFrame>) -> Self {
        Self {
            id: FrameId::next(),
            schema,
            engine: engine.id(),
            engine_name: Arc::from(engine.name()),
            native,
            partitioning: None,
            broadcast: false,
            persist_level: None,
        }
    }

    /// Frame identity.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The frame's schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Id of the producing engine.
    pub fn engine_id(&self) -> EngineId {
        self.engine
    }

    /// Name of the producing engine.
    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Current distribution, if the frame was explicitly partitioned.
    pub fn partitioning(&self) -> Option<&ResolvedPartitionSpec> {
        self.partitioning.as_ref()
    }

    /// Whether the frame was marked for broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Persistence level, if persisted.
    pub fn persist_level(&self) -> Option<&PersistLevel> {
        self.persist_level.as_ref()
    }

    /// Number of physical partitions.
    pub fn num_partitions(&self) -> usize {
        self.native.num_partitions()
    }

    /// Number of rows. May trigger engine-side evaluation.
    pub fn count(&self) -> usize {
        self.native.num_rows()
    }

    /// Check whether the frame has no rows. May trigger engine-side evaluation.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Approximate in-memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.native.memory_size()
    }

    /// Fail with `EngineMismatchError` unless `engine` produced this frame.
    pub fn check_engine(&self, engine: &dyn ExecutionEngine) -> StrataResult<()> {
        self.check_owner(engine.id(), engine.name())
    }

    /// Fail with `EngineMismatchError` unless the engine identified by `id`
    /// produced this frame.
    pub fn check_owner(&self, id: EngineId, name: &str) -> StrataResult<()> {
        if id == self.engine {
            Ok(())
        } else {
            Err(StrataError::engine_mismatch(format!(
                "{} was produced by {} ({}) and cannot be used with {name} ({id})",
                self.id, self.engine_name, self.engine
            )))
        }
    }

    /// The native handle, available only to the producing engine.
    pub fn as_native(&self, engine: &dyn ExecutionEngine) -> StrataResult<&dyn NativeFrame> {
        self.check_engine(engine)?;
        Ok(self.native.as_ref())
    }

    /// The native handle downcast to the engine's concrete frame type.
    pub fn native_as<T: NativeFrame + 'static>(
        &self,
        engine: &dyn ExecutionEngine,
    ) -> StrataResult<&T> {
        self.as_native(engine)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| {
                StrataError::internal(format!(
                    "{} holds a native frame of an unexpected type",
                    self.id
                ))
            })
    }

    /// A handle to new native data with a new identity, produced by the same
    /// engine.
    pub fn derive(&self, schema: Schema, native: Arc<dyn NativeFrame>) -> Self {
        Self {
            id: FrameId::next(),
            schema,
            engine: self.engine,
            engine_name: self.engine_name.clone(),
            native,
            partitioning: None,
            broadcast: false,
            persist_level: None,
        }
    }

    /// Same data, recorded as distributed by `spec`.
    pub fn with_partitioning(mut self, spec: Option<ResolvedPartitionSpec>) -> Self {
        self.partitioning = spec;
        self
    }

    /// Same data, marked for broadcast.
    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Same identity, recorded as persisted at `level`.
    pub fn with_persist_level(mut self, level: Option<PersistLevel>) -> Self {
        self.persist_level = level;
        self
    }

    /// Same identity, backed by different native data. Used when an engine
    /// relocates data (for example to disk) without changing its content.
    pub fn with_native(mut self, native: Arc<dyn NativeFrame>) -> Self {
        self.native = native;
        self
    }
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame")
            .field("id", &self.id)
            .field("schema", &self.schema.to_string())
            .field("engine", &self.engine_name)
            .field("partitions", &self.native.num_partitions())
            .field("broadcast", &self.broadcast)
            .field("persist_level", &self.persist_level)
            .finish()
    }
}
