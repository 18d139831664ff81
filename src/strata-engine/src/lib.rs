//! Execution engine contract for Strata.
//!
//! This crate defines what every backend adapter must provide and the
//! handles that flow between the driver and an engine:
//!
//! - [`DataFrame`]: an immutable handle to engine-resident data plus its
//!   [`Schema`](strata_core::Schema), bound to the engine that produced it
//! - [`ExecutionEngine`]: ingestion, repartitioning, partition maps,
//!   broadcast, persistence and output
//! - [`Transformer`]: the per-partition function applied by `map_partitions`
//! - [`TabularSource`] and [`Sink`]: the ingestion and output boundaries
//! - [`LocalEngine`]: the in-process reference engine
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = LocalEngine::new(LocalEngineConfig::default());
//! let df = engine.to_dataframe(TabularSource::rows(schema, rows)).await?;
//! let df = engine.repartition(&df, &PartitionSpec::by_keys(["id"])).await?;
//! ```

#![allow(clippy::module_name_repetitions)] // LocalEngine, EngineMetrics read better qualified

mod engine;
pub mod frame;
pub mod local;
pub mod memory;
pub mod metrics;
mod sink;
mod source;
pub mod spill;
mod transformer;

pub use engine::{ExecutionEngine, PersistLevel, ops, transfer};
pub use frame::{DataFrame, DataFrames, EngineId, FrameId, NativeFrame};
pub use local::{LocalEngine, LocalEngineConfig};
pub use memory::{MemoryManager, MemoryReservation, TrackingMemoryManager};
pub use metrics::{EngineMetrics, ExecutionTimer, OperationMetrics};
pub use sink::{IpcFileSink, MemorySink, Sink};
pub use source::TabularSource;
pub use transformer::{FnTransformer, Transformer, conform_output, transformer_fn};
