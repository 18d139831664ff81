//! Delegate execution engine for Strata.
//!
//! [`ClusterEngine`] runs workflows on a cluster of workers, each holding an
//! object store of Arrow IPC-encoded partitions. It differs from the local
//! reference engine in every way the engine contract allows:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        ClusterEngine                          │
//! │   DataFrame ──▶ ClusterFrame { partitions, replicas }         │
//! ├───────────────────────────────────────────────────────────────┤
//! │  worker#0          worker#1          ...        worker#N-1    │
//! │  ┌─────────┐       ┌─────────┐                  ┌─────────┐   │
//! │  │ obj#1   │       │ obj#1   │                  │ obj#1   │   │
//! │  │ obj#2   │       │ obj#2   │                  │         │   │
//! │  └─────────┘       └─────────┘                  └─────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! - columns are stored in a native layout ([`ClusterTypeMapping`]) and cast
//!   to the canonical layout only at the user-code and collect boundaries
//! - `repartition` is a shuffle [exchange](exchange) between workers
//! - `map_partitions` runs one [`WorkerTask`](worker) per partition
//!   concurrently
//! - `broadcast` replicates partitions to every worker
//! - objects are freed when the last frame referencing them is dropped;
//!   `persist` pins them until `unpersist`
//! - a [`FaultInjector`] makes worker tasks fail on demand

mod config;
mod engine;
pub mod exchange;
mod fault;
mod frame;
mod mapping;
pub mod transport;
pub mod worker;

pub use config::ClusterEngineConfig;
pub use engine::ClusterEngine;
pub use exchange::{ExchangeMode, ExchangeStats};
pub use fault::FaultInjector;
pub use frame::{ClusterFrame, StoredPartition};
pub use mapping::{ClusterTypeMapping, NATIVE_TIME_ZONE};
pub use transport::ArrowTransport;
pub use worker::{Cluster, ObjectId, Worker, WorkerId};

/// Engine name used in logs and engine faults.
pub(crate) const ENGINE_NAME: &str = "cluster";
