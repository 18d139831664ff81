//! Partition specifications and the shared partitioner.
//!
//! A [`PartitionSpec`] says how rows are grouped, distributed and ordered
//! before a task runs. [`partitioner`] implements the distribution itself so
//! that every engine assigns the same rows to the same partition numbers.

mod cursor;
pub mod partitioner;
mod spec;

pub use cursor::PartitionCursor;
pub use spec::{PartitionAlgo, PartitionKind, PartitionSpec, ResolvedPartitionSpec, SortKey};
