//! Core data model for Strata workflows.
//!
//! This crate provides the backend-independent pieces every engine agrees on:
//! - `LogicalType` and `Value` for the type system
//! - `Schema`, `Field` and `SchemaContract` for typed tabular data
//! - `TypeMapping` for translating logical types to engine-native Arrow types
//! - `PartitionSpec`, the partitioner and `PartitionCursor` for data distribution

#![allow(clippy::module_inception)] // schema/schema.rs mirrors the type name

pub mod convert;
pub mod mapping;
pub mod partition;
pub mod schema;
pub mod types;

mod proptest_utils;

// Re-export commonly used types
pub use convert::{batch_to_rows, cast_batch, rows_to_batch};
pub use mapping::{CanonicalTypeMapping, TypeMapping};
pub use partition::{
    PartitionAlgo, PartitionCursor, PartitionKind, PartitionSpec, ResolvedPartitionSpec, SortKey,
};
pub use schema::{Field, Schema, SchemaContract};
pub use types::{LogicalType, Value};
