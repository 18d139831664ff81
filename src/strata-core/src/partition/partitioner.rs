//! Row distribution shared by every engine.
//!
//! Engines hold data in different physical layouts, but they all route rows
//! through these functions. For the same input rows and the same resolved
//! spec, every engine therefore builds identical partitions.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use arrow::compute::{concat_batches, take_record_batch};
use arrow_array::{RecordBatch, UInt32Array};
use arrow_schema::SchemaRef;
use common_error::{StrataError, StrataResult};
use log::trace;

use super::{PartitionAlgo, ResolvedPartitionSpec, SortKey};
use crate::types::Value;

// =============================================================================
// Column access
// =============================================================================

fn column_index(batch: &RecordBatch, name: &str) -> StrataResult<usize> {
    batch.schema().index_of(name).map_err(|_| {
        StrataError::partition(format!("column '{name}' not found in partitioned data"))
    })
}

/// Values of the named columns for every row.
pub fn row_values(batch: &RecordBatch, columns: &[String]) -> StrataResult<Vec<Vec<Value>>> {
    let indices = columns
        .iter()
        .map(|c| column_index(batch, c))
        .collect::<StrataResult<Vec<_>>>()?;
    (0..batch.num_rows())
        .map(|row| {
            indices
                .iter()
                .map(|&i| Value::from_array(batch.column(i).as_ref(), row))
                .collect()
        })
        .collect()
}

/// Hash of a row's key values.
///
/// Uses `DefaultHasher` with its fixed default keys, so every engine in one
/// build routes a key to the same partition. The value is not guaranteed to
/// be the same across Rust releases and must not be persisted.
pub fn hash_key(values: &[Value]) -> u64 {
    let mut hasher = DefaultHasher::new();
    values.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Assignment
// =============================================================================

/// Partition number for every row of `batch`.
pub fn assign_rows(
    batch: &RecordBatch,
    spec: &ResolvedPartitionSpec,
    num_partitions: usize,
) -> StrataResult<Vec<usize>> {
    let rows = batch.num_rows();
    let n = num_partitions.max(1);
    let assignment = match (spec.algo, spec.keys.is_empty()) {
        (PartitionAlgo::Hash, false) => row_values(batch, &spec.keys)?
            .iter()
            .map(|key| (hash_key(key) % n as u64) as usize)
            .collect(),
        (PartitionAlgo::Even, false) => {
            let keys = row_values(batch, &spec.keys)?;
            let mut groups: BTreeMap<&Vec<Value>, usize> = BTreeMap::new();
            for key in &keys {
                groups.entry(key).or_default();
            }
            let total = groups.len();
            for (idx, slot) in groups.values_mut().enumerate() {
                *slot = idx * n / total;
            }
            keys.iter().map(|k| groups[k]).collect()
        }
        (PartitionAlgo::RoundRobin, _) => (0..rows).map(|i| i % n).collect(),
        (PartitionAlgo::Even, true) => (0..rows).map(|i| i * n / rows).collect(),
        (PartitionAlgo::Hash, true) => {
            return Err(StrataError::partition(
                "hash partitioning requires partition keys",
            ));
        }
    };
    Ok(assignment)
}

// =============================================================================
// Ordering
// =============================================================================

/// Stable sort of row indices by `keys` ascending, then by `presort`.
fn sort_indices(
    batch: &RecordBatch,
    indices: &mut [u32],
    keys: &[String],
    presort: &[SortKey],
) -> StrataResult<()> {
    let mut columns: Vec<String> = keys.to_vec();
    columns.extend(presort.iter().map(|s| s.column.clone()));
    let mut ascending = vec![true; keys.len()];
    ascending.extend(presort.iter().map(|s| s.ascending));

    let values = row_values(batch, &columns)?;
    indices.sort_by(|&a, &b| {
        let (ra, rb) = (&values[a as usize], &values[b as usize]);
        for (i, asc) in ascending.iter().enumerate() {
            let ord = ra[i].cmp(&rb[i]);
            let ord = if *asc { ord } else { ord.reverse() };
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

/// Sort a batch by keys then presort columns. Rows comparing equal keep
/// their relative order.
pub fn sort_batch(
    batch: &RecordBatch,
    keys: &[String],
    presort: &[SortKey],
) -> StrataResult<RecordBatch> {
    if keys.is_empty() && presort.is_empty() {
        return Ok(batch.clone());
    }
    let mut indices: Vec<u32> = (0..batch.num_rows() as u32).collect();
    sort_indices(batch, &mut indices, keys, presort)?;
    Ok(take_record_batch(batch, &UInt32Array::from(indices))?)
}

// =============================================================================
// Partitioning
// =============================================================================

/// Split `batch` into exactly `num_partitions` batches according to `spec`.
///
/// Empty partitions are returned as empty batches. When the spec has keys or
/// presort columns, each partition is sorted by them.
pub fn partition_batch(
    batch: &RecordBatch,
    spec: &ResolvedPartitionSpec,
    num_partitions: usize,
) -> StrataResult<Vec<RecordBatch>> {
    let n = num_partitions.max(1);
    let assignment = assign_rows(batch, spec, n)?;

    let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (row, &p) in assignment.iter().enumerate() {
        buckets[p].push(row as u32);
    }
    trace!(
        "partitioned {} rows into {n} partitions ({}, sizes {:?})",
        batch.num_rows(),
        spec.algo,
        buckets.iter().map(Vec::len).collect::<Vec<_>>()
    );

    buckets
        .into_iter()
        .map(|mut rows| {
            if spec.requires_sort() {
                sort_indices(batch, &mut rows, &spec.keys, &spec.presort)?;
            }
            Ok(take_record_batch(batch, &UInt32Array::from(rows))?)
        })
        .collect()
}

/// Split a batch sorted by `keys` into contiguous runs of equal key values.
pub fn split_key_groups(
    batch: &RecordBatch,
    keys: &[String],
) -> StrataResult<Vec<(Vec<Value>, RecordBatch)>> {
    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    if keys.is_empty() {
        return Ok(vec![(Vec::new(), batch.clone())]);
    }
    let values = row_values(batch, keys)?;
    let mut groups = Vec::new();
    let mut start = 0;
    for row in 1..=values.len() {
        if row == values.len() || values[row] != values[start] {
            groups.push((values[start].clone(), batch.slice(start, row - start)));
            start = row;
        }
    }
    Ok(groups)
}

/// Concatenate batches sharing `schema`. An empty list yields an empty batch.
pub fn concat(schema: &SchemaRef, batches: &[RecordBatch]) -> StrataResult<RecordBatch> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema.clone()));
    }
    Ok(concat_batches(schema, batches)?)
}
