//! Position of a partition slice handed to a per-partition function.

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Identifies the slice a per-partition function is processing.
///
/// When a task is partitioned by keys, each physical partition is split into
/// slices of rows sharing the same key values; `key_values` holds those
/// values in key order. Without keys each partition is a single slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCursor {
    /// Physical partition number.
    pub partition_no: usize,
    /// Slice number within the partition.
    pub slice_no: usize,
    /// Partition key names.
    pub keys: Vec<String>,
    /// Key values of this slice, aligned with `keys`.
    pub key_values: Vec<Value>,
}

impl PartitionCursor {
    /// Cursor for a partition without key semantics.
    pub fn new(partition_no: usize) -> Self {
        Self {
            partition_no,
            ..Self::default()
        }
    }

    /// Cursor for one key group.
    pub fn for_keys(
        partition_no: usize,
        slice_no: usize,
        keys: Vec<String>,
        key_values: Vec<Value>,
    ) -> Self {
        Self {
            partition_no,
            slice_no,
            keys,
            key_values,
        }
    }

    /// Value of a key column in this slice.
    pub fn key_value(&self, key: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| &self.key_values[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_lookup() {
        let cursor = PartitionCursor::for_keys(1, 2, vec!["id".into()], vec![Value::Int(7)]);
        assert_eq!(cursor.key_value("id"), Some(&Value::Int(7)));
        assert_eq!(cursor.key_value("val"), None);
        assert_eq!(PartitionCursor::new(3).partition_no, 3);
    }
}
