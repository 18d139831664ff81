//! Conversions between rows of [`Value`]s and Arrow record batches.

use std::sync::Arc;

use arrow::compute::cast;
use arrow_array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int8Array,
    Int16Array, Int32Array, Int64Array, RecordBatch, RecordBatchOptions, StringArray,
    TimestampMicrosecondArray, UInt8Array, UInt16Array, UInt32Array, UInt64Array,
};
use arrow_schema::SchemaRef;
use common_error::{StrataError, StrataResult};

use crate::schema::{Field, Schema};
use crate::types::{LogicalType, Value};

fn mismatch(field: &Field, row: usize, value: &Value) -> StrataError {
    StrataError::conversion(format!(
        "row {row}: column '{}' expects {} but got {} ({value})",
        field.name,
        field.data_type,
        value.type_name()
    ))
}

/// Collect one column, converting each cell with `f`. Nulls pass through.
fn column<T>(
    field: &Field,
    rows: &[Vec<Value>],
    idx: usize,
    f: impl Fn(&Value) -> Option<T>,
) -> StrataResult<Vec<Option<T>>> {
    rows.iter()
        .enumerate()
        .map(|(r, row)| match &row[idx] {
            Value::Null => Ok(None),
            v => f(v).map(Some).ok_or_else(|| mismatch(field, r, v)),
        })
        .collect()
}

macro_rules! int_column {
    ($field:expr, $rows:expr, $idx:expr, $native:ty, $array:ty, $getter:ident) => {{
        let values = column($field, $rows, $idx, |v| {
            v.$getter().and_then(|x| <$native>::try_from(x).ok())
        })?;
        Arc::new(<$array>::from(values)) as ArrayRef
    }};
}

fn build_column(field: &Field, rows: &[Vec<Value>], idx: usize) -> StrataResult<ArrayRef> {
    let array: ArrayRef = match &field.data_type {
        LogicalType::Bool => Arc::new(BooleanArray::from(column(field, rows, idx, Value::as_bool)?)),
        LogicalType::Int8 => int_column!(field, rows, idx, i8, Int8Array, as_i64),
        LogicalType::Int16 => int_column!(field, rows, idx, i16, Int16Array, as_i64),
        LogicalType::Int32 => int_column!(field, rows, idx, i32, Int32Array, as_i64),
        LogicalType::Int64 => int_column!(field, rows, idx, i64, Int64Array, as_i64),
        LogicalType::UInt8 => int_column!(field, rows, idx, u8, UInt8Array, as_u64),
        LogicalType::UInt16 => int_column!(field, rows, idx, u16, UInt16Array, as_u64),
        LogicalType::UInt32 => int_column!(field, rows, idx, u32, UInt32Array, as_u64),
        LogicalType::UInt64 => int_column!(field, rows, idx, u64, UInt64Array, as_u64),
        LogicalType::Float32 => {
            let values = column(field, rows, idx, |v| v.as_f64().map(|f| f as f32))?;
            Arc::new(Float32Array::from(values))
        }
        LogicalType::Float64 => Arc::new(Float64Array::from(column(field, rows, idx, Value::as_f64)?)),
        LogicalType::String => {
            let values = column(field, rows, idx, |v| v.as_str().map(str::to_string))?;
            Arc::new(StringArray::from(values))
        }
        LogicalType::Binary => {
            let values = column(field, rows, idx, |v| match v {
                Value::Binary(b) => Some(b.clone()),
                _ => None,
            })?;
            Arc::new(BinaryArray::from_iter(values))
        }
        LogicalType::Date => {
            let values = column(field, rows, idx, |v| match v {
                Value::Date(d) => Some(*d),
                _ => None,
            })?;
            Arc::new(Date32Array::from(values))
        }
        LogicalType::Timestamp => {
            let values = column(field, rows, idx, |v| match v {
                Value::Timestamp(t) => Some(*t),
                _ => None,
            })?;
            Arc::new(TimestampMicrosecondArray::from(values))
        }
        nested @ (LogicalType::List(_) | LogicalType::Struct(_)) => {
            return Err(StrataError::conversion(format!(
                "row-oriented ingestion does not support nested column '{}' of type {nested}; \
                 supply columnar batches instead",
                field.name
            )));
        }
    };
    Ok(array)
}

/// Build a canonical record batch from rows.
///
/// Fails with `ConversionError` when a row has the wrong arity, a value does
/// not fit its column type, or a column is nested.
pub fn rows_to_batch(schema: &Schema, rows: &[Vec<Value>]) -> StrataResult<RecordBatch> {
    for (r, row) in rows.iter().enumerate() {
        if row.len() != schema.len() {
            return Err(StrataError::conversion(format!(
                "row {r} has {} values but the schema [{schema}] has {} columns",
                row.len(),
                schema.len()
            )));
        }
    }
    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| build_column(field, rows, idx))
        .collect::<StrataResult<Vec<_>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(
        schema.to_arrow(),
        columns,
        &options,
    )?)
}

/// Read every row of a batch.
pub fn batch_to_rows(batch: &RecordBatch) -> StrataResult<Vec<Vec<Value>>> {
    (0..batch.num_rows())
        .map(|row| {
            batch
                .columns()
                .iter()
                .map(|col| Value::from_array(col.as_ref(), row))
                .collect()
        })
        .collect()
}

/// Cast a batch to `target`, column by column.
///
/// Column counts must agree; names are taken from `target`.
pub fn cast_batch(batch: &RecordBatch, target: &SchemaRef) -> StrataResult<RecordBatch> {
    if batch.schema().as_ref() == target.as_ref() {
        return Ok(batch.clone());
    }
    if batch.num_columns() != target.fields().len() {
        return Err(StrataError::conversion(format!(
            "cannot cast a batch with {} columns to a schema with {}",
            batch.num_columns(),
            target.fields().len()
        )));
    }
    let columns = batch
        .columns()
        .iter()
        .zip(target.fields())
        .map(|(col, field)| cast(col, field.data_type()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StrataError::conversion(e.to_string()))?;
    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        target.clone(),
        columns,
        &options,
    )?)
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType as ArrowType;

    use super::*;

    fn schema(expr: &str) -> Schema {
        expr.parse().unwrap()
    }

    fn rows() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int(1), Value::from("a")],
            vec![Value::Int(2), Value::Null],
        ]
    }

    #[test]
    fn test_rows_roundtrip() {
        let batch = rows_to_batch(&schema("id:int,val:str"), &rows()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).data_type(), &ArrowType::Int32);
        assert_eq!(batch_to_rows(&batch).unwrap(), rows());
    }

    #[test]
    fn test_empty_rows() {
        let batch = rows_to_batch(&schema("id:int"), &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        let batch = rows_to_batch(&Schema::empty(), &[vec![], vec![]]).unwrap();
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn test_arity_mismatch() {
        let err = rows_to_batch(&schema("id:int"), &rows()).unwrap_err();
        assert!(matches!(err, StrataError::ConversionError(_)));
    }

    #[test]
    fn test_type_mismatch_and_overflow() {
        let err = rows_to_batch(&schema("id:str"), &[vec![Value::Int(1)]]).unwrap_err();
        assert!(err.to_string().contains("expects str"), "{err}");

        let err = rows_to_batch(&schema("id:byte"), &[vec![Value::Int(300)]]).unwrap_err();
        assert!(matches!(err, StrataError::ConversionError(_)));

        let err = rows_to_batch(&schema("id:uint"), &[vec![Value::Int(-1)]]).unwrap_err();
        assert!(matches!(err, StrataError::ConversionError(_)));
    }

    #[test]
    fn test_nested_rows_rejected() {
        let err = rows_to_batch(&schema("l:[int]"), &[vec![Value::List(vec![])]]).unwrap_err();
        assert!(matches!(err, StrataError::ConversionError(_)));
    }

    #[test]
    fn test_cast_batch() {
        let batch = rows_to_batch(&schema("id:int,val:str"), &rows()).unwrap();
        let target = Arc::new(arrow_schema::Schema::new(vec![
            arrow_schema::Field::new("id", ArrowType::Int32, true),
            arrow_schema::Field::new("val", ArrowType::LargeUtf8, true),
        ]));
        let cast = cast_batch(&batch, &target).unwrap();
        assert_eq!(cast.schema().field(1).data_type(), &ArrowType::LargeUtf8);
        assert_eq!(batch_to_rows(&cast).unwrap(), rows());

        let back = cast_batch(&cast, &batch.schema()).unwrap();
        assert_eq!(back, batch);
    }
}
