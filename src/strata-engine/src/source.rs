//! Tabular ingestion boundary.

use arrow_array::RecordBatch;
use common_error::{StrataError, StrataResult};
use strata_core::{Schema, Value, rows_to_batch};

/// External tabular data handed to `ExecutionEngine::to_dataframe`.
///
/// Either rows of [`Value`]s with an explicit schema, or columnar Arrow
/// batches in the canonical layout.
#[derive(Debug, Clone)]
pub enum TabularSource {
    /// Row-oriented data.
    Rows {
        /// Column layout of every row.
        schema: Schema,
        /// Row values in column order.
        rows: Vec<Vec<Value>>,
    },
    /// Columnar data.
    Batches {
        /// Logical schema of the batches.
        schema: Schema,
        /// Batches in the canonical Arrow layout.
        batches: Vec<RecordBatch>,
    },
}

impl TabularSource {
    /// Row-oriented source.
    pub fn rows(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self::Rows { schema, rows }
    }

    /// Columnar source with an explicit schema. The batches are checked
    /// against it at ingestion.
    pub fn batches(schema: Schema, batches: Vec<RecordBatch>) -> Self {
        Self::Batches { schema, batches }
    }

    /// Columnar source whose schema is read from the first batch.
    ///
    /// Fails with `ConversionError` when the list is empty or the layout has
    /// no logical counterpart.
    pub fn from_batches(batches: Vec<RecordBatch>) -> StrataResult<Self> {
        let first = batches.first().ok_or_else(|| {
            StrataError::conversion("cannot infer a schema from an empty batch list")
        })?;
        let schema = Schema::from_arrow(&first.schema())?;
        Ok(Self::Batches { schema, batches })
    }

    /// Logical schema of the source.
    pub fn schema(&self) -> &Schema {
        match self {
            Self::Rows { schema, .. } | Self::Batches { schema, .. } => schema,
        }
    }

    /// Convert into canonical batches, validating every batch's layout.
    pub fn into_batches(self) -> StrataResult<(Schema, Vec<RecordBatch>)> {
        match self {
            Self::Rows { schema, rows } => {
                let batch = rows_to_batch(&schema, &rows)?;
                Ok((schema, vec![batch]))
            }
            Self::Batches { schema, batches } => {
                for (i, batch) in batches.iter().enumerate() {
                    let found = Schema::from_arrow(&batch.schema())?;
                    if found != schema {
                        return Err(StrataError::conversion(format!(
                            "batch {i} has layout [{found}] but the source declares [{schema}]"
                        )));
                    }
                }
                Ok((schema, batches))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int64Array, LargeStringArray};
    use arrow_schema::{DataType, Field, Schema as ArrowSchema};

    use super::*;

    #[test]
    fn test_rows_source() {
        let schema: Schema = "id:long".parse().unwrap();
        let source = TabularSource::rows(schema.clone(), vec![vec![Value::Int(1)]]);
        assert_eq!(source.schema(), &schema);
        let (_, batches) = source.into_batches().unwrap();
        assert_eq!(batches[0].num_rows(), 1);
    }

    #[test]
    fn test_from_batches_infers_schema() {
        let batch = RecordBatch::try_new(
            Arc::new(ArrowSchema::new(vec![Field::new("id", DataType::Int64, true)])),
            vec![Arc::new(Int64Array::from(vec![1, 2]))],
        )
        .unwrap();
        let source = TabularSource::from_batches(vec![batch]).unwrap();
        assert_eq!(source.schema().to_string(), "id:long");
        assert!(TabularSource::from_batches(vec![]).is_err());
    }

    #[test]
    fn test_unsupported_layout() {
        let batch = RecordBatch::try_new(
            Arc::new(ArrowSchema::new(vec![Field::new("s", DataType::LargeUtf8, true)])),
            vec![Arc::new(LargeStringArray::from(vec!["x"]))],
        )
        .unwrap();
        let err = TabularSource::from_batches(vec![batch]).unwrap_err();
        assert!(matches!(err, StrataError::ConversionError(_)));
    }

    #[test]
    fn test_batches_must_match_declared_schema() {
        let batch = RecordBatch::try_new(
            Arc::new(ArrowSchema::new(vec![Field::new("id", DataType::Int64, true)])),
            vec![Arc::new(Int64Array::from(vec![1]))],
        )
        .unwrap();
        let source = TabularSource::batches("id:int".parse().unwrap(), vec![batch]);
        assert!(matches!(
            source.into_batches(),
            Err(StrataError::ConversionError(_))
        ));
    }
}
