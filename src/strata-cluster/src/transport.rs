//! Arrow IPC encoding of partitions moved to and from workers.

use std::io::Cursor;

use arrow_array::RecordBatch;
use arrow_ipc::reader::StreamReader;
use arrow_ipc::writer::StreamWriter;
use arrow_schema::SchemaRef;
use common_error::{StrataError, StrataResult};

/// Serializes record batches into the Arrow IPC stream format workers store.
#[derive(Debug, Clone, Copy)]
pub struct ArrowTransport;

impl ArrowTransport {
    /// Encode `batches` as one IPC stream. The schema is always written, so
    /// an empty partition still round-trips with its layout.
    pub fn serialize(schema: &SchemaRef, batches: &[RecordBatch]) -> StrataResult<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut writer = StreamWriter::try_new(&mut buffer, schema)?;
            for batch in batches {
                writer.write(batch)?;
            }
            writer.finish()?;
        }
        Ok(buffer)
    }

    /// Decode every batch of an IPC stream.
    pub fn deserialize(data: &[u8]) -> StrataResult<Vec<RecordBatch>> {
        let reader = StreamReader::try_new(Cursor::new(data), None)?;
        Ok(reader.collect::<Result<Vec<_>, _>>()?)
    }

    /// Schema of an IPC stream, without decoding its batches.
    pub fn read_schema(data: &[u8]) -> StrataResult<SchemaRef> {
        if data.is_empty() {
            return Err(StrataError::conversion("empty IPC stream"));
        }
        let reader = StreamReader::try_new(Cursor::new(data), None)?;
        Ok(reader.schema())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::{Int64Array, LargeStringArray};
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::LargeUtf8, true),
        ]))
    }

    #[test]
    fn test_empty_stream_keeps_schema() {
        let bytes = ArrowTransport::serialize(&schema(), &[]).unwrap();
        assert!(ArrowTransport::deserialize(&bytes).unwrap().is_empty());
        assert_eq!(ArrowTransport::read_schema(&bytes).unwrap(), schema());
    }

    #[test]
    fn test_batches_survive_transport() {
        let batch = RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(LargeStringArray::from(vec![Some("ann"), Some("bob"), None])),
            ],
        )
        .unwrap();

        let bytes = ArrowTransport::serialize(&schema(), &[batch.clone()]).unwrap();
        assert_eq!(ArrowTransport::deserialize(&bytes).unwrap(), vec![batch]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ArrowTransport::read_schema(&[]).is_err());
        assert!(ArrowTransport::deserialize(b"not arrow").is_err());
    }
}
