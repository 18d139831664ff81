//! Arrow IPC files for spilled partitions, checkpoints and file sinks.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use arrow_array::RecordBatch;
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::SchemaRef;
use common_error::StrataResult;

/// Write `batches` to an Arrow IPC file at `path`, creating parent
/// directories as needed.
pub fn write_ipc_file(path: &Path, schema: &SchemaRef, batches: &[RecordBatch]) -> StrataResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);
    let mut writer = FileWriter::try_new(file, schema)?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.finish()?;
    Ok(())
}

/// Read every batch of an Arrow IPC file.
pub fn read_ipc_file(path: &Path) -> StrataResult<Vec<RecordBatch>> {
    let file = BufReader::new(File::open(path)?);
    let reader = FileReader::try_new(file, None)?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

/// Remove a file, ignoring one that is already gone.
pub fn remove_file(path: &Path) -> StrataResult<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
