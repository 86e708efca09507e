use arrow::array::{Array, ArrayRef, FixedSizeListArray, UInt32Array};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::{FileWriter, IpcWriteOptions};
use arrow::ipc::CompressionType;
use arrow::record_batch::RecordBatch;
use qdaq_foundation::{EventRecord, StorageError};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the single table an acquisition run writes.
pub const TABLE_NAME: &str = "event_data";

fn arrow_err(e: ArrowError) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Append-only store for one acquisition run.
///
/// Rows are fixed-width (`sample_count` unsigned 32-bit amplitudes), appended
/// in arrival order and never rewritten, ZSTD-compressed on the way out.
/// Closing writes the table footer; if the owner unwinds without calling
/// [`EventStore::finish`], `Drop` closes the file so the run stays readable.
pub struct EventStore {
    writer: FileWriter<BufWriter<File>>,
    schema: SchemaRef,
    item_field: FieldRef,
    sample_count: usize,
    rows_written: u64,
    finished: bool,
    path: PathBuf,
}

impl EventStore {
    pub fn create(path: &Path, sample_count: usize) -> Result<Self, StorageError> {
        if sample_count == 0 {
            return Err(StorageError::Backend("row width must be non-zero".into()));
        }
        let item_field: FieldRef = Arc::new(Field::new("item", DataType::UInt32, false));
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            TABLE_NAME,
            DataType::FixedSizeList(Arc::clone(&item_field), sample_count as i32),
            false,
        )]));

        let file = File::create(path)?;
        let options = IpcWriteOptions::default()
            .try_with_compression(Some(CompressionType::ZSTD))
            .map_err(arrow_err)?;
        let writer = FileWriter::try_new_with_options(BufWriter::new(file), &schema, options)
            .map_err(arrow_err)?;

        tracing::info!(path = %path.display(), sample_count, "opened event store");
        Ok(Self {
            writer,
            schema,
            item_field,
            sample_count,
            rows_written: 0,
            finished: false,
            path: path.to_path_buf(),
        })
    }

    /// Appends the records as new rows. The whole batch is rejected if any
    /// record does not match the store's row width; nothing is partially
    /// written.
    pub fn append(&mut self, records: &[EventRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        for record in records {
            if record.len() != self.sample_count {
                return Err(StorageError::RowWidthMismatch {
                    expected: self.sample_count,
                    got: record.len(),
                });
            }
        }

        let mut values = Vec::with_capacity(records.len() * self.sample_count);
        for record in records {
            values.extend_from_slice(record.samples());
        }
        let values: ArrayRef = Arc::new(UInt32Array::from(values));
        let rows = FixedSizeListArray::try_new(
            Arc::clone(&self.item_field),
            self.sample_count as i32,
            values,
            None,
        )
        .map_err(arrow_err)?;
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), vec![Arc::new(rows) as ArrayRef])
            .map_err(arrow_err)?;

        self.writer.write(&batch).map_err(arrow_err)?;
        self.rows_written += records.len() as u64;
        Ok(records.len())
    }

    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.writer.flush().map_err(arrow_err)
    }

    /// Writes the footer and closes the table. Idempotent.
    pub fn finish(&mut self) -> Result<(), StorageError> {
        if self.finished {
            return Ok(());
        }
        self.writer.finish().map_err(arrow_err)?;
        self.finished = true;
        tracing::info!(path = %self.path.display(), rows = self.rows_written, "closed event store");
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.writer.finish() {
                tracing::warn!(path = %self.path.display(), error = %e, "event store closed uncleanly");
            }
        }
    }
}

/// Reads every persisted row of a run back, in append order.
pub fn read_all(path: &Path) -> Result<Vec<EventRecord>, StorageError> {
    let file = File::open(path)?;
    let reader = FileReader::try_new(file, None).map_err(arrow_err)?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(arrow_err)?;
        let rows = batch
            .column(0)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| {
                StorageError::Backend(format!("{TABLE_NAME} column is not a fixed-size list"))
            })?;
        for row in 0..rows.len() {
            let value = rows.value(row);
            let samples = value
                .as_any()
                .downcast_ref::<UInt32Array>()
                .ok_or_else(|| StorageError::Backend("row cells are not u32".into()))?;
            out.push(EventRecord::new(samples.values().to_vec()));
        }
    }
    Ok(out)
}
