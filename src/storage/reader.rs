//! Data File Reader
//!
//! Decodes a data file back into records one record batch at a time.

use std::fs::File;
use std::path::Path;

use arrow_array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::error::{Result, StratumError};
use crate::schema::{Field, FieldType, Record, Schema, PARQUET_FIELD_ID_KEY};

use super::DataFile;

/// Lazy iterator over the records of one data file
pub struct DataFileReader {
    /// Projection target; columns are matched to it by field id, then name
    schema: Schema,
    batches: ParquetRecordBatchReader,
    /// Decoded records of the current batch
    pending: std::vec::IntoIter<Record>,
    path: String,
}

impl DataFileReader {
    /// Open a data file for reading
    ///
    /// Only the Parquet footer is read here; row data is decoded on demand.
    pub fn open(
        table_root: &Path,
        data_file: &DataFile,
        schema: &Schema,
        batch_size: usize,
    ) -> Result<Self> {
        let file = File::open(data_file.location(table_root))?;
        let batches = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(batch_size)
            .build()?;

        Ok(Self {
            schema: schema.clone(),
            batches,
            pending: Vec::new().into_iter(),
            path: data_file.path.clone(),
        })
    }

    /// Path of the file being read (relative to the table root)
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Iterator for DataFileReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(Ok(record));
            }

            let batch = match self.batches.next()? {
                Ok(batch) => batch,
                Err(e) => return Some(Err(StratumError::Arrow(e))),
            };

            match decode_batch(&self.schema, &batch) {
                Ok(records) => self.pending = records.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Read every record of a data file into memory
pub fn read_all(
    table_root: &Path,
    data_file: &DataFile,
    schema: &Schema,
    batch_size: usize,
) -> Result<Vec<Record>> {
    let mut records = Vec::with_capacity(data_file.record_count as usize);
    for record in DataFileReader::open(table_root, data_file, schema, batch_size)? {
        records.push(record?);
    }
    Ok(records)
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Turn a record batch into records following `schema`
///
/// Fields missing from the file decode as null.
fn decode_batch(schema: &Schema, batch: &RecordBatch) -> Result<Vec<Record>> {
    let mut records = vec![Record::new(); batch.num_rows()];

    for field in schema.fields() {
        let column = match find_column(batch, field) {
            Some(column) => column,
            None => continue,
        };

        match field.field_type {
            FieldType::Long => {
                let array = downcast::<Int64Array>(column, field)?;
                for (row, record) in records.iter_mut().enumerate() {
                    if array.is_valid(row) {
                        record.set(field.name.as_str(), array.value(row));
                    }
                }
            }
            FieldType::Double => {
                let array = downcast::<Float64Array>(column, field)?;
                for (row, record) in records.iter_mut().enumerate() {
                    if array.is_valid(row) {
                        record.set(field.name.as_str(), array.value(row));
                    }
                }
            }
            FieldType::String => {
                let array = downcast::<StringArray>(column, field)?;
                for (row, record) in records.iter_mut().enumerate() {
                    if array.is_valid(row) {
                        record.set(field.name.as_str(), array.value(row));
                    }
                }
            }
        }
    }

    Ok(records)
}

/// Locate a field's column: by embedded field id first, then by name
fn find_column<'b>(batch: &'b RecordBatch, field: &Field) -> Option<&'b ArrayRef> {
    let id = field.id.to_string();
    let arrow_schema = batch.schema();
    let by_id = arrow_schema
        .fields()
        .iter()
        .position(|f| f.metadata().get(PARQUET_FIELD_ID_KEY) == Some(&id));

    match by_id {
        Some(index) => Some(batch.column(index)),
        None => batch.column_by_name(&field.name),
    }
}

fn downcast<'b, T: 'static>(column: &'b ArrayRef, field: &Field) -> Result<&'b T> {
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        StratumError::Corruption(format!(
            "column '{}' (id {}) has type {}, expected {}",
            field.name,
            field.id,
            column.data_type(),
            field.field_type
        ))
    })
}
