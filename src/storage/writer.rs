//! Data File Writer
//!
//! Buffers validated records column by column, then writes them to a new
//! Parquet file in one go.

use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{Config, FileCompression};
use crate::error::{Result, StratumError};
use crate::schema::{Field, FieldType, Record, Schema, Value};

use super::{ColumnStats, DataFile, DATA_DIR};

/// Knobs for data file encoding
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub compression: FileCompression,
    pub max_rows_per_row_group: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions::from(&Config::default())
    }
}

impl From<&Config> for WriterOptions {
    fn from(config: &Config) -> Self {
        Self {
            compression: config.compression,
            max_rows_per_row_group: config.max_rows_per_row_group,
        }
    }
}

/// Validate a whole batch, then write it to one new data file
///
/// Nothing touches the disk unless every record passes validation.
pub fn write_file(
    table_root: &Path,
    schema: &Schema,
    records: &[Record],
    options: WriterOptions,
) -> Result<DataFile> {
    for record in records {
        schema.validate_record(record)?;
    }

    let mut writer = DataFileWriter::new(table_root, schema, options);
    for record in records {
        writer.add(record)?;
    }
    writer.finish()
}

/// Builder for one new data file
pub struct DataFileWriter<'a> {
    /// Table root; the file lands in `{table_root}/data/`
    table_root: PathBuf,
    schema: &'a Schema,
    options: WriterOptions,
    /// One buffer per schema field, in schema order
    columns: Vec<Vec<Option<Value>>>,
    record_count: u64,
}

impl<'a> DataFileWriter<'a> {
    pub fn new(table_root: &Path, schema: &'a Schema, options: WriterOptions) -> Self {
        Self {
            table_root: table_root.to_path_buf(),
            schema,
            options,
            columns: vec![Vec::new(); schema.len()],
            record_count: 0,
        }
    }

    /// Validate and buffer a record
    pub fn add(&mut self, record: &Record) -> Result<()> {
        self.schema.validate_record(record)?;

        for (column, field) in self.columns.iter_mut().zip(self.schema.fields()) {
            column.push(record.get(&field.name).cloned());
        }
        self.record_count += 1;

        Ok(())
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Write the buffered records to a fresh file and describe it
    ///
    /// On failure the partially-written file is removed (best effort); it is
    /// never referenced by any snapshot either way.
    pub fn finish(self) -> Result<DataFile> {
        if self.record_count == 0 {
            return Err(StratumError::Validation(
                "cannot write an empty data file".to_string(),
            ));
        }

        let arrow_schema = self.schema.to_arrow();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.schema.len());
        let mut column_stats = Vec::with_capacity(self.schema.len());
        for (field, values) in self.schema.fields().iter().zip(&self.columns) {
            arrays.push(build_array(field, values));
            column_stats.push(collect_stats(field, values));
        }
        let batch = RecordBatch::try_new(arrow_schema.clone(), arrays)?;

        let relative = format!("{}/{}.parquet", DATA_DIR, Uuid::new_v4());
        let path = self.table_root.join(&relative);
        let props = writer_properties(&self.options)?;

        let file_size = match write_parquet(&path, arrow_schema, &batch, props) {
            Ok(size) => size,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %path.display(),
                            error = %cleanup,
                            "failed to remove partial data file"
                        );
                    }
                }
                return Err(e);
            }
        };

        debug!(
            path = %relative,
            records = self.record_count,
            bytes = file_size,
            "wrote data file"
        );

        Ok(DataFile {
            path: relative,
            record_count: self.record_count,
            file_size,
            schema_id: self.schema.schema_id(),
            column_stats,
        })
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn writer_properties(options: &WriterOptions) -> Result<WriterProperties> {
    let compression = match options.compression {
        FileCompression::Uncompressed => Compression::UNCOMPRESSED,
        FileCompression::Snappy => Compression::SNAPPY,
        FileCompression::Zstd { level } => Compression::ZSTD(ZstdLevel::try_new(level)?),
    };

    Ok(WriterProperties::builder()
        .set_compression(compression)
        .set_max_row_group_size(options.max_rows_per_row_group)
        .set_created_by(format!("stratum version {}", crate::VERSION))
        .build())
}

/// Create the file (never overwriting), write the batch, fsync; returns size
fn write_parquet(
    path: &Path,
    schema: arrow_schema::SchemaRef,
    batch: &RecordBatch,
    props: WriterProperties,
) -> Result<u64> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;

    let mut writer = ArrowWriter::try_new(&mut file, schema, Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    file.sync_all()?;
    Ok(file.metadata()?.len())
}

fn build_array(field: &Field, values: &[Option<Value>]) -> ArrayRef {
    match field.field_type {
        FieldType::Long => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| v.as_ref().and_then(Value::as_long))
                .collect::<Vec<_>>(),
        )),
        FieldType::Double => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| v.as_ref().and_then(Value::as_double))
                .collect::<Vec<_>>(),
        )),
        FieldType::String => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| v.as_ref().and_then(Value::as_str))
                .collect::<Vec<_>>(),
        )),
    }
}

fn collect_stats(field: &Field, values: &[Option<Value>]) -> ColumnStats {
    let mut null_count = 0;
    let mut lower: Option<&Value> = None;
    let mut upper: Option<&Value> = None;

    for value in values {
        let value = match value {
            Some(v) => v,
            None => {
                null_count += 1;
                continue;
            }
        };
        // NaN has no place in an ordering; leave it out of the bounds
        if matches!(value, Value::Double(d) if d.is_nan()) {
            continue;
        }

        if lower.map_or(true, |l| value.compare(l) == Some(Ordering::Less)) {
            lower = Some(value);
        }
        if upper.map_or(true, |u| value.compare(u) == Some(Ordering::Greater)) {
            upper = Some(value);
        }
    }

    ColumnStats {
        field_id: field.id,
        null_count,
        lower: lower.cloned(),
        upper: upper.cloned(),
    }
}
