//! Storage Module
//!
//! Immutable columnar data files.
//!
//! ## Responsibilities
//! - Serialize a validated batch of records into one new Parquet file
//! - Describe each file (path, row count, size, column statistics)
//! - Decode files back into records, lazily, one row group batch at a time
//!
//! ## Data File Layout
//! ```text
//! {table_root}/data/{uuid}.parquet
//! ┌────────────────────────────────────────┐
//! │ Row Group 0                            │
//! │ ┌──────────┬──────────┬──────────────┐ │
//! │ │ col f1   │ col f2   │ ...          │ │
//! │ └──────────┴──────────┴──────────────┘ │
//! │ ... (up to max_rows_per_row_group)     │
//! ├────────────────────────────────────────┤
//! │ Footer (Parquet FileMetaData)          │
//! │   schema with PARQUET:field_id per col │
//! └────────────────────────────────────────┘
//! ```
//!
//! Files are never opened for writing again once `finish()` returns; they are
//! superseded by leaving them out of a later snapshot.

mod data_file;
mod reader;
mod writer;

pub use data_file::{ColumnStats, DataFile};
pub use reader::{read_all, DataFileReader};
pub use writer::{write_file, DataFileWriter, WriterOptions};

/// Directory (relative to the table root) holding data files
pub const DATA_DIR: &str = "data";
