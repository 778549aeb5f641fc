//! Data file descriptors

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::schema::Value;

/// Descriptor for one immutable data file
///
/// Identity is the path: two descriptors with the same path refer to the same
/// bytes on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Path relative to the table root, e.g. `data/<uuid>.parquet`
    pub path: String,
    /// Number of records in this file
    pub record_count: u64,
    /// File size in bytes
    pub file_size: u64,
    /// Schema the file was written under
    pub schema_id: u32,
    /// Per-column statistics (for file skipping)
    pub column_stats: Vec<ColumnStats>,
}

/// Bounds and null count of one column within a data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub field_id: u32,
    pub null_count: u64,
    /// Smallest non-null value; `None` if the column has no comparable values
    pub lower: Option<Value>,
    /// Largest non-null value; `None` if the column has no comparable values
    pub upper: Option<Value>,
}

impl DataFile {
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Statistics for a field, if recorded
    pub fn column_stats(&self, field_id: u32) -> Option<&ColumnStats> {
        self.column_stats.iter().find(|s| s.field_id == field_id)
    }

    /// Absolute location of the file under a table root
    pub fn location(&self, table_root: &Path) -> PathBuf {
        table_root.join(&self.path)
    }
}
