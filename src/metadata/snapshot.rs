//! Snapshots
//!
//! An immutable version of a table: the complete set of live data files at
//! that point, plus a link to the snapshot it was derived from.

use std::collections::HashSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::storage::DataFile;

/// Per-table snapshot sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub u64);

impl SnapshotId {
    /// Id of the empty snapshot every table starts with
    pub const INITIAL: SnapshotId = SnapshotId(1);

    pub fn next(self) -> SnapshotId {
        SnapshotId(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Descriptor file name, zero padded so names sort by id
    pub fn file_name(self) -> String {
        format!("snap-{:020}.bin", self.0)
    }

    /// "snap-00000000000000000042.bin" → Some(42)
    pub fn parse_file_name(name: &str) -> Option<SnapshotId> {
        let id = name.strip_prefix("snap-")?.strip_suffix(".bin")?;
        id.parse().ok().map(SnapshotId)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Empty snapshot written at table creation
    Create,
    /// Files added, none removed
    Append,
    /// Files removed or replaced by filtered rewrites
    Delete,
    /// Rows replaced by new rows in one commit
    Overwrite,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Append => "append",
            Operation::Delete => "delete",
            Operation::Overwrite => "overwrite",
        };
        f.write_str(name)
    }
}

/// Change counts relative to the parent snapshot, plus totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub operation: Operation,
    pub added_files: u64,
    pub removed_files: u64,
    pub added_records: u64,
    pub removed_records: u64,
    pub total_files: u64,
    pub total_records: u64,
}

/// An immutable table version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// `None` only for the initial snapshot
    pub parent_id: Option<SnapshotId>,
    /// Creation time (unix millis), never earlier than the parent's
    pub timestamp_ms: u64,
    pub schema_id: u32,
    pub summary: SnapshotSummary,
    /// Every live data file at this version
    files: Vec<DataFile>,
}

impl Snapshot {
    /// The empty snapshot a table is created with
    pub fn initial(schema_id: u32) -> Self {
        Self {
            id: SnapshotId::INITIAL,
            parent_id: None,
            timestamp_ms: now_millis(),
            schema_id,
            summary: SnapshotSummary {
                operation: Operation::Create,
                added_files: 0,
                removed_files: 0,
                added_records: 0,
                removed_records: 0,
                total_files: 0,
                total_records: 0,
            },
            files: Vec::new(),
        }
    }

    /// Build the child of `base`: (base files − remove) ∪ add
    ///
    /// Every file in `remove` must be live in `base`, and no file in `add`
    /// may already be live.
    pub fn derive(
        base: &Snapshot,
        add: &[DataFile],
        remove: &[DataFile],
        operation: Operation,
    ) -> Result<Snapshot> {
        let removed: HashSet<&str> = remove.iter().map(|f| f.path.as_str()).collect();
        for path in &removed {
            if !base.contains_file(path) {
                return Err(StratumError::Validation(format!(
                    "cannot remove {}: not live in snapshot {}",
                    path, base.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for file in add {
            if base.contains_file(&file.path) || !seen.insert(file.path.as_str()) {
                return Err(StratumError::Validation(format!(
                    "cannot add {}: file is already part of the table",
                    file.path
                )));
            }
        }

        let mut files: Vec<DataFile> = base
            .files
            .iter()
            .filter(|f| !removed.contains(f.path.as_str()))
            .cloned()
            .collect();
        files.extend(add.iter().cloned());

        let added_records = add.iter().map(|f| f.record_count).sum();
        let removed_records: u64 = base
            .files
            .iter()
            .filter(|f| removed.contains(f.path.as_str()))
            .map(|f| f.record_count)
            .sum();
        let total_records = files.iter().map(|f| f.record_count).sum();

        Ok(Snapshot {
            id: base.id.next(),
            parent_id: Some(base.id),
            timestamp_ms: now_millis().max(base.timestamp_ms),
            schema_id: base.schema_id,
            summary: SnapshotSummary {
                operation,
                added_files: add.len() as u64,
                removed_files: removed.len() as u64,
                added_records,
                removed_records,
                total_files: files.len() as u64,
                total_records,
            },
            files,
        })
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn parent_id(&self) -> Option<SnapshotId> {
        self.parent_id
    }

    /// Live data files
    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    pub fn total_records(&self) -> u64 {
        self.summary.total_records
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
