//! Table Module
//!
//! Table handles and the operations that read and mutate a table.
//!
//! ## Responsibilities
//! - Hold the table's current-snapshot pointer (the only shared mutable state)
//! - Commit new snapshots through compare-and-swap ([`SnapshotCommitter`])
//! - Stream records from a snapshot ([`ScanIter`])
//! - Delete or replace rows by rewriting files ([`DeleteEngine`])
//!
//! ## Concurrency
//! - Readers clone the current `Arc<Snapshot>` under a short read lock and
//!   work against that immutable view
//! - Writers build data files and descriptors without any lock, then hold
//!   the table's commit lock to compare ids and link the descriptor
//! - The pointer's write lock is taken only for the `Arc` swap itself, so
//!   readers never wait on descriptor I/O

mod commit;
mod delete;
mod scan;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Result, StratumError};
use crate::metadata::{
    decode_descriptor, DescriptorKind, PublishResult, Snapshot, SnapshotId, StagedDescriptor,
    TableIdentifier, TableMetadata, METADATA_DIR, TABLE_FILENAME,
};
use crate::schema::Schema;
use crate::storage::DATA_DIR;

pub use commit::{CommitOutcome, CommitPlan, SnapshotCommitter};
pub use delete::DeleteEngine;
pub use scan::ScanIter;

/// Result of a successful write operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Snapshot created by the write, `None` if nothing needed committing
    pub snapshot_id: Option<SnapshotId>,
    pub records_added: u64,
    pub records_deleted: u64,
    pub files_added: u64,
    pub files_removed: u64,
}

impl WriteAck {
    /// Ack for a write that changed nothing
    pub fn noop() -> Self {
        Self {
            snapshot_id: None,
            records_added: 0,
            records_deleted: 0,
            files_added: 0,
            files_removed: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.snapshot_id.is_none()
    }
}

/// Handle to an open table
///
/// Cheap to clone; clones share the same snapshot pointer.
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableState>,
}

struct TableState {
    /// Table root directory
    location: PathBuf,
    metadata: TableMetadata,
    /// Current snapshot; advanced by `compare_and_swap` and `refresh`
    current: RwLock<Arc<Snapshot>>,
    /// Serializes in-process commits across the compare and the link
    commit_lock: Mutex<()>,
}

impl Table {
    /// Open the table rooted at `location`
    ///
    /// Reads the table descriptor and the highest-numbered snapshot.
    pub fn load(location: &Path) -> Result<Self> {
        let metadata_dir = location.join(METADATA_DIR);
        let bytes = fs::read(metadata_dir.join(TABLE_FILENAME))?;
        let metadata: TableMetadata = decode_descriptor(DescriptorKind::Table, &bytes)?;

        let mut latest: Option<SnapshotId> = None;
        for entry in fs::read_dir(&metadata_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = SnapshotId::parse_file_name(&name.to_string_lossy()) {
                latest = latest.max(Some(id));
            }
        }

        let latest = latest.ok_or_else(|| {
            StratumError::Corruption(format!(
                "table {} has no snapshot descriptors",
                metadata.identifier
            ))
        })?;
        let snapshot = read_snapshot(&metadata_dir, latest)?.ok_or_else(|| {
            StratumError::Corruption(format!("snapshot {} vanished while loading", latest))
        })?;

        debug!(table = %metadata.identifier, snapshot = %snapshot.id, "loaded table");
        Ok(Self::new(location.to_path_buf(), metadata, snapshot))
    }

    pub(crate) fn new(location: PathBuf, metadata: TableMetadata, current: Snapshot) -> Self {
        Self {
            inner: Arc::new(TableState {
                location,
                metadata,
                current: RwLock::new(Arc::new(current)),
                commit_lock: Mutex::new(()),
            }),
        }
    }

    pub fn identifier(&self) -> &TableIdentifier {
        &self.inner.metadata.identifier
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.metadata.schema
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.inner.metadata
    }

    /// Table root directory
    pub fn location(&self) -> &Path {
        &self.inner.location
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.inner.location.join(METADATA_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.inner.location.join(DATA_DIR)
    }

    /// The current snapshot, after picking up commits made elsewhere
    pub fn current_snapshot(&self) -> Result<Arc<Snapshot>> {
        self.refresh()
    }

    /// The snapshot this handle last observed, without touching the disk
    pub fn cached_snapshot(&self) -> Arc<Snapshot> {
        self.inner.current.read().clone()
    }

    /// Load any snapshot in the table's history
    pub fn snapshot(&self, id: SnapshotId) -> Result<Arc<Snapshot>> {
        let cached = self.cached_snapshot();
        if cached.id == id {
            return Ok(cached);
        }
        read_snapshot(&self.metadata_dir(), id)?
            .map(Arc::new)
            .ok_or_else(|| {
                StratumError::NotFound(format!("snapshot {} of table {}", id, self.identifier()))
            })
    }

    /// Snapshot chain from the current snapshot back to the first one
    pub fn history(&self) -> Result<Vec<Arc<Snapshot>>> {
        let mut history = vec![self.current_snapshot()?];
        while let Some(parent) = history.last().and_then(|s| s.parent_id) {
            history.push(self.snapshot(parent)?);
        }
        Ok(history)
    }

    /// Advance the in-memory pointer past snapshots published by other handles
    /// or processes
    ///
    /// Snapshot ids are dense, so probing `current + 1` until it is missing
    /// finds the latest one.
    pub fn refresh(&self) -> Result<Arc<Snapshot>> {
        let cached = self.cached_snapshot();
        let metadata_dir = self.metadata_dir();

        let mut latest = cached.clone();
        while let Some(next) = read_snapshot(&metadata_dir, latest.id.next())? {
            latest = Arc::new(next);
        }

        if latest.id == cached.id {
            return Ok(cached);
        }

        let mut current = self.inner.current.write();
        if current.id < latest.id {
            debug!(
                table = %self.identifier(),
                from = %current.id,
                to = %latest.id,
                "refreshed snapshot"
            );
            *current = latest;
        }
        Ok(current.clone())
    }

    /// Swap the pointer from `expected` to `next` if nobody got there first
    ///
    /// `staged` must hold the encoded `next`. The swap is published by
    /// linking it as `next`'s descriptor; an existing descriptor under that
    /// name means another process won.
    pub(crate) fn compare_and_swap(
        &self,
        expected: SnapshotId,
        staged: &StagedDescriptor,
        next: Snapshot,
    ) -> Result<CommitOutcome> {
        let target = self.metadata_dir().join(next.id.file_name());

        let commit_guard = self.inner.commit_lock.lock();
        let current = self.cached_snapshot();
        if current.id != expected {
            return Ok(CommitOutcome::Conflict { current });
        }

        match staged.publish(&target)? {
            PublishResult::Published => {
                let next = Arc::new(next);
                {
                    // A concurrent refresh may already have loaded `next`
                    let mut current = self.inner.current.write();
                    if current.id < next.id {
                        *current = next.clone();
                    }
                }
                drop(commit_guard);
                Ok(CommitOutcome::Committed(next))
            }
            PublishResult::AlreadyExists => {
                drop(commit_guard);
                Ok(CommitOutcome::Conflict {
                    current: self.refresh()?,
                })
            }
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("identifier", self.identifier())
            .field("location", &self.inner.location)
            .field("snapshot", &self.cached_snapshot().id)
            .finish()
    }
}

/// Read a snapshot descriptor; `Ok(None)` if it does not exist
fn read_snapshot(metadata_dir: &Path, id: SnapshotId) -> Result<Option<Snapshot>> {
    let bytes = match fs::read(metadata_dir.join(id.file_name())) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let snapshot: Snapshot = decode_descriptor(DescriptorKind::Snapshot, &bytes)?;
    if snapshot.id != id {
        return Err(StratumError::Corruption(format!(
            "descriptor {} holds snapshot {}",
            id.file_name(),
            snapshot.id
        )));
    }
    Ok(Some(snapshot))
}
