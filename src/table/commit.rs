//! Snapshot Committer
//!
//! Turns a file-level diff into a new snapshot and advances the table's
//! pointer with optimistic concurrency: a commit builds on a base snapshot and
//! only lands if the base is still current. Lost races are retried against
//! the new current snapshot, up to the configured bound.

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, StratumError};
use crate::metadata::{
    encode_descriptor, DescriptorKind, Operation, Snapshot, SnapshotId, StagedDescriptor,
};
use crate::storage::DataFile;

use super::Table;

/// Result of a single commit attempt
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The pointer now refers to this snapshot
    Committed(Arc<Snapshot>),
    /// The base was stale; `current` is what the pointer refers to now
    Conflict { current: Arc<Snapshot> },
}

/// A diff against some base snapshot
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub add: Vec<DataFile>,
    pub remove: Vec<DataFile>,
    pub operation: Operation,
}

/// Commits snapshots with bounded compare-and-swap retries
#[derive(Debug, Clone)]
pub struct SnapshotCommitter {
    config: Config,
}

impl SnapshotCommitter {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Attempts per commit (first try + retries)
    pub fn max_attempts(&self) -> u32 {
        self.config.commit_retries.saturating_add(1)
    }

    /// One compare-and-swap attempt
    ///
    /// The descriptor is encoded and written before the commit lock is taken.
    pub fn try_commit(
        &self,
        table: &Table,
        base: &Snapshot,
        add: &[DataFile],
        remove: &[DataFile],
        operation: Operation,
    ) -> Result<CommitOutcome> {
        let next = Snapshot::derive(base, add, remove, operation)?;
        let bytes = encode_descriptor(DescriptorKind::Snapshot, &next)?;
        let staged = StagedDescriptor::write(&table.metadata_dir(), &bytes)?;

        table.compare_and_swap(base.id, &staged, next)
    }

    /// Commit `add`/`remove` on top of `base_id`, rebasing on conflict
    ///
    /// On a lost race the same diff is re-applied to the new current snapshot.
    /// That is only sound while every file being removed is still live; if a
    /// concurrent commit already removed one, the caller must re-plan and
    /// this fails with `ConcurrentModification` straight away.
    pub fn commit(
        &self,
        table: &Table,
        base_id: SnapshotId,
        add: Vec<DataFile>,
        remove: Vec<DataFile>,
        operation: Operation,
    ) -> Result<Arc<Snapshot>> {
        let mut base = table.snapshot(base_id)?;
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            match self.try_commit(table, &base, &add, &remove, operation)? {
                CommitOutcome::Committed(snapshot) => {
                    info!(
                        table = %table.identifier(),
                        snapshot = %snapshot.id,
                        operation = %operation,
                        attempt,
                        "committed snapshot"
                    );
                    return Ok(snapshot);
                }
                CommitOutcome::Conflict { current } => {
                    warn!(
                        table = %table.identifier(),
                        base = %base.id,
                        current = %current.id,
                        attempt,
                        "commit lost compare-and-swap"
                    );

                    if let Some(gone) = remove.iter().find(|f| !current.contains_file(&f.path)) {
                        debug!(path = %gone.path, "file to remove was removed concurrently");
                        return Err(self.conflict_error(table, attempt));
                    }

                    if attempt < max_attempts {
                        thread::sleep(self.config.retry_backoff(attempt));
                    }
                    base = current;
                }
            }
        }

        Err(self.conflict_error(table, max_attempts))
    }

    /// Commit a diff recomputed from scratch against each base it is tried on
    ///
    /// `plan` runs once per attempt with the snapshot the attempt builds on;
    /// returning `Ok(None)` abandons the commit without error.
    pub fn commit_with<F>(&self, table: &Table, mut plan: F) -> Result<Option<Arc<Snapshot>>>
    where
        F: FnMut(&Snapshot) -> Result<Option<CommitPlan>>,
    {
        let mut base = table.current_snapshot()?;
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            let diff = match plan(&base)? {
                Some(diff) => diff,
                None => return Ok(None),
            };

            match self.try_commit(table, &base, &diff.add, &diff.remove, diff.operation)? {
                CommitOutcome::Committed(snapshot) => {
                    info!(
                        table = %table.identifier(),
                        snapshot = %snapshot.id,
                        operation = %diff.operation,
                        attempt,
                        "committed snapshot"
                    );
                    return Ok(Some(snapshot));
                }
                CommitOutcome::Conflict { current } => {
                    warn!(
                        table = %table.identifier(),
                        base = %base.id,
                        current = %current.id,
                        attempt,
                        "commit lost compare-and-swap, re-planning"
                    );
                    if attempt < max_attempts {
                        thread::sleep(self.config.retry_backoff(attempt));
                    }
                    base = current;
                }
            }
        }

        Err(self.conflict_error(table, max_attempts))
    }

    fn conflict_error(&self, table: &Table, attempts: u32) -> StratumError {
        StratumError::ConcurrentModification {
            table: table.identifier().to_string(),
            attempts,
        }
    }
}
