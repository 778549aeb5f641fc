//! Delete Engine
//!
//! Data files are immutable, so removing rows means rewriting every file
//! that holds a matching row without those rows, then committing a snapshot
//! that swaps the originals for the rewrites.
//!
//! ## Per-file Outcomes
//! - no matching rows: file untouched (no churn)
//! - some rows match: file rewritten without them
//! - all rows match: file dropped, nothing written in its place

use std::collections::HashMap;
use std::fs;
use std::io;

use tracing::{debug, info, warn};

use crate::error::{Result, StratumError};
use crate::metadata::{Operation, Snapshot};
use crate::schema::{BoundPredicate, Predicate, Record};
use crate::storage::{read_all, write_file, DataFile, WriterOptions};

use super::{CommitPlan, SnapshotCommitter, Table, WriteAck};

/// What happens to one data file under a delete
#[derive(Debug, Clone)]
enum FileRewrite {
    Untouched,
    Dropped { deleted: u64 },
    Rewritten { file: DataFile, deleted: u64 },
}

/// Row-level deletes and replacements via file rewrite
pub struct DeleteEngine<'a> {
    committer: &'a SnapshotCommitter,
    writer_options: WriterOptions,
    read_batch_size: usize,
}

impl<'a> DeleteEngine<'a> {
    pub fn new(
        committer: &'a SnapshotCommitter,
        writer_options: WriterOptions,
        read_batch_size: usize,
    ) -> Self {
        Self {
            committer,
            writer_options,
            read_batch_size,
        }
    }

    /// Remove every row matching `predicate`
    ///
    /// A predicate matching nothing commits nothing.
    pub fn delete_where(&self, table: &Table, predicate: &Predicate) -> Result<WriteAck> {
        let bound = predicate.bind(table.schema())?;
        let ack = self.rewrite(table, &bound, None)?;

        if ack.is_noop() {
            debug!(table = %table.identifier(), predicate = %predicate, "delete matched no rows");
        } else {
            info!(
                table = %table.identifier(),
                predicate = %predicate,
                deleted = ack.records_deleted,
                "deleted rows"
            );
        }
        Ok(ack)
    }

    /// Replace every row matching `predicate` with `replacement`, atomically
    ///
    /// Fails with `NotFound` if no row matches.
    pub fn replace_where(
        &self,
        table: &Table,
        predicate: &Predicate,
        replacement: &[Record],
    ) -> Result<WriteAck> {
        let bound = predicate.bind(table.schema())?;
        for record in replacement {
            table.schema().validate_record(record)?;
        }

        let ack = self.rewrite(table, &bound, Some(replacement))?;
        if ack.is_noop() {
            return Err(StratumError::NotFound(format!(
                "no row in {} matches {}",
                table.identifier(),
                predicate
            )));
        }

        info!(
            table = %table.identifier(),
            predicate = %predicate,
            replaced = ack.records_deleted,
            "replaced rows"
        );
        Ok(ack)
    }

    /// Plan, rewrite and commit; re-plans against each new base on conflict
    ///
    /// Rewrites are cached by original path across attempts, since the
    /// original's contents never change. Files written here that do not end
    /// up in the committed snapshot are removed afterwards.
    fn rewrite(
        &self,
        table: &Table,
        bound: &BoundPredicate,
        replacement: Option<&[Record]>,
    ) -> Result<WriteAck> {
        let mut rewrites: HashMap<String, FileRewrite> = HashMap::new();
        let mut replacement_file: Option<DataFile> = None;
        let mut ack = WriteAck::noop();

        let result = self.committer.commit_with(table, |base| {
            let candidates: Vec<&DataFile> =
                base.files().iter().filter(|f| bound.might_match(f)).collect();

            let pending: Vec<&DataFile> = candidates
                .iter()
                .copied()
                .filter(|f| !rewrites.contains_key(&f.path))
                .collect();
            self.rewrite_files(table, &pending, bound, &mut rewrites)?;

            let mut plan = CommitPlan {
                add: Vec::new(),
                remove: Vec::new(),
                operation: Operation::Delete,
            };
            let mut deleted = 0;
            for file in candidates {
                match rewrites.get(&file.path) {
                    Some(FileRewrite::Rewritten { file: rewritten, deleted: n }) => {
                        plan.remove.push(file.clone());
                        plan.add.push(rewritten.clone());
                        deleted += n;
                    }
                    Some(FileRewrite::Dropped { deleted: n }) => {
                        plan.remove.push(file.clone());
                        deleted += n;
                    }
                    Some(FileRewrite::Untouched) | None => {}
                }
            }

            if plan.remove.is_empty() {
                return Ok(None);
            }

            let mut added = 0;
            if let Some(records) = replacement.filter(|r| !r.is_empty()) {
                if replacement_file.is_none() {
                    replacement_file = Some(write_file(
                        table.location(),
                        table.schema(),
                        records,
                        self.writer_options,
                    )?);
                }
                if let Some(file) = &replacement_file {
                    plan.add.push(file.clone());
                    added += file.record_count;
                }
                plan.operation = Operation::Overwrite;
            }

            ack = WriteAck {
                snapshot_id: None,
                records_added: added,
                records_deleted: deleted,
                files_added: plan.add.len() as u64,
                files_removed: plan.remove.len() as u64,
            };
            Ok(Some(plan))
        });

        let committed = match result {
            Ok(committed) => committed,
            Err(e) => {
                self.discard(table, &rewrites, replacement_file.as_ref(), None);
                return Err(e);
            }
        };

        self.discard(table, &rewrites, replacement_file.as_ref(), committed.as_deref());
        match committed {
            Some(snapshot) => {
                ack.snapshot_id = Some(snapshot.id);
                Ok(ack)
            }
            None => Ok(WriteAck::noop()),
        }
    }

    /// Compute rewrites for `files` in parallel, a bounded batch at a time
    ///
    /// Every successful rewrite is recorded in `rewrites` before the first
    /// failure is returned, so files written by sibling workers stay visible
    /// to `discard`.
    fn rewrite_files(
        &self,
        table: &Table,
        files: &[&DataFile],
        bound: &BoundPredicate,
        rewrites: &mut HashMap<String, FileRewrite>,
    ) -> Result<()> {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        for chunk in files.chunks(parallelism) {
            let outcomes = crossbeam::thread::scope(|s| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|file| s.spawn(move |_| self.rewrite_file(table, file, bound)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|_| Err(worker_panicked())))
                    .collect::<Vec<_>>()
            })
            .map_err(|_| worker_panicked())?;

            let mut first_error = None;
            for (file, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(rewrite) => {
                        rewrites.insert(file.path.clone(), rewrite);
                    }
                    Err(e) => {
                        warn!(path = %file.path, error = %e, "failed to rewrite data file");
                        first_error.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        Ok(())
    }

    fn rewrite_file(
        &self,
        table: &Table,
        file: &DataFile,
        bound: &BoundPredicate,
    ) -> Result<FileRewrite> {
        let records = read_all(table.location(), file, table.schema(), self.read_batch_size)?;
        let total = records.len() as u64;
        let kept: Vec<Record> = records.into_iter().filter(|r| !bound.matches(r)).collect();
        let deleted = total - kept.len() as u64;

        if deleted == 0 {
            return Ok(FileRewrite::Untouched);
        }
        if kept.is_empty() {
            debug!(path = %file.path, deleted, "dropping data file");
            return Ok(FileRewrite::Dropped { deleted });
        }

        let rewritten = write_file(table.location(), table.schema(), &kept, self.writer_options)?;
        debug!(path = %file.path, rewritten = %rewritten.path, deleted, "rewrote data file");
        Ok(FileRewrite::Rewritten {
            file: rewritten,
            deleted,
        })
    }

    /// Remove files this operation wrote that `committed` does not reference
    fn discard(
        &self,
        table: &Table,
        rewrites: &HashMap<String, FileRewrite>,
        replacement: Option<&DataFile>,
        committed: Option<&Snapshot>,
    ) {
        let written = rewrites
            .values()
            .filter_map(|r| match r {
                FileRewrite::Rewritten { file, .. } => Some(file),
                _ => None,
            })
            .chain(replacement);

        for file in written {
            if committed.map_or(false, |s| s.contains_file(&file.path)) {
                continue;
            }
            if let Err(e) = fs::remove_file(file.location(table.location())) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %file.path,
                        error = %e,
                        "failed to remove unreferenced data file"
                    );
                }
            }
        }
    }
}

fn worker_panicked() -> StratumError {
    StratumError::Io(io::Error::new(
        io::ErrorKind::Other,
        "file rewrite worker panicked",
    ))
}
