//! Scan Engine
//!
//! Streams records from one snapshot's data files.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::metadata::{Snapshot, SnapshotId};
use crate::schema::{BoundPredicate, Predicate, Record, Schema};
use crate::storage::DataFileReader;

use super::Table;

/// Lazy iterator over the records of a snapshot
///
/// Files are opened one at a time, and only when the previous file is
/// exhausted. Files whose statistics rule out the predicate are never
/// opened. The first error ends the iteration.
pub struct ScanIter {
    table_root: PathBuf,
    schema: Schema,
    snapshot: Arc<Snapshot>,
    predicate: Option<BoundPredicate>,
    batch_size: usize,
    /// Index of the next file to open
    next_file: usize,
    current: Option<DataFileReader>,
    files_scanned: usize,
    files_skipped: usize,
    done: bool,
}

impl ScanIter {
    /// Scan `snapshot`, binding `predicate` to the table schema up front
    pub fn new(
        table: &Table,
        snapshot: Arc<Snapshot>,
        predicate: Option<&Predicate>,
        batch_size: usize,
    ) -> Result<Self> {
        let predicate = predicate.map(|p| p.bind(table.schema())).transpose()?;

        Ok(Self {
            table_root: table.location().to_path_buf(),
            schema: table.schema().clone(),
            snapshot,
            predicate,
            batch_size,
            next_file: 0,
            current: None,
            files_scanned: 0,
            files_skipped: 0,
            done: false,
        })
    }

    /// Snapshot this scan reads
    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot.id
    }

    /// Files opened so far
    pub fn files_scanned(&self) -> usize {
        self.files_scanned
    }

    /// Files pruned by statistics so far
    pub fn files_skipped(&self) -> usize {
        self.files_skipped
    }

    /// Open the next file that might hold matching rows
    fn open_next_file(&mut self) -> Option<Result<DataFileReader>> {
        let files = self.snapshot.files();
        while self.next_file < files.len() {
            let file = &files[self.next_file];
            self.next_file += 1;

            if let Some(predicate) = &self.predicate {
                if !predicate.might_match(file) {
                    debug!(path = %file.path, "skipping data file by statistics");
                    self.files_skipped += 1;
                    continue;
                }
            }

            self.files_scanned += 1;
            return Some(DataFileReader::open(
                &self.table_root,
                file,
                &self.schema,
                self.batch_size,
            ));
        }
        None
    }
}

impl Iterator for ScanIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.current.is_none() {
                match self.open_next_file() {
                    Some(Ok(reader)) => self.current = Some(reader),
                    Some(Err(e)) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                    None => {
                        self.done = true;
                        return None;
                    }
                }
            }

            let next = match self.current.as_mut() {
                Some(reader) => reader.next(),
                None => continue,
            };

            match next {
                Some(Ok(record)) => {
                    let keep = self.predicate.as_ref().map_or(true, |p| p.matches(&record));
                    if keep {
                        return Some(Ok(record));
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    self.current = None;
                    return Some(Err(e));
                }
                None => self.current = None,
            }
        }
        None
    }
}

impl std::iter::FusedIterator for ScanIter {}
