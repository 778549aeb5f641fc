//! Engine Module
//!
//! The caller-owned entry point that ties the catalog, file writer, committer,
//! scan engine and delete engine together.
//!
//! ## Paths
//! - **Write**: catalog → file writer → committer
//! - **Read**: catalog → scan engine
//! - **Delete**: scan (locate matches) → delete engine → committer

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Result, StratumError};
use crate::metadata::{Operation, Snapshot, SnapshotId, TableIdentifier};
use crate::schema::{Predicate, Record, Schema, Value};
use crate::storage::{write_file, WriterOptions};
use crate::table::{DeleteEngine, ScanIter, SnapshotCommitter, Table, WriteAck};

/// The table engine
///
/// ## Concurrency Model: Optimistic, Snapshot-Isolated
///
/// - **Reads** capture the current snapshot when they start and never block
///   writers
/// - **Writes** serialize data files without holding any lock, then publish
///   a snapshot by compare-and-swap on the table's pointer
/// - A writer that loses the swap rebases and retries, up to
///   `Config::commit_retries` times
///
/// `Engine` is `Send + Sync`; share it behind an `Arc` across threads.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Table registry for the warehouse
    catalog: Catalog,

    /// Compare-and-swap committer shared by every write path
    committer: SnapshotCommitter,
}

impl Engine {
    /// Open the warehouse described by `config`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let catalog = Catalog::open(&config.warehouse_dir)?;
        let committer = SnapshotCommitter::new(&config);

        info!(
            warehouse = %config.warehouse_dir.display(),
            commit_retries = config.commit_retries,
            "opened engine"
        );

        Ok(Self {
            config,
            catalog,
            committer,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified warehouse directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().warehouse_dir(path).build())
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Load `namespace.name`, creating it with `schema` if it does not exist
    ///
    /// An existing table keeps its stored schema.
    pub fn create_or_load_table(
        &self,
        namespace: &str,
        name: &str,
        schema: &Schema,
    ) -> Result<Table> {
        let identifier = TableIdentifier::new(namespace, name)?;
        self.catalog.get_or_create_table(&identifier, schema)
    }

    /// Load an existing table
    pub fn load_table(&self, namespace: &str, name: &str) -> Result<Table> {
        let identifier = TableIdentifier::new(namespace, name)?;
        self.catalog.load_table(&identifier)
    }

    pub fn list_tables(&self, namespace: &str) -> Result<Vec<TableIdentifier>> {
        self.catalog.list_tables(namespace)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append `records` as one new data file in one new snapshot
    ///
    /// Every record is validated before anything is written. Appending
    /// nothing commits nothing.
    pub fn append(&self, table: &Table, records: &[Record]) -> Result<WriteAck> {
        if records.is_empty() {
            debug!(table = %table.identifier(), "empty append");
            return Ok(WriteAck::noop());
        }

        let base = table.current_snapshot()?;
        let file = write_file(table.location(), table.schema(), records, self.writer_options())?;
        let location = file.location(table.location());
        let added = file.record_count;

        match self
            .committer
            .commit(table, base.id, vec![file], Vec::new(), Operation::Append)
        {
            Ok(snapshot) => Ok(WriteAck {
                snapshot_id: Some(snapshot.id),
                records_added: added,
                records_deleted: 0,
                files_added: 1,
                files_removed: 0,
            }),
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&location) {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(
                            path = %location.display(),
                            error = %cleanup,
                            "failed to remove uncommitted data file"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Delete every row whose `field` equals `value`
    pub fn delete_where(
        &self,
        table: &Table,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<WriteAck> {
        self.delete_engine()
            .delete_where(table, &Predicate::eq(field, value))
    }

    /// Replace every row whose `field` equals `value` with `record`
    ///
    /// Removal and insertion land in the same snapshot. Fails with
    /// `NotFound` if no row matches.
    pub fn update_where(
        &self,
        table: &Table,
        field: &str,
        value: impl Into<Value>,
        record: Record,
    ) -> Result<WriteAck> {
        self.delete_engine()
            .replace_where(table, &Predicate::eq(field, value), &[record])
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Stream the current snapshot's records, optionally filtered
    pub fn scan(&self, table: &Table, predicate: Option<&Predicate>) -> Result<ScanIter> {
        let snapshot = table.current_snapshot()?;
        ScanIter::new(table, snapshot, predicate, self.config.read_batch_size)
    }

    /// Stream the records of any snapshot in the table's history
    pub fn scan_snapshot(
        &self,
        table: &Table,
        snapshot_id: SnapshotId,
        predicate: Option<&Predicate>,
    ) -> Result<ScanIter> {
        let snapshot = table.snapshot(snapshot_id)?;
        ScanIter::new(table, snapshot, predicate, self.config.read_batch_size)
    }

    /// First record whose `field` equals `value`
    pub fn find_one(
        &self,
        table: &Table,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Record>> {
        let predicate = Predicate::eq(field, value);
        self.scan(table, Some(&predicate))?.next().transpose()
    }

    /// Like [`Engine::find_one`], but a missing record is an error
    pub fn find_one_required(
        &self,
        table: &Table,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Record> {
        let predicate = Predicate::eq(field, value);
        self.scan(table, Some(&predicate))?
            .next()
            .transpose()?
            .ok_or_else(|| {
                StratumError::NotFound(format!(
                    "no row in {} matches {}",
                    table.identifier(),
                    predicate
                ))
            })
    }

    pub fn exists(&self, table: &Table, field: &str, value: impl Into<Value>) -> Result<bool> {
        Ok(self.find_one(table, field, value)?.is_some())
    }

    /// Snapshots from the current one back to the table's creation
    pub fn history(&self, table: &Table) -> Result<Vec<Arc<Snapshot>>> {
        table.history()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine
    ///
    /// Every commit is durable once it returns, so there is nothing to flush.
    pub fn close(self) -> Result<()> {
        info!(warehouse = %self.config.warehouse_dir.display(), "closed engine");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn committer(&self) -> &SnapshotCommitter {
        &self.committer
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn writer_options(&self) -> WriterOptions {
        WriterOptions::from(&self.config)
    }

    fn delete_engine(&self) -> DeleteEngine<'_> {
        DeleteEngine::new(&self.committer, self.writer_options(), self.config.read_batch_size)
    }
}
