//! Catalog Module
//!
//! Maps table identifiers to table roots inside a warehouse directory and
//! bootstraps tables that do not exist yet.
//!
//! ## Layout
//! ```text
//! <warehouse>/
//!   <namespace>/
//!     <name>/                       published table root
//!     .<name>.staging-<uuid>/       table root being created
//! ```
//!
//! ## Creation
//! A new table root is assembled in a staging directory next to its final
//! location (descriptor, initial snapshot, empty `data/`) and published with
//! a single directory rename. A published root is therefore always complete.
//! When two creators race, the rename of the loser fails and it loads the
//! winner's table instead.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, StratumError};
use crate::metadata::{
    encode_descriptor, write_synced, DescriptorKind, Snapshot, TableIdentifier, TableMetadata,
    METADATA_DIR, TABLE_FILENAME,
};
use crate::schema::Schema;
use crate::storage::DATA_DIR;
use crate::table::Table;

/// Registry of the tables in one warehouse
///
/// Handles are cached, so every caller in the process that asks for the same
/// table shares one snapshot pointer.
pub struct Catalog {
    warehouse: PathBuf,
    tables: Mutex<HashMap<TableIdentifier, Table>>,
}

impl Catalog {
    /// Open the warehouse at `warehouse`, creating the directory if needed
    pub fn open(warehouse: &Path) -> Result<Self> {
        fs::create_dir_all(warehouse)?;
        debug!(warehouse = %warehouse.display(), "opened catalog");

        Ok(Self {
            warehouse: warehouse.to_path_buf(),
            tables: Mutex::new(HashMap::new()),
        })
    }

    pub fn warehouse(&self) -> &Path {
        &self.warehouse
    }

    /// Root directory of `identifier`, whether or not the table exists
    pub fn table_location(&self, identifier: &TableIdentifier) -> PathBuf {
        self.warehouse
            .join(identifier.namespace())
            .join(identifier.name())
    }

    pub fn table_exists(&self, identifier: &TableIdentifier) -> bool {
        self.tables.lock().contains_key(identifier) || self.is_published(identifier)
    }

    /// Open an existing table
    pub fn load_table(&self, identifier: &TableIdentifier) -> Result<Table> {
        let mut tables = self.tables.lock();
        self.load_locked(&mut tables, identifier)
    }

    /// Create a table, failing if one already exists at `identifier`
    pub fn create_table(&self, identifier: &TableIdentifier, schema: &Schema) -> Result<Table> {
        let mut tables = self.tables.lock();
        if tables.contains_key(identifier) || self.is_published(identifier) {
            return Err(StratumError::TableAlreadyExists(identifier.to_string()));
        }

        if !self.publish_new(identifier, schema)? {
            return Err(StratumError::TableAlreadyExists(identifier.to_string()));
        }
        self.load_locked(&mut tables, identifier)
    }

    /// Load the table at `identifier`, creating it with `schema` if absent
    ///
    /// An existing table keeps its stored schema; `schema` is ignored.
    /// Concurrent first-time callers all end up with the same table.
    pub fn get_or_create_table(
        &self,
        identifier: &TableIdentifier,
        schema: &Schema,
    ) -> Result<Table> {
        let mut tables = self.tables.lock();

        let absent = !tables.contains_key(identifier) && !self.is_published(identifier);
        if absent && !self.publish_new(identifier, schema)? {
            debug!(table = %identifier, "table was created concurrently");
        }

        let table = self.load_locked(&mut tables, identifier)?;
        if table.schema() != schema {
            warn!(
                table = %identifier,
                stored = %table.schema(),
                requested = %schema,
                "table exists with a different schema, keeping the stored one"
            );
        }
        Ok(table)
    }

    /// Tables in `namespace`, sorted by name
    pub fn list_tables(&self, namespace: &str) -> Result<Vec<TableIdentifier>> {
        // Validates the namespace before it touches the filesystem
        TableIdentifier::new(namespace, "_")?;

        let entries = match fs::read_dir(self.warehouse.join(namespace)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut identifiers = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if let Ok(identifier) = TableIdentifier::new(namespace, name) {
                if self.is_published(&identifier) {
                    identifiers.push(identifier);
                }
            }
        }

        identifiers.sort();
        Ok(identifiers)
    }

    fn is_published(&self, identifier: &TableIdentifier) -> bool {
        self.table_location(identifier)
            .join(METADATA_DIR)
            .join(TABLE_FILENAME)
            .is_file()
    }

    fn load_locked(
        &self,
        tables: &mut HashMap<TableIdentifier, Table>,
        identifier: &TableIdentifier,
    ) -> Result<Table> {
        if let Some(table) = tables.get(identifier) {
            return Ok(table.clone());
        }
        if !self.is_published(identifier) {
            return Err(StratumError::TableNotFound(identifier.to_string()));
        }

        let table = Table::load(&self.table_location(identifier))?;
        if table.identifier() != identifier {
            return Err(StratumError::Corruption(format!(
                "table at {} describes itself as {}",
                self.table_location(identifier).display(),
                table.identifier()
            )));
        }

        tables.insert(identifier.clone(), table.clone());
        Ok(table)
    }

    /// Stage and publish a fresh table root
    ///
    /// Returns `false` if another creator published first.
    fn publish_new(&self, identifier: &TableIdentifier, schema: &Schema) -> Result<bool> {
        let namespace_dir = self.warehouse.join(identifier.namespace());
        fs::create_dir_all(&namespace_dir)?;

        let staging = namespace_dir.join(format!(
            ".{}.staging-{}",
            identifier.name(),
            uuid::Uuid::new_v4()
        ));
        let result = self.stage_table(&staging, identifier, schema).and_then(|()| {
            match fs::rename(&staging, self.table_location(identifier)) {
                Ok(()) => Ok(true),
                Err(_) if self.is_published(identifier) => Ok(false),
                Err(e) => Err(e.into()),
            }
        });

        match &result {
            Ok(true) => {
                info!(table = %identifier, schema = %schema, "created table");
            }
            _ => {
                if let Err(e) = fs::remove_dir_all(&staging) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(
                            path = %staging.display(),
                            error = %e,
                            "failed to remove staging directory"
                        );
                    }
                }
            }
        }
        result
    }

    fn stage_table(
        &self,
        staging: &Path,
        identifier: &TableIdentifier,
        schema: &Schema,
    ) -> Result<()> {
        let metadata_dir = staging.join(METADATA_DIR);
        fs::create_dir_all(&metadata_dir)?;
        fs::create_dir_all(staging.join(DATA_DIR))?;

        let metadata = TableMetadata::new(identifier.clone(), schema.clone());
        let bytes = encode_descriptor(DescriptorKind::Table, &metadata)?;
        write_synced(&metadata_dir.join(TABLE_FILENAME), &bytes)?;

        let initial = Snapshot::initial(schema.schema_id());
        let bytes = encode_descriptor(DescriptorKind::Snapshot, &initial)?;
        write_synced(&metadata_dir.join(initial.id.file_name()), &bytes)?;

        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("warehouse", &self.warehouse)
            .field("open_tables", &self.tables.lock().len())
            .finish()
    }
}
