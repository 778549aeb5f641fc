//! Table identifiers and descriptors

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};
use crate::schema::Schema;

/// Namespace + name pair addressing a table in a warehouse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdentifier {
    namespace: String,
    name: String,
}

impl TableIdentifier {
    /// Both parts become directory names, so they are restricted to
    /// ASCII alphanumerics, `_` and `-`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let name = name.into();
        validate_part("namespace", &namespace)?;
        validate_part("table name", &name)?;
        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

fn validate_part(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(StratumError::Validation(format!("{} must not be empty", what)));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(StratumError::Validation(format!(
            "{} '{}' contains invalid character {:?}",
            what, value, c
        )));
    }
    Ok(())
}

/// Contents of `metadata/table.bin`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub identifier: TableIdentifier,
    /// Distinguishes re-created tables at the same location
    pub table_uuid: String,
    pub schema: Schema,
    pub created_at_ms: u64,
}

impl TableMetadata {
    pub fn new(identifier: TableIdentifier, schema: Schema) -> Self {
        Self {
            identifier,
            table_uuid: uuid::Uuid::new_v4().to_string(),
            schema,
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}
