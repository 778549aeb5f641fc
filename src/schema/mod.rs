//! Schema Module
//!
//! Table schemas, typed records and equality predicates.
//!
//! ## Responsibilities
//! - Describe a table's columns with stable numeric field ids
//! - Validate records against a schema before anything is written
//! - Bind predicates to schema fields for scans and deletes
//!
//! ## Field Ids
//! Field ids are the durable contract between a schema and the data files
//! written under it. They are embedded in every Parquet file as field-id
//! metadata and never reassigned.

mod predicate;
mod record;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StratumError};

pub use predicate::{BoundPredicate, Predicate};
pub use record::{Record, Value};

/// Parquet metadata key carrying a column's field id
pub const PARQUET_FIELD_ID_KEY: &str = "PARQUET:field_id";

/// Primitive column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 64-bit signed integer
    Long,
    /// 64-bit IEEE float
    Double,
    /// UTF-8 string
    String,
}

impl FieldType {
    /// Arrow type used for this column in data files
    pub fn arrow_type(self) -> arrow_schema::DataType {
        match self {
            FieldType::Long => arrow_schema::DataType::Int64,
            FieldType::Double => arrow_schema::DataType::Float64,
            FieldType::String => arrow_schema::DataType::Utf8,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::String => "string",
        };
        f.write_str(name)
    }
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Stable id, never reused or changed
    pub id: u32,
    pub name: String,
    pub field_type: FieldType,
    /// Required fields must be present (non-null) in every record
    pub required: bool,
}

impl Field {
    pub fn required(id: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            required: true,
        }
    }

    pub fn optional(id: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id,
            name: name.into(),
            field_type,
            required: false,
        }
    }
}

/// Ordered set of fields describing a table's records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    schema_id: u32,
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting empty, duplicate-id or duplicate-name field lists
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        if fields.is_empty() {
            return Err(StratumError::Validation(
                "schema must contain at least one field".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for field in &fields {
            if field.id == 0 {
                return Err(StratumError::Validation(format!(
                    "field '{}' has id 0; field ids start at 1",
                    field.name
                )));
            }
            if field.name.is_empty() {
                return Err(StratumError::Validation(format!(
                    "field {} has an empty name",
                    field.id
                )));
            }
            if !ids.insert(field.id) {
                return Err(StratumError::Validation(format!(
                    "duplicate field id {}",
                    field.id
                )));
            }
            if !names.insert(field.name.as_str()) {
                return Err(StratumError::Validation(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }

        Ok(Self {
            schema_id: 0,
            fields,
        })
    }

    pub fn schema_id(&self) -> u32 {
        self.schema_id
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by id
    pub fn field_by_id(&self, id: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a record against this schema
    ///
    /// Fails when:
    /// - a field not in the schema is present
    /// - a present value has a different type than declared
    /// - a required field is missing
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        for (name, value) in record.iter() {
            let field = self.field(name).ok_or_else(|| {
                StratumError::Validation(format!("unknown field '{}'", name))
            })?;

            if value.field_type() != field.field_type {
                return Err(StratumError::Validation(format!(
                    "field '{}' expects {}, got {}",
                    name,
                    field.field_type,
                    value.field_type()
                )));
            }
        }

        for field in self.fields.iter().filter(|f| f.required) {
            if !record.contains(&field.name) {
                return Err(StratumError::Validation(format!(
                    "required field '{}' is missing",
                    field.name
                )));
            }
        }

        Ok(())
    }

    /// Arrow schema used for data files written under this schema
    pub fn to_arrow(&self) -> arrow_schema::SchemaRef {
        let fields: Vec<arrow_schema::Field> = self
            .fields
            .iter()
            .map(|f| {
                let metadata =
                    HashMap::from([(PARQUET_FIELD_ID_KEY.to_string(), f.id.to_string())]);
                arrow_schema::Field::new(f.name.as_str(), f.field_type.arrow_type(), !f.required)
                    .with_metadata(metadata)
            })
            .collect();

        Arc::new(arrow_schema::Schema::new(fields))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema {} {{", self.schema_id)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let req = if field.required { "required" } else { "optional" };
            write!(f, " {}: {} {} {}", field.id, field.name, field.field_type, req)?;
        }
        write!(f, " }}")
    }
}
