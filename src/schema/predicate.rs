//! Equality predicates
//!
//! A [`Predicate`] names a field and a value; binding it to a [`Schema`]
//! checks the field exists and the value has the right type, producing a
//! [`BoundPredicate`] that can test records and prune data files.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, StratumError};
use crate::storage::DataFile;

use super::{Record, Schema, Value};

/// `field = value`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    field: String,
    value: Value,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Resolve the field against a schema
    pub fn bind(&self, schema: &Schema) -> Result<BoundPredicate> {
        let field = schema.field(&self.field).ok_or_else(|| {
            StratumError::Validation(format!("predicate references unknown field '{}'", self.field))
        })?;

        if self.value.field_type() != field.field_type {
            return Err(StratumError::Validation(format!(
                "predicate on '{}' compares {} field with {} value",
                self.field,
                field.field_type,
                self.value.field_type()
            )));
        }

        Ok(BoundPredicate {
            field_id: field.id,
            field_name: field.name.clone(),
            value: self.value.clone(),
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.field, self.value)
    }
}

/// A predicate resolved against a schema
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPredicate {
    field_id: u32,
    field_name: String,
    value: Value,
}

impl BoundPredicate {
    pub fn field_id(&self) -> u32 {
        self.field_id
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// True when the record's field equals the value (null never matches)
    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.field_name) == Some(&self.value)
    }

    /// False only when the file's column statistics prove no row can match
    pub fn might_match(&self, file: &DataFile) -> bool {
        let stats = match file.column_stats(self.field_id) {
            Some(stats) => stats,
            None => return true,
        };

        let (lower, upper) = match (&stats.lower, &stats.upper) {
            (Some(lower), Some(upper)) => (lower, upper),
            // No comparable values in the column: all null (or NaN)
            _ => return false,
        };

        match (self.value.compare(lower), self.value.compare(upper)) {
            (Some(Ordering::Less), _) => false,
            (_, Some(Ordering::Greater)) => false,
            (Some(_), Some(_)) => true,
            // NaN equals nothing
            _ if matches!(self.value, Value::Double(v) if v.is_nan()) => false,
            _ => true,
        }
    }
}
