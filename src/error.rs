//! Error types for Stratum
//!
//! Provides a unified error type for all operations, plus a coarse
//! [`ErrorKind`] classification callers can match on without caring which
//! layer (Parquet, bincode, filesystem) produced the failure.

use thiserror::Error;

/// Result type alias using StratumError
pub type Result<T> = std::result::Result<T, StratumError>;

/// Unified error type for Stratum operations
#[derive(Debug, Error)]
pub enum StratumError {
    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Validation failed: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // I/O and Encoding Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Metadata corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Concurrent modification of table {table}: commit failed after {attempts} attempt(s)")]
    ConcurrentModification { table: String, attempts: u32 },

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema or input constraint violated; nothing was applied
    ValidationFailure,

    /// Underlying I/O, encoding or metadata integrity failure
    StorageFailure,

    /// Commit could not be serialized within the retry budget
    ConcurrentModification,

    /// A must-exist lookup found nothing
    NotFound,
}

impl StratumError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StratumError::Validation(_)
            | StratumError::TableAlreadyExists(_)
            | StratumError::Config(_) => ErrorKind::ValidationFailure,
            StratumError::Io(_)
            | StratumError::Parquet(_)
            | StratumError::Arrow(_)
            | StratumError::Serialization(_)
            | StratumError::Corruption(_) => ErrorKind::StorageFailure,
            StratumError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            StratumError::NotFound(_) | StratumError::TableNotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::ValidationFailure
    }

    pub fn is_storage_failure(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }

    pub fn is_concurrent_modification(&self) -> bool {
        self.kind() == ErrorKind::ConcurrentModification
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<bincode::Error> for StratumError {
    fn from(e: bincode::Error) -> Self {
        StratumError::Serialization(e.to_string())
    }
}
