//! # Stratum
//!
//! An embedded, snapshot-versioned columnar table engine with:
//! - Immutable Parquet data files
//! - Atomic commits through a compare-and-swap snapshot pointer
//! - Optimistic concurrency with bounded retry
//! - Predicate scans with statistics-based file skipping
//! - Row deletes by file rewrite
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                               │
//! │        append / scan / find_one / delete_where / ...         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Catalog                               │
//! │          (namespace.name → table root, creation)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        │              │              │
//!        ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐
//!  │   File    │  │   Scan    │  │  Delete   │
//!  │  Writer   │  │  Engine   │  │  Engine   │
//!  └─────┬─────┘  └───────────┘  └─────┬─────┘
//!        │                             │
//!        └──────────────┬──────────────┘
//!                       ▼
//!               ┌───────────────┐
//!               │   Snapshot    │
//!               │   Committer   │
//!               │    (CAS)      │
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod schema;
pub mod storage;
pub mod metadata;
pub mod table;
pub mod catalog;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, Result, StratumError};
pub use config::{Config, FileCompression};
pub use schema::{Field, FieldType, Predicate, Record, Schema, Value};
pub use metadata::{Operation, Snapshot, SnapshotId, TableIdentifier};
pub use table::{ScanIter, Table, WriteAck};
pub use catalog::Catalog;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Stratum
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
