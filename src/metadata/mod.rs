//! Metadata Module
//!
//! Table and snapshot descriptors, and how they are laid out on disk.
//!
//! ## Table Layout
//! ```text
//! {warehouse}/{namespace}/{name}/
//!   ├── metadata/
//!   │     ├── table.bin                  (identifier + schema)
//!   │     ├── snap-00000000000000000001.bin
//!   │     ├── snap-00000000000000000002.bin
//!   │     └── ...                        (one per commit, never rewritten)
//!   └── data/
//!         └── {uuid}.parquet             (immutable data files)
//! ```
//!
//! ## Descriptor Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (15 bytes)                                            │
//! │   Magic: "STRM" (4) | Kind: u8 (1) | Version: u16 (2)        │
//! │   PayloadLen: u32 (4) | PayloadCRC: u32 (4)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (bincode)                                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The highest-numbered snapshot descriptor is the table's current snapshot.
//! A descriptor is published by hard-linking a fully written temp file to its
//! final name, which fails if the name is taken: that link is the
//! compare-and-swap that orders commits, across threads and processes.

mod codec;
mod publish;
mod snapshot;
mod table;

pub use codec::{decode_descriptor, encode_descriptor, DescriptorKind};
pub use publish::{write_synced, PublishResult, StagedDescriptor};
pub use snapshot::{Operation, Snapshot, SnapshotId, SnapshotSummary};
pub use table::{TableIdentifier, TableMetadata};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a Stratum descriptor
pub(crate) const MAGIC: &[u8; 4] = b"STRM";

/// Current descriptor format version
pub(crate) const FORMAT_VERSION: u16 = 1;

/// Header size: Magic (4) + Kind (1) + Version (2) + Len (4) + CRC (4) = 15 bytes
pub(crate) const HEADER_SIZE: usize = 15;

/// Directory (relative to the table root) holding descriptors
pub const METADATA_DIR: &str = "metadata";

/// Table descriptor file name
pub const TABLE_FILENAME: &str = "table.bin";
