//! Configuration for Stratum
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StratumError};

/// Main configuration for a Stratum engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding every table
    /// Internal structure:
    ///   {warehouse_dir}/
    ///     └── {namespace}/
    ///         └── {table}/
    ///             ├── metadata/   (table + snapshot descriptors)
    ///             └── data/       (immutable Parquet files)
    pub warehouse_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Commit Configuration
    // -------------------------------------------------------------------------
    /// Retries after a lost compare-and-swap before giving up
    pub commit_retries: u32,

    /// Backoff before the first retry (milliseconds)
    pub retry_min_wait_ms: u64,

    /// Backoff ceiling (milliseconds)
    pub retry_max_wait_ms: u64,

    // -------------------------------------------------------------------------
    // Data File Configuration
    // -------------------------------------------------------------------------
    /// Compression codec for data file pages
    pub compression: FileCompression,

    /// Max rows per Parquet row group
    pub max_rows_per_row_group: usize,

    /// Rows decoded per batch while scanning
    pub read_batch_size: usize,
}

/// Compression applied to data file pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCompression {
    Uncompressed,
    Snappy,
    Zstd { level: i32 },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warehouse_dir: PathBuf::from("./stratum_warehouse"),
            commit_retries: 4,
            retry_min_wait_ms: 5,
            retry_max_wait_ms: 500,
            compression: FileCompression::Snappy,
            max_rows_per_row_group: 128 * 1024,
            read_batch_size: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_rows_per_row_group == 0 {
            return Err(StratumError::Config(
                "max_rows_per_row_group must be greater than zero".to_string(),
            ));
        }
        if self.read_batch_size == 0 {
            return Err(StratumError::Config(
                "read_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retry_min_wait_ms > self.retry_max_wait_ms {
            return Err(StratumError::Config(format!(
                "retry_min_wait_ms ({}) exceeds retry_max_wait_ms ({})",
                self.retry_min_wait_ms, self.retry_max_wait_ms
            )));
        }
        Ok(())
    }

    /// Backoff before retry number `retry` (1-based), doubling up to the ceiling
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let wait = self.retry_min_wait_ms.saturating_mul(factor);
        Duration::from_millis(wait.min(self.retry_max_wait_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the warehouse directory (root for all tables)
    pub fn warehouse_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.warehouse_dir = path.into();
        self
    }

    /// Set how many times a conflicting commit is retried
    pub fn commit_retries(mut self, retries: u32) -> Self {
        self.config.commit_retries = retries;
        self
    }

    /// Set the retry backoff window (in milliseconds)
    pub fn retry_wait_ms(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.config.retry_min_wait_ms = min_ms;
        self.config.retry_max_wait_ms = max_ms;
        self
    }

    /// Set the data file compression codec
    pub fn compression(mut self, compression: FileCompression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the maximum rows per row group
    pub fn max_rows_per_row_group(mut self, rows: usize) -> Self {
        self.config.max_rows_per_row_group = rows;
        self
    }

    /// Set the scan batch size
    pub fn read_batch_size(mut self, rows: usize) -> Self {
        self.config.read_batch_size = rows;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
