//! Descriptor publishing
//!
//! A descriptor is first written to a uniquely named temp file and fsynced,
//! then linked to its final name. The link either creates the name or fails
//! because it already exists; readers can never see a half-written
//! descriptor under a final name.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

/// Outcome of a no-clobber publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    /// The final name now refers to the staged bytes
    Published,
    /// Another writer already owns the final name; nothing was changed
    AlreadyExists,
}

/// A fully written, not yet visible descriptor
///
/// The temp file is removed on drop whether or not it was published.
#[derive(Debug)]
pub struct StagedDescriptor {
    temp_path: PathBuf,
}

impl StagedDescriptor {
    /// Write `bytes` to a fresh temp file in `dir` and fsync it
    pub fn write(dir: &Path, bytes: &[u8]) -> Result<Self> {
        let temp_path = dir.join(format!(".staged-{}.tmp", Uuid::new_v4()));
        let staged = Self { temp_path };
        write_synced(&staged.temp_path, bytes)?;
        Ok(staged)
    }

    /// Link the staged bytes to `target` unless `target` already exists
    ///
    /// Once the link exists the descriptor is visible to every reader, so a
    /// failed directory fsync after it is logged rather than returned.
    pub fn publish(&self, target: &Path) -> Result<PublishResult> {
        match fs::hard_link(&self.temp_path, target) {
            Ok(()) => {
                if let Some(dir) = target.parent() {
                    if let Err(e) = sync_dir(dir) {
                        warn!(
                            path = %target.display(),
                            error = %e,
                            "published descriptor but failed to sync its directory"
                        );
                    }
                }
                Ok(PublishResult::Published)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(PublishResult::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagedDescriptor {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    path = %self.temp_path.display(),
                    error = %e,
                    "failed to remove staged descriptor"
                );
            }
        }
    }
}

/// Create `path` (must not exist), write `bytes`, fsync
pub fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Make a directory entry change durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
