//! Spool storage for payloads sent in file mode.
//!
//! File-mode frames carry a path instead of the payload; both peers must see
//! the same filesystem. The backend is chosen once, when a client is built:
//! [`FsStorage`] spools into a directory, [`MemoryStorage`] refuses every file
//! operation so only memory-mode payloads work.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{CodecError, Result};

/// Directory name used under the system temp dir by default.
pub const DEFAULT_SPOOL_DIR: &str = "linewire";

/// Filesystem capability used for spool files.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Create a new, uniquely named spool file opened for writing.
    fn create_spool(&self) -> Result<(PathBuf, File)>;

    /// Open an existing spool file for reading.
    fn open(&self, path: &Path) -> Result<File>;

    /// Delete a spool file.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Spools into a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The spool directory. Created on first use.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn spool_name() -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("{}{}", uuid::Uuid::new_v4(), millis)
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(DEFAULT_SPOOL_DIR))
    }
}

impl Storage for FsStorage {
    fn create_spool(&self) -> Result<(PathBuf, File)> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::spool_name());
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(&path)?;
        debug!(path = %path.display(), "created spool file");
        Ok((path, file))
    }

    fn open(&self, path: &Path) -> Result<File> {
        Ok(File::open(path)?)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        debug!(path = %path.display(), "removed spool file");
        Ok(())
    }
}

/// A backend with no filesystem: every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStorage;

impl Storage for MemoryStorage {
    fn create_spool(&self) -> Result<(PathBuf, File)> {
        Err(CodecError::StorageUnavailable)
    }

    fn open(&self, _path: &Path) -> Result<File> {
        Err(CodecError::StorageUnavailable)
    }

    fn remove(&self, _path: &Path) -> Result<()> {
        Err(CodecError::StorageUnavailable)
    }
}
