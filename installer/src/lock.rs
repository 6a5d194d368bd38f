//! Per-package advisory locks.
//!
//! Two runs installing the same package would race on the same targets and
//! receipt, so each run holds an exclusive lock on
//! `<data_dir>/locks/<name>.lock` for its duration. Acquisition never
//! blocks: a held lock fails the second run immediately.

use crate::error::{InstallerError, Result};
use fs2::FileExt;
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCKS_DIR: &str = "locks";

/// An exclusive lock on one package, released on drop.
#[derive(Debug)]
pub struct PackageLock {
    file: File,
    path: PathBuf,
}

impl PackageLock {
    /// Acquire the lock for `name` under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Locked`] if another process holds the lock
    /// and [`InstallerError::Io`] if the lock file cannot be opened.
    pub fn acquire(data_dir: &Path, name: &str) -> Result<Self> {
        let dir = data_dir.join(LOCKS_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                debug!("acquired {}", path.display());
                Ok(Self { file, path })
            }
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(InstallerError::Locked {
                    name: name.to_owned(),
                    path,
                })
            }
            Err(err) => Err(InstallerError::Io(err)),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        if FileExt::unlock(&self.file).is_err() {
            debug!("failed to unlock {}", self.path.display());
        }
    }
}
