//! Per-run staging directories.
//!
//! Each install run owns a fresh, randomly named directory holding the
//! downloaded artefact and its unpacked contents. The directory is removed
//! when the [`StagingArea`] is dropped, whether the run succeeded or not.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DOWNLOAD_DIR: &str = "download";
const EXTRACT_DIR: &str = "extract";

/// A staging directory exclusively owned by one install run.
#[derive(Debug)]
pub struct StagingArea {
    root: TempDir,
    download_dir: PathBuf,
    extract_dir: PathBuf,
}

impl StagingArea {
    /// Create a staging area for `package` under `parent`, or under the
    /// system temporary directory when `parent` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directories cannot be created.
    ///
    /// # Examples
    ///
    /// ```
    /// use parcel_installer::staging::StagingArea;
    ///
    /// let staging = StagingArea::create("tool", None)?;
    /// assert!(staging.download_dir().is_dir());
    /// let root = staging.path().to_path_buf();
    /// drop(staging);
    /// assert!(!root.exists());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn create(package: &str, parent: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("parcel-{package}-");
        builder.prefix(&prefix);
        let root = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let download_dir = root.path().join(DOWNLOAD_DIR);
        let extract_dir = root.path().join(EXTRACT_DIR);
        std::fs::create_dir(&download_dir)?;
        std::fs::create_dir(&extract_dir)?;
        Ok(Self {
            root,
            download_dir,
            extract_dir,
        })
    }

    /// Root of the staging area.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Directory the fetched artefact is written to.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Directory the artefact is unpacked into.
    #[must_use]
    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Remove the staging area now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be removed.
    pub fn close(self) -> std::io::Result<()> {
        self.root.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_runs_get_distinct_directories() {
        let parent = tempfile::tempdir().expect("temp dir");
        let first = StagingArea::create("tool", Some(parent.path())).expect("first");
        let second = StagingArea::create("tool", Some(parent.path())).expect("second");

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(parent.path()));
        assert!(
            first
                .path()
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("parcel-tool-"))
        );
    }

    #[test]
    fn subdirectories_exist_and_are_removed_on_drop() {
        let parent = tempfile::tempdir().expect("temp dir");
        let staging = StagingArea::create("tool", Some(parent.path())).expect("staging");
        std::fs::write(staging.extract_dir().join("file"), b"x").expect("write");
        let root = staging.path().to_path_buf();

        assert!(staging.download_dir().is_dir());
        drop(staging);
        assert!(!root.exists());
    }

    #[test]
    fn missing_parent_is_created() {
        let parent = tempfile::tempdir().expect("temp dir");
        let nested = parent.path().join("a/b");
        let staging = StagingArea::create("tool", Some(&nested)).expect("staging");
        assert!(staging.path().starts_with(&nested));
        staging.close().expect("close");
    }
}
