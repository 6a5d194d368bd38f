//! Platform directory resolution.
//!
//! Wraps `directories-next` behind a trait so tests can substitute fixed
//! paths without touching the real home directory.

use std::path::PathBuf;

/// Application name used for project directories.
const APP_NAME: &str = "parcel";

/// Source of the base directories parcel reads from and writes to.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Directory that installed executables are placed in by default.
    fn bin_dir(&self) -> Option<PathBuf>;

    /// Directory holding receipts and lock files.
    fn data_dir(&self) -> Option<PathBuf>;

    /// Directory holding the user settings file.
    fn config_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the platform conventions of the host.
///
/// # Examples
///
/// ```no_run
/// use parcel_installer::dirs::{BaseDirs, SystemBaseDirs};
///
/// let dirs = SystemBaseDirs::new().expect("failed to initialise directories");
/// println!("{:?}", dirs.data_dir());
/// ```
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    base: directories_next::BaseDirs,
    project: Option<directories_next::ProjectDirs>,
}

impl SystemBaseDirs {
    /// Resolve the host directories, or `None` when no home directory exists.
    #[must_use]
    pub fn new() -> Option<Self> {
        let base = directories_next::BaseDirs::new()?;
        let project = directories_next::ProjectDirs::from("", "", APP_NAME);
        Some(Self { base, project })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        Some(self.base.home_dir().to_path_buf())
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        if cfg!(windows) {
            return Some(self.base.data_local_dir().join(APP_NAME).join("bin"));
        }
        self.base
            .executable_dir()
            .map(std::path::Path::to_path_buf)
            .or_else(|| Some(self.base.home_dir().join(".local").join("bin")))
    }

    fn data_dir(&self) -> Option<PathBuf> {
        self.project
            .as_ref()
            .map(|project| project.data_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<PathBuf> {
        self.project
            .as_ref()
            .map(|project| project.config_dir().to_path_buf())
    }
}
