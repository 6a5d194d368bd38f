//! Placing unpacked files at their install targets.
//!
//! Every source is checked before anything is written, so a recipe naming a
//! missing file leaves the target directories untouched. Each destination is
//! written to a temporary sibling and renamed over the target, so re-running
//! an install replaces files in place and a reader never observes a
//! half-written executable.

use crate::recipe::InstallEntry;
use log::debug;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

/// Errors arising from placing files.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    /// A mapped source file is absent from the unpacked artefact.
    #[error("missing source entry {} in unpacked artefact", source_path.display())]
    MissingSource {
        /// Source path relative to the extraction root.
        source_path: PathBuf,
    },

    /// The destination is not writable.
    #[error("permission denied writing {}", path.display())]
    PermissionDenied {
        /// The destination that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing a destination failed for another reason.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// The destination that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PlacementError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == IoErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.to_path_buf(),
                source,
            }
        } else {
            Self::Write {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Copy each mapped file from `extract_dir` to its target.
///
/// Relative targets resolve against `bin_dir`. Each target is pushed onto
/// `installed` as soon as it is in place, so on failure `installed` still
/// names every file already written.
///
/// # Errors
///
/// Returns [`PlacementError::MissingSource`] before writing anything if a
/// source is absent, and [`PlacementError::PermissionDenied`] or
/// [`PlacementError::Write`] if a destination cannot be written.
pub fn place_files(
    extract_dir: &Path,
    entries: &[InstallEntry],
    bin_dir: &Path,
    installed: &mut Vec<PathBuf>,
) -> Result<(), PlacementError> {
    let planned = entries
        .iter()
        .map(|entry| {
            let source = extract_dir.join(&entry.source);
            if source.is_file() {
                Ok((source, entry.resolve_target(bin_dir), entry.executable))
            } else {
                Err(PlacementError::MissingSource {
                    source_path: entry.source.clone(),
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (source, target, executable) in planned {
        place_one(&source, &target, executable)?;
        installed.push(target);
    }
    Ok(())
}

fn place_one(source: &Path, target: &Path, executable: bool) -> Result<(), PlacementError> {
    debug!("installing {} -> {}", source.display(), target.display());
    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| PlacementError::from_io(parent, e))?;

    let mut staged = tempfile::Builder::new()
        .prefix(".parcel-")
        .tempfile_in(parent)
        .map_err(|e| PlacementError::from_io(target, e))?;
    let mut reader = std::fs::File::open(source).map_err(|e| PlacementError::from_io(source, e))?;
    std::io::copy(&mut reader, staged.as_file_mut())
        .map_err(|e| PlacementError::from_io(target, e))?;
    set_mode(staged.path(), executable).map_err(|e| PlacementError::from_io(target, e))?;

    staged
        .persist(target)
        .map_err(|e| PlacementError::from_io(target, e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, executable: bool) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if executable { 0o755 } else { 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _executable: bool) -> std::io::Result<()> {
    Ok(())
}
