//! Archive extraction into a staging directory.
//!
//! Supports gzip and zstd tarballs, zip archives and raw single-file
//! artefacts. Every entry path is validated before anything is written:
//! absolute paths, `..` components and links resolving outside the
//! destination are rejected so that a hostile archive cannot write outside
//! the staging area (zip-slip).

use super::format::ArchiveFormat;
use log::trace;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Trait for extracting artefact archives, enabling test mocking.
///
/// # Examples
///
/// ```no_run
/// use parcel_installer::artefact::extraction::{ArchiveExtractor, ArtefactExtractor};
/// use parcel_installer::artefact::format::ArchiveFormat;
/// use std::path::Path;
///
/// let files = ArchiveExtractor.extract(
///     Path::new("/tmp/tool.tar.gz"),
///     ArchiveFormat::TarGz,
///     Path::new("/tmp/staging"),
/// )?;
/// println!("{files:?}");
/// # Ok::<(), parcel_installer::artefact::extraction::ExtractionError>(())
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the relative paths of the regular files written, in archive
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if any entry attempts to
    /// escape the destination directory, [`ExtractionError::EmptyArchive`]
    /// if no files are found, [`ExtractionError::Malformed`] for corrupt
    /// archives and [`ExtractionError::Io`] on I/O failures.
    fn extract(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path (or link target) from the archive entry.
        path: String,
    },

    /// The archive could not be decoded.
    #[error("malformed {format} archive: {reason}")]
    Malformed {
        /// The format the archive was decoded as.
        format: ArchiveFormat,
        /// Decoder error message.
        reason: String,
    },

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,
}

/// Default extractor dispatching on [`ArchiveFormat`].
pub struct ArchiveExtractor;

impl ArtefactExtractor for ArchiveExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError> {
        std::fs::create_dir_all(dest_dir)?;
        let extracted = match format {
            ArchiveFormat::TarGz => {
                let reader = BufReader::new(File::open(archive_path)?);
                extract_tar(flate2::read::GzDecoder::new(reader), format, dest_dir)?
            }
            ArchiveFormat::TarZst => {
                let decoder = zstd::Decoder::new(File::open(archive_path)?)?;
                extract_tar(decoder, format, dest_dir)?
            }
            ArchiveFormat::Zip => extract_zip(archive_path, dest_dir)?,
            ArchiveFormat::Raw => vec![place_raw(archive_path, dest_dir)?],
        };

        if extracted.is_empty() {
            return Err(ExtractionError::EmptyArchive);
        }
        Ok(extracted)
    }
}

fn extract_tar<R: Read>(
    reader: R,
    format: ArchiveFormat,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractionError> {
    let malformed = |e: std::io::Error| ExtractionError::Malformed {
        format,
        reason: e.to_string(),
    };
    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();
    // Symlinks unpacked so far, relative to `dest_dir`.
    let mut symlinks = HashSet::new();

    for entry_result in archive.entries().map_err(malformed)? {
        let mut entry = entry_result.map_err(malformed)?;
        let entry_path = entry.path().map_err(malformed)?.into_owned();
        validate_entry_path(&entry_path)?;
        if traverses_symlink(Path::new(""), &entry_path, &symlinks) {
            return Err(ExtractionError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()
                .map_err(malformed)?
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_default();
            validate_link(&entry_path, &target, entry_type.is_hard_link(), &symlinks)?;
        }
        if entry_type.is_symlink() {
            symlinks.insert(normalise(&entry_path));
        }

        trace!("unpacking {}", entry_path.display());
        // `unpack_in` resolves hard links against `dest_dir` rather than the
        // working directory.
        entry.unpack_in(dest_dir)?;
        if entry_type.is_file() {
            extracted.push(entry_path);
        }
    }

    Ok(extracted)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let malformed = |e: zip::result::ZipError| ExtractionError::Malformed {
        format: ArchiveFormat::Zip,
        reason: e.to_string(),
    };
    let reader = BufReader::new(File::open(archive_path)?);
    let mut archive = zip::ZipArchive::new(reader).map_err(malformed)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(malformed)?;
        let entry_path = PathBuf::from(file.name());
        validate_entry_path(&entry_path)?;

        let dest_path = dest_dir.join(&entry_path);
        if file.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        trace!("unpacking {}", entry_path.display());
        let mut outfile = File::create(&dest_path)?;
        std::io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                let permissions = std::fs::Permissions::from_mode(mode & 0o777);
                std::fs::set_permissions(&dest_path, permissions)?;
            }
        }
        extracted.push(entry_path);
    }

    Ok(extracted)
}

/// A raw artefact is the payload itself; it is placed under its own name.
fn place_raw(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf, ExtractionError> {
    let name = archive_path
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| ExtractionError::PathTraversal {
            path: archive_path.display().to_string(),
        })?;
    std::fs::copy(archive_path, dest_dir.join(&name))?;
    Ok(name)
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Validate a link target.
///
/// Symlink targets resolve relative to the entry's parent directory; hard
/// link targets resolve relative to the archive root. A target may not pass
/// through a symlink unpacked earlier, since the lexical check cannot see
/// where that link leads.
fn validate_link(
    entry_path: &Path,
    target: &Path,
    hard: bool,
    symlinks: &HashSet<PathBuf>,
) -> Result<(), ExtractionError> {
    let base = if hard {
        Path::new("")
    } else {
        entry_path.parent().unwrap_or_else(|| Path::new(""))
    };
    if target.is_absolute()
        || lexically_escapes(base, target)
        || traverses_symlink(base, target, symlinks)
    {
        return Err(ExtractionError::PathTraversal {
            path: format!("{} -> {}", entry_path.display(), target.display()),
        });
    }
    Ok(())
}

fn lexically_escapes(base: &Path, target: &Path) -> bool {
    let mut depth = base
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(next) => depth = next,
                None => return true,
            },
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Whether resolving `target` from `base` steps into or past a known symlink
/// before its last component.
fn traverses_symlink(base: &Path, target: &Path, symlinks: &HashSet<PathBuf>) -> bool {
    if symlinks.is_empty() {
        return false;
    }
    let mut resolved = normalise(base);
    for component in target.components() {
        if symlinks.contains(&resolved) {
            return true;
        }
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    false
}

/// Drop `.` components so paths compare equal however the archive spelled
/// them.
fn normalise(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}
