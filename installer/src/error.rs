//! Error types for the parcel installer.
//!
//! Each pipeline stage owns its own error enum; [`InstallerError`] wraps
//! them so the CLI can report a single terminal message naming the failing
//! step. [`ErrorKind`] collapses the stage errors into the five-way taxonomy
//! reported in install results.

use crate::artefact::download::DownloadError;
use crate::artefact::error::ArtefactError;
use crate::artefact::extraction::ExtractionError;
use crate::artefact::verification::IntegrityError;
use crate::placement::PlacementError;
use crate::receipt::ReceiptError;
use crate::recipe::RecipeError;
use crate::settings::SettingsError;
use crate::smoke::SmokeError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of a failed install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failure, timeout or non-success HTTP status.
    Network,
    /// Digest mismatch.
    Integrity,
    /// Malformed archive or path traversal.
    Extraction,
    /// Missing source entry or permission denial while placing files.
    Install,
    /// Smoke test exited non-zero or timed out.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network error",
            Self::Integrity => "integrity error",
            Self::Extraction => "extraction error",
            Self::Install => "install error",
            Self::Validation => "validation error",
        })
    }
}

/// Errors that can occur while running the installer.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The artefact could not be fetched.
    #[error("fetch failed: {0}")]
    Fetch(#[from] DownloadError),

    /// The fetched artefact did not match its declared digest.
    #[error("verification failed: {0}")]
    Integrity(#[from] IntegrityError),

    /// The artefact could not be unpacked.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Files could not be placed in their target locations.
    #[error("install failed: {0}")]
    Install(#[from] PlacementError),

    /// The installed executable failed its smoke test.
    #[error("smoke test failed: {0}")]
    Validation(#[from] SmokeError),

    /// The recipe could not be loaded.
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    /// A recipe value was invalid.
    #[error(transparent)]
    Artefact(#[from] ArtefactError),

    /// The settings file could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// An install receipt could not be read or written.
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    /// The package has no receipt.
    #[error("{name} is not installed; run: parcel install <recipe>")]
    NotInstalled {
        /// Package name that was looked up.
        name: String,
    },

    /// Another parcel process holds the package lock.
    #[error("{name} is locked by another install (lock file {})", path.display())]
    Locked {
        /// Package name.
        name: String,
        /// Path of the held lock file.
        path: PathBuf,
    },

    /// A platform directory could not be determined.
    #[error("could not determine {what} directory; set it in the settings file")]
    DirectoryUnavailable {
        /// Which directory was missing.
        what: &'static str,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl InstallerError {
    /// Return the pipeline error kind, or `None` for errors raised outside
    /// the five pipeline stages.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Fetch(_) => Some(ErrorKind::Network),
            Self::Integrity(_) => Some(ErrorKind::Integrity),
            Self::Extraction(_) => Some(ErrorKind::Extraction),
            Self::Install(_) | Self::Locked { .. } => Some(ErrorKind::Install),
            Self::Validation(_) => Some(ErrorKind::Validation),
            _ => None,
        }
    }

    /// Return true when retrying the failed operation may succeed.
    ///
    /// Only transient network errors qualify; a digest mismatch is never
    /// retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(err) if err.is_transient())
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;
