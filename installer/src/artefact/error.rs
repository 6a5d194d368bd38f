//! Error types for recipe-level artefact values.
//!
//! Each variant provides a descriptive message identifying the invalid input
//! and the constraint that was violated.

use thiserror::Error;

/// Errors arising from invalid artefact-related values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtefactError {
    /// The platform identifier is not in the supported set.
    #[error("unsupported platform \"{value}\"; expected one of: {expected}")]
    UnsupportedPlatform {
        /// The rejected identifier.
        value: String,
        /// Comma-separated list of accepted identifiers.
        expected: String,
    },

    /// A SHA-256 digest is not a valid 64-character hex string.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidSha256Digest {
        /// Description of the validation failure.
        reason: String,
    },

    /// The archive format could not be determined or is not supported.
    #[error("unsupported archive format \"{value}\"; expected one of: {expected}")]
    UnsupportedFormat {
        /// The rejected format name or URL suffix.
        value: String,
        /// Comma-separated list of accepted formats.
        expected: String,
    },
}

/// Result type alias using [`ArtefactError`].
pub type Result<T> = std::result::Result<T, ArtefactError>;
