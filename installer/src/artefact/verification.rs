//! Integrity verification for downloaded artefacts.
//!
//! The digest is computed by streaming the file through SHA-256 so large
//! archives are never held in memory. Comparison against the expected digest
//! takes time independent of where the first differing byte lies.

use super::sha256_digest::Sha256Digest;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

const READ_CHUNK: usize = 8192;

/// Errors arising from integrity verification.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    /// The computed digest differs from the expected one.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Mismatch {
        /// The file that was hashed.
        path: PathBuf,
        /// The digest declared by the recipe.
        expected: String,
        /// The digest computed from the file contents.
        actual: String,
    },

    /// The file could not be read.
    #[error("failed to read {} for hashing: {source}", path.display())]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Compute the lowercase hex SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns [`IntegrityError::Read`] if the file cannot be opened or read.
pub fn compute_sha256(path: &Path) -> Result<String, IntegrityError> {
    let read_error = |source| IntegrityError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer).map_err(read_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that the file at `path` hashes to `expected`.
///
/// Returns the computed digest on success so callers can record it.
///
/// # Errors
///
/// Returns [`IntegrityError::Mismatch`] when the digests differ and
/// [`IntegrityError::Read`] when the file cannot be read.
///
/// # Examples
///
/// ```no_run
/// use parcel_installer::artefact::sha256_digest::Sha256Digest;
/// use parcel_installer::artefact::verification::verify_file;
/// use std::path::Path;
///
/// let expected = Sha256Digest::try_from("0".repeat(64))?;
/// let result = verify_file(Path::new("/tmp/tool.tar.gz"), &expected);
/// assert!(result.is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn verify_file(path: &Path, expected: &Sha256Digest) -> Result<String, IntegrityError> {
    let actual = compute_sha256(path)?;
    if constant_time_eq(actual.as_bytes(), expected.as_bytes()) {
        Ok(actual)
    } else {
        Err(IntegrityError::Mismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Compare two byte strings without short-circuiting on the first mismatch.
///
/// Lengths are not secret: both sides are 64-character hex digests.
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
