//! Artefact handling: the value types a recipe declares and the stages that
//! turn a URL into verified, unpacked files.
//!
//! # Sub-modules
//!
//! - [`error`]: validation errors for recipe-level values.
//! - [`platform`]: platform identifiers (`Platform`).
//! - [`format`]: archive formats and URL suffix inference (`ArchiveFormat`).
//! - [`sha256_digest`]: SHA-256 digest newtype (`Sha256Digest`).
//! - [`download`]: fetch trait and HTTP/`file://` implementation.
//! - [`verification`]: streamed hashing and digest comparison.
//! - [`extraction`]: archive extraction with path traversal protection.

pub mod download;
pub mod error;
pub mod extraction;
pub mod format;
pub mod platform;
pub mod sha256_digest;
pub mod verification;
