//! parcel installer library.
//!
//! This crate fetches a prebuilt tool artefact, verifies its SHA-256 digest,
//! unpacks it into a private staging directory, installs the designated
//! files and smoke-tests the result. It backs the `parcel` CLI binary and can
//! be driven programmatically with substitute collaborators for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Fetching, verification, extraction and value types
//! - [`cli`] - Command-line argument definitions
//! - [`deps`] - Runtime dependency lookup on `PATH`
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Error types and the five-way failure taxonomy
//! - [`install_flow`] - The `install` and `test` commands
//! - [`list`] - The `list` command
//! - [`list_output`] - Output formatting for package listing
//! - [`lock`] - Per-package advisory locks
//! - [`output`] - User-facing progress messages
//! - [`pipeline`] - The staged install state machine
//! - [`placement`] - Copying files into their targets
//! - [`receipt`] - Install receipts
//! - [`recipe`] - Recipe loading and validation
//! - [`remove`] - The `remove` command
//! - [`retry`] - Exponential backoff around fetches
//! - [`settings`] - User settings
//! - [`smoke`] - Smoke-testing installed executables
//! - [`staging`] - Per-run staging directories

pub mod artefact;
pub mod cli;
pub mod deps;
pub mod dirs;
pub mod error;
pub mod install_flow;
pub mod list;
pub mod list_output;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod placement;
pub mod receipt;
pub mod recipe;
pub mod remove;
pub mod retry;
pub mod settings;
pub mod smoke;
pub mod staging;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
