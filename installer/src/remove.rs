//! Remove command implementation.
//!
//! Deletes the files a receipt records and then the receipt itself. Files
//! already missing are skipped, so an interrupted removal can be re-run.

use std::io::Write;
use std::path::Path;

use log::debug;

use crate::cli::RemoveArgs;
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::lock::PackageLock;
use crate::output::write_stderr_line;
use crate::receipt::{Receipt, ReceiptStore};
use crate::recipe::validate_name;
use crate::settings::Settings;

/// Remove an installed package.
///
/// # Errors
///
/// Returns [`InstallerError::NotInstalled`] when no receipt exists, or an
/// error if the lock, files or receipt cannot be handled.
pub fn run_remove(
    args: &RemoveArgs,
    quiet: bool,
    settings: &Settings,
    dirs: &dyn BaseDirs,
    stderr: &mut dyn Write,
) -> Result<Receipt> {
    let data_dir = settings.data_dir(dirs)?;
    remove_package(&args.name, &data_dir, quiet, stderr)
}

/// Remove the package `name` recorded under `data_dir`.
///
/// # Errors
///
/// Returns [`InstallerError::Recipe`] when `name` is not a valid package
/// name, [`InstallerError::NotInstalled`] when no receipt exists,
/// [`InstallerError::Locked`] when an install of the same package is
/// running, and [`InstallerError::Io`] if a recorded file cannot be
/// deleted.
pub fn remove_package(
    name: &str,
    data_dir: &Path,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<Receipt> {
    validate_name(name)?;
    let _lock = PackageLock::acquire(data_dir, name)?;
    let store = ReceiptStore::new(data_dir);
    let receipt = store
        .load(name)?
        .ok_or_else(|| InstallerError::NotInstalled {
            name: name.to_owned(),
        })?;

    for path in &receipt.installed_paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} already absent", path.display());
            }
            Err(err) => return Err(InstallerError::Io(err)),
        }
    }
    store.remove(name)?;

    if !quiet {
        write_stderr_line(
            stderr,
            format!(
                "Removed {} {} ({} recorded files)",
                receipt.name,
                receipt.version,
                receipt.installed_paths.len()
            ),
        );
    }
    Ok(receipt)
}
