//! List command implementation.
//!
//! This module provides the `run_list` command handler, which reads the
//! receipt store and prints what is installed.

use std::io::Write;
use std::path::Path;

use crate::cli::ListArgs;
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::list_output::{format_human, format_json};
use crate::receipt::ReceiptStore;
use crate::settings::Settings;

/// Lists installed packages.
///
/// Output is written to stdout (human-readable by default, JSON with
/// `--json`). Corrupt receipts are listed rather than failing the command.
///
/// # Errors
///
/// Returns an error if:
/// - The data directory cannot be determined
/// - The receipts directory cannot be read
/// - Writing to stdout fails
pub fn run_list(
    args: &ListArgs,
    settings: &Settings,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
) -> Result<()> {
    let data_dir = settings.data_dir(dirs)?;
    list_installed(args, &data_dir, stdout)
}

/// List the receipts stored under `data_dir`.
///
/// # Errors
///
/// Returns an error if the receipts cannot be read or stdout cannot be
/// written.
pub fn list_installed(args: &ListArgs, data_dir: &Path, stdout: &mut dyn Write) -> Result<()> {
    let listing = ReceiptStore::new(data_dir).list()?;

    let output = if args.json {
        format_json(&listing)
    } else {
        format_human(&listing)
    };

    write!(stdout, "{output}").map_err(|e| InstallerError::WriteFailed { source: e })?;
    if args.json {
        writeln!(stdout).map_err(|e| InstallerError::WriteFailed { source: e })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::Receipt;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A Write implementation that always fails, for testing error paths.
    struct FailingWriter;

    impl std::io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("simulated write failure"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("simulated flush failure"))
        }
    }

    #[fixture]
    fn data_dir() -> TempDir {
        let temp = TempDir::new().expect("failed to create temp dir");
        ReceiptStore::new(temp.path())
            .save(&Receipt {
                name: "tool".to_owned(),
                version: "2.0.0".to_owned(),
                platform: "linux-x64".to_owned(),
                url: "https://example.test/tool.tar.gz".to_owned(),
                digest: "cd".repeat(32),
                installed_paths: vec![PathBuf::from("/opt/bin/tool")],
                installed_at: 1_700_000_000,
            })
            .expect("save receipt");
        temp
    }

    #[rstest]
    fn lists_human_readable(data_dir: TempDir) {
        let mut stdout = Vec::new();
        list_installed(&ListArgs { json: false }, data_dir.path(), &mut stdout).expect("list");

        let output = String::from_utf8(stdout).expect("utf8");
        assert!(output.contains("tool 2.0.0 (linux-x64)"), "{output}");
    }

    #[rstest]
    fn lists_json(data_dir: TempDir) {
        let mut stdout = Vec::new();
        list_installed(&ListArgs { json: true }, data_dir.path(), &mut stdout).expect("list");

        let value: serde_json::Value = serde_json::from_slice(&stdout).expect("valid JSON");
        assert_eq!(value["packages"][0]["name"], "tool");
    }

    #[test]
    fn empty_data_dir_lists_nothing() {
        let temp = TempDir::new().expect("temp dir");
        let mut stdout = Vec::new();
        list_installed(&ListArgs::default(), temp.path(), &mut stdout).expect("list");
        assert!(String::from_utf8_lossy(&stdout).contains("No packages installed"));
    }

    #[rstest]
    fn write_failure_is_reported(data_dir: TempDir) {
        let err = list_installed(&ListArgs::default(), data_dir.path(), &mut FailingWriter)
            .expect_err("write fails");
        assert!(matches!(err, InstallerError::WriteFailed { .. }));
    }
}
