//! User-facing progress and summary messages.
//!
//! Diagnostics go through the `log` facade; the lines produced here are the
//! progress messages a user sees on stderr, suppressed by `--quiet`.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort progress output; ignore write failures.
    }
}

/// Format a success message after installation.
///
/// # Examples
///
/// ```
/// use parcel_installer::output::success_message;
/// use std::path::PathBuf;
///
/// let msg = success_message("tool", "1.0.0", &[PathBuf::from("/bin/tool")]);
/// assert_eq!(msg, "Installed tool 1.0.0 (1 file)");
/// ```
#[must_use]
pub fn success_message(name: &str, version: &str, installed: &[PathBuf]) -> String {
    let plural = if installed.len() == 1 { "file" } else { "files" };
    format!("Installed {name} {version} ({} {plural})", installed.len())
}

/// Format the message shown when an install is skipped.
#[must_use]
pub fn already_installed_message(name: &str, version: &str) -> String {
    format!("{name} {version} is already installed; use --force to reinstall")
}

/// Format the hint shown when the binary directory is not on `PATH`.
#[must_use]
pub fn path_hint(bin_dir: &Path) -> Option<String> {
    let on_path = std::env::var_os("PATH")
        .is_some_and(|paths| std::env::split_paths(&paths).any(|entry| entry == bin_dir));
    (!on_path).then(|| format!("Note: {} is not on PATH", bin_dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::singular(1, "(1 file)")]
    #[case::plural(3, "(3 files)")]
    fn success_message_pluralises_correctly(#[case] count: usize, #[case] expected: &str) {
        let paths = vec![PathBuf::from("/tmp/x"); count];
        assert!(success_message("tool", "1.0", &paths).ends_with(expected));
    }

    #[test]
    fn path_hint_is_silent_when_on_path() {
        let dir = PathBuf::from("/opt/parcel-test/bin");
        let joined = std::env::join_paths([dir.clone()]).expect("join paths");
        let hint = temp_env::with_var("PATH", Some(joined), || path_hint(&dir));
        assert!(hint.is_none());
    }

    #[test]
    fn path_hint_names_missing_directory() {
        let hint = temp_env::with_var("PATH", Some("/usr/bin"), || {
            path_hint(Path::new("/opt/parcel-test/bin"))
        });
        assert!(hint.is_some_and(|h| h.contains("/opt/parcel-test/bin")));
    }

    #[test]
    fn write_stderr_line_appends_newline() {
        let mut buffer = Vec::new();
        write_stderr_line(&mut buffer, "hello");
        assert_eq!(buffer, b"hello\n");
    }
}
