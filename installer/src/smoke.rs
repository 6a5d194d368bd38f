//! Smoke-testing installed executables.
//!
//! The executable runs as a child process with captured output and a
//! wall-clock limit. A non-zero exit, death by signal or an overrun are all
//! validation failures; an overrunning child is killed and reaped.
//!
//! The limit also covers reading the child's output. A process the child
//! left running in the background may keep the pipes open; whatever arrived
//! before the deadline is kept and the readers are abandoned.

use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Attempts made when the kernel reports the executable as busy.
const BUSY_RETRIES: u32 = 5;
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// Errors arising from a smoke test.
#[derive(Debug, thiserror::Error)]
pub enum SmokeError {
    /// The executable could not be started.
    #[error("failed to run {}: {source}", path.display())]
    Spawn {
        /// The executable.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The executable exited with a non-zero status.
    #[error("{} exited with status {code}{}", path.display(), stderr_suffix(stderr))]
    NonZeroExit {
        /// The executable.
        path: PathBuf,
        /// The exit code.
        code: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The executable was terminated by a signal.
    #[error("{} was terminated by a signal", path.display())]
    Signalled {
        /// The executable.
        path: PathBuf,
    },

    /// The executable did not finish in time and was killed.
    #[error("{} did not exit within {} seconds", path.display(), timeout.as_secs_f32())]
    TimedOut {
        /// The executable.
        path: PathBuf,
        /// The limit that elapsed.
        timeout: Duration,
    },

    /// Waiting for the child failed.
    #[error("failed waiting for {}: {source}", path.display())]
    Wait {
        /// The executable.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Outcome of a passing smoke test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeReport {
    /// First non-empty line of standard output, if any.
    pub version: Option<String>,
    /// Full captured standard output.
    pub stdout: String,
}

/// Runs an installed executable to check that it works.
#[cfg_attr(test, mockall::automock)]
pub trait SmokeTester {
    /// Run `executable` with `args`, failing if it does not exit zero
    /// within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`SmokeError`] describing why the run failed.
    fn run(
        &self,
        executable: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<SmokeReport, SmokeError>;
}

/// [`SmokeTester`] that spawns a real child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSmokeTester;

impl SmokeTester for ProcessSmokeTester {
    fn run(
        &self,
        executable: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<SmokeReport, SmokeError> {
        debug!("smoke testing {} {args:?}", executable.display());
        let wait_error = |source| SmokeError::Wait {
            path: executable.to_path_buf(),
            source,
        };

        let deadline = Instant::now() + timeout;
        let mut child = spawn(executable, args)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(status) = child.wait_timeout(timeout).map_err(wait_error)? else {
            // Kill and reap; the child may already have exited between the
            // timeout and the kill.
            if child.kill().is_err() {
                debug!("child {} already exited", executable.display());
            }
            child.wait().map_err(wait_error)?;
            return Err(SmokeError::TimedOut {
                path: executable.to_path_buf(),
                timeout,
            });
        };

        let stdout = collect(stdout, deadline);
        let stderr = collect(stderr, deadline);
        check_status(executable, status, stderr)?;

        let version = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_owned);
        Ok(SmokeReport { version, stdout })
    }
}

fn spawn(executable: &Path, args: &[String]) -> Result<Child, SmokeError> {
    let mut attempt = 0;
    loop {
        let result = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match result {
            Ok(child) => return Ok(child),
            // A freshly written executable can briefly be held open for
            // writing by a concurrently forked process.
            Err(err)
                if err.kind() == std::io::ErrorKind::ExecutableFileBusy
                    && attempt < BUSY_RETRIES =>
            {
                attempt += 1;
                std::thread::sleep(BUSY_BACKOFF);
            }
            Err(source) => {
                return Err(SmokeError::Spawn {
                    path: executable.to_path_buf(),
                    source,
                });
            }
        }
    }
}

/// Read a pipe on a background thread so a chatty child cannot block on a
/// full pipe while it is being waited on. Chunks are forwarded as they
/// arrive; the channel closes at end of file.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    pipe.map(|mut pipe| {
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buffer = [0_u8; 8192];
            loop {
                match pipe.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => {
                        if sender.send(buffer[..read].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(err) => {
                        debug!("failed reading child output: {err}");
                        break;
                    }
                }
            }
        });
        receiver
    })
}

/// Gather drained output until the pipe closes or `deadline` passes.
fn collect(receiver: Option<Receiver<Vec<u8>>>, deadline: Instant) -> String {
    let Some(receiver) = receiver else {
        return String::new();
    };
    let mut bytes = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                debug!("child output still open at the deadline; keeping what was read");
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn check_status(executable: &Path, status: ExitStatus, stderr: String) -> Result<(), SmokeError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(SmokeError::NonZeroExit {
            path: executable.to_path_buf(),
            code,
            stderr: stderr.trim().to_owned(),
        }),
        None => Err(SmokeError::Signalled {
            path: executable.to_path_buf(),
        }),
    }
}
