//! The install pipeline: fetch, verify, extract, install, validate.
//!
//! Stages run strictly in order and the first failure ends the run. Each
//! transition is recorded so the caller can report exactly which stage
//! failed. Bytes are never extracted or executed before the digest check
//! has passed.
//!
//! ```text
//! Pending -> Fetched -> Verified -> Extracted -> Installed -> Validated
//!    \__________\__________\___________\___________\______> Failed(reason)
//! ```

use crate::artefact::download::ArtefactFetcher;
use crate::artefact::extraction::ArtefactExtractor;
use crate::artefact::format::ArchiveFormat;
use crate::artefact::verification::verify_file;
use crate::error::{ErrorKind, InstallerError};
use crate::output::write_stderr_line;
use crate::placement::place_files;
use crate::recipe::PackageSpec;
use crate::smoke::SmokeTester;
use crate::staging::StagingArea;
use log::{debug, trace};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Download the artefact.
    Fetch,
    /// Check the artefact digest.
    Verify,
    /// Unpack the artefact into staging.
    Extract,
    /// Copy files to their targets.
    Install,
    /// Smoke-test the installed executable.
    Validate,
}

impl Stage {
    /// The error kind a failure at this stage is reported as.
    #[must_use]
    pub fn error_kind(self) -> ErrorKind {
        match self {
            Self::Fetch => ErrorKind::Network,
            Self::Verify => ErrorKind::Integrity,
            Self::Extract => ErrorKind::Extraction,
            Self::Install => ErrorKind::Install,
            Self::Validate => ErrorKind::Validation,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Extract => "extract",
            Self::Install => "install",
            Self::Validate => "validate",
        })
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    /// The stage that failed.
    pub stage: Stage,
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub cause: String,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed ({}): {}", self.stage, self.kind, self.cause)
    }
}

/// Position of a run in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Nothing has run yet.
    Pending,
    /// The artefact has been downloaded.
    Fetched,
    /// The artefact matched its digest.
    Verified,
    /// The artefact has been unpacked.
    Extracted,
    /// Files have been copied to their targets.
    Installed,
    /// The smoke test passed. Terminal.
    Validated,
    /// A stage failed. Terminal.
    Failed(FailureReason),
}

impl InstallState {
    /// Return true for `Validated` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Verified => "verified",
            Self::Extracted => "extracted",
            Self::Installed => "installed",
            Self::Validated => "validated",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct InstallResult {
    /// True when the run reached `Validated`.
    pub success: bool,
    /// Files written to their targets, in mapping order. Files placed
    /// before a later stage failed are still listed; nothing is rolled back.
    pub installed_paths: Vec<PathBuf>,
    /// Error classification when the run failed.
    pub error: Option<ErrorKind>,
    /// Terminal state.
    pub state: InstallState,
    /// Every state visited, starting with `Pending`.
    pub history: Vec<InstallState>,
    /// Verified digest of the artefact, once verification passed.
    pub digest: Option<String>,
    /// First line of smoke-test output, once validation passed.
    pub detected_version: Option<String>,
    cause: Option<InstallerError>,
}

impl InstallResult {
    /// The failure reason, if the run failed.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.state {
            InstallState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Convert a failed run into its underlying error.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the run when it did not succeed.
    pub fn into_result(mut self) -> crate::error::Result<Self> {
        match self.cause.take() {
            Some(cause) => Err(cause),
            None => Ok(self),
        }
    }
}

/// Everything a pipeline run needs besides the recipe.
pub struct PipelineContext<'a> {
    /// Directory relative install targets resolve against.
    pub bin_dir: &'a Path,
    /// Staging area owned by this run.
    pub staging: &'a StagingArea,
    /// Downloads the artefact.
    pub fetcher: &'a dyn ArtefactFetcher,
    /// Unpacks the artefact.
    pub extractor: &'a dyn ArtefactExtractor,
    /// Runs the installed executable.
    pub smoke: &'a dyn SmokeTester,
    /// Suppress progress output.
    pub quiet: bool,
}

struct StageFailure {
    stage: Stage,
    error: InstallerError,
}

fn at<E: Into<InstallerError>>(stage: Stage) -> impl FnOnce(E) -> StageFailure {
    move |error| StageFailure {
        stage,
        error: error.into(),
    }
}

/// Records transitions for one run.
struct Tracker<'a> {
    package: &'a str,
    history: Vec<InstallState>,
    installed_paths: Vec<PathBuf>,
    digest: Option<String>,
    detected_version: Option<String>,
}

impl<'a> Tracker<'a> {
    fn new(package: &'a str) -> Self {
        Self {
            package,
            history: vec![InstallState::Pending],
            installed_paths: Vec::new(),
            digest: None,
            detected_version: None,
        }
    }

    fn advance(&mut self, next: InstallState) {
        if let Some(current) = self.history.last() {
            debug!("{}: {current} -> {next}", self.package);
        }
        self.history.push(next);
    }

    fn finish(mut self, outcome: Result<(), StageFailure>) -> InstallResult {
        let (error, cause) = match outcome {
            Ok(()) => (None, None),
            Err(StageFailure { stage, error }) => {
                let kind = error.kind().unwrap_or_else(|| stage.error_kind());
                self.advance(InstallState::Failed(FailureReason {
                    stage,
                    kind,
                    cause: error.to_string(),
                }));
                (Some(kind), Some(error))
            }
        };
        let state = self
            .history
            .last()
            .cloned()
            .unwrap_or(InstallState::Pending);
        InstallResult {
            success: matches!(state, InstallState::Validated),
            installed_paths: self.installed_paths,
            error,
            state,
            history: self.history,
            digest: self.digest,
            detected_version: self.detected_version,
            cause,
        }
    }
}

/// Run every stage for `spec`, stopping at the first failure.
///
/// Never returns an error directly: failures are reported through
/// [`InstallResult::state`] and [`InstallResult::error`].
///
/// # Examples
///
/// ```no_run
/// use parcel_installer::artefact::download::{FetchOptions, HttpFetcher};
/// use parcel_installer::artefact::extraction::ArchiveExtractor;
/// use parcel_installer::pipeline::{PipelineContext, run_pipeline};
/// use parcel_installer::recipe::PackageSpec;
/// use parcel_installer::smoke::ProcessSmokeTester;
/// use parcel_installer::staging::StagingArea;
/// use std::path::Path;
///
/// let spec = PackageSpec::from_path(Path::new("tool.toml"), None)?;
/// let staging = StagingArea::create(&spec.name, None)?;
/// let fetcher = HttpFetcher::new(&FetchOptions::default())?;
/// let context = PipelineContext {
///     bin_dir: Path::new("/usr/local/bin"),
///     staging: &staging,
///     fetcher: &fetcher,
///     extractor: &ArchiveExtractor,
///     smoke: &ProcessSmokeTester,
///     quiet: false,
/// };
/// let result = run_pipeline(&spec, &context, &mut std::io::stderr());
/// assert!(result.success);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn run_pipeline(
    spec: &PackageSpec,
    context: &PipelineContext<'_>,
    stderr: &mut dyn Write,
) -> InstallResult {
    let mut tracker = Tracker::new(&spec.name);
    let outcome = run_stages(spec, context, &mut tracker, stderr);
    tracker.finish(outcome)
}

fn run_stages(
    spec: &PackageSpec,
    context: &PipelineContext<'_>,
    tracker: &mut Tracker<'_>,
    stderr: &mut dyn Write,
) -> Result<(), StageFailure> {
    let mut progress = |message: String| {
        if !context.quiet {
            write_stderr_line(stderr, message);
        }
    };

    let artefact = context
        .staging
        .download_dir()
        .join(artefact_file_name(spec));
    progress(format!("Fetching {}...", spec.source_url));
    let bytes = context
        .fetcher
        .fetch(&spec.source_url, &artefact)
        .map_err(at(Stage::Fetch))?;
    trace!("fetched {bytes} bytes to {}", artefact.display());
    tracker.advance(InstallState::Fetched);

    let digest = verify_file(&artefact, &spec.expected_digest).map_err(at(Stage::Verify))?;
    tracker.digest = Some(digest);
    tracker.advance(InstallState::Verified);

    progress(format!("Extracting {} archive...", spec.format));
    let extracted = context
        .extractor
        .extract(&artefact, spec.format, context.staging.extract_dir())
        .map_err(at(Stage::Extract))?;
    trace!("extracted {} files", extracted.len());
    tracker.advance(InstallState::Extracted);

    progress(format!("Installing to {}...", context.bin_dir.display()));
    place_files(
        context.staging.extract_dir(),
        &spec.install,
        context.bin_dir,
        &mut tracker.installed_paths,
    )
    .map_err(at(Stage::Install))?;
    tracker.advance(InstallState::Installed);

    let executable = spec.smoke_executable(context.bin_dir);
    progress(format!("Testing {}...", executable.display()));
    let report = context
        .smoke
        .run(&executable, &spec.smoke.args, spec.smoke.timeout)
        .map_err(at(Stage::Validate))?;
    tracker.detected_version = report.version;
    tracker.advance(InstallState::Validated);
    Ok(())
}

/// File name the artefact is downloaded under.
///
/// Raw artefacts are named after their install source so extraction can
/// copy them through unchanged.
fn artefact_file_name(spec: &PackageSpec) -> String {
    if spec.format == ArchiveFormat::Raw
        && let Some(name) = spec
            .install
            .first()
            .and_then(|entry| entry.source.file_name())
    {
        return name.to_string_lossy().into_owned();
    }
    format!("{}.{}", spec.name, spec.format.name())
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
