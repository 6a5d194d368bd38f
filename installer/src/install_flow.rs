//! The `install` and `test` commands.
//!
//! [`install_package`] wraps one pipeline run with the bookkeeping around
//! it: the per-package lock, the "already installed" short-circuit, the
//! runtime dependency check, the staging area's lifetime and the receipt
//! written on success. [`run_install`] wires it to the production
//! collaborators built from settings.

use crate::artefact::download::{ArtefactFetcher, HttpFetcher};
use crate::artefact::extraction::{ArchiveExtractor, ArtefactExtractor};
use crate::artefact::platform::Platform;
use crate::cli::{InstallArgs, TestArgs};
use crate::deps::{DependencyProbe, PathProbe, check_dependencies, missing};
use crate::dirs::BaseDirs;
use crate::error::Result;
use crate::lock::PackageLock;
use crate::output::{already_installed_message, path_hint, success_message, write_stderr_line};
use crate::pipeline::{InstallResult, PipelineContext, run_pipeline};
use crate::receipt::{Receipt, ReceiptStore};
use crate::recipe::PackageSpec;
use crate::retry::RetryingFetcher;
use crate::settings::Settings;
use crate::smoke::{ProcessSmokeTester, SmokeReport, SmokeTester};
use crate::staging::StagingArea;
use camino::Utf8Path;
use log::{debug, warn};
use std::io::Write;
use std::path::Path;

/// Collaborators an install run delegates to.
pub struct Toolset<'a> {
    /// Downloads artefacts.
    pub fetcher: &'a dyn ArtefactFetcher,
    /// Unpacks artefacts.
    pub extractor: &'a dyn ArtefactExtractor,
    /// Runs installed executables.
    pub smoke: &'a dyn SmokeTester,
    /// Looks up runtime dependencies.
    pub probe: &'a dyn DependencyProbe,
}

/// One install to perform.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    /// The loaded recipe.
    pub spec: &'a PackageSpec,
    /// Directory relative install targets resolve against.
    pub bin_dir: &'a Path,
    /// Directory holding receipts and locks.
    pub data_dir: &'a Path,
    /// Parent of the staging area, or the system temporary directory.
    pub staging_parent: Option<&'a Path>,
    /// Reinstall even when a current receipt exists.
    pub force: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

/// What an install command did.
#[derive(Debug)]
pub enum InstallOutcome {
    /// The pipeline ran to `Validated`.
    Installed(InstallResult),
    /// A current receipt existed, so nothing ran.
    AlreadyInstalled(Receipt),
}

/// Run the `install` command with production collaborators.
///
/// # Errors
///
/// Returns an error if the recipe, settings or directories are unusable, if
/// the package is locked by another run, or if any pipeline stage fails.
pub fn run_install(
    args: &InstallArgs,
    quiet: bool,
    settings: &Settings,
    dirs: &dyn BaseDirs,
    stderr: &mut dyn Write,
) -> Result<InstallOutcome> {
    let platform = args
        .platform
        .as_deref()
        .map(Platform::try_from)
        .transpose()?;
    let spec = PackageSpec::from_path(args.recipe.as_std_path(), platform.as_ref())?;
    let bin_dir = settings.bin_dir(args.bin_dir.as_deref().map(Utf8Path::as_std_path), dirs)?;
    let data_dir = settings.data_dir(dirs)?;

    let fetcher = RetryingFetcher::new(
        HttpFetcher::new(&settings.fetch_options())?,
        settings.retry_policy(),
    );
    let tools = Toolset {
        fetcher: &fetcher,
        extractor: &ArchiveExtractor,
        smoke: &ProcessSmokeTester,
        probe: &PathProbe,
    };
    let request = InstallRequest {
        spec: &spec,
        bin_dir: &bin_dir,
        data_dir: &data_dir,
        staging_parent: args.staging_dir.as_deref().map(Utf8Path::as_std_path),
        force: args.force,
        quiet,
    };
    install_package(&request, &tools, stderr)
}

/// Install one package under its lock, recording a receipt on success.
///
/// # Errors
///
/// Returns [`crate::error::InstallerError::Locked`] if another run holds
/// the package lock, the stage error if the pipeline fails, or an I/O or
/// receipt error from the surrounding bookkeeping.
pub fn install_package(
    request: &InstallRequest<'_>,
    tools: &Toolset<'_>,
    stderr: &mut dyn Write,
) -> Result<InstallOutcome> {
    let spec = request.spec;
    let _lock = PackageLock::acquire(request.data_dir, &spec.name)?;
    let store = ReceiptStore::new(request.data_dir);

    if let Some(receipt) = current_receipt(&store, request, stderr) {
        if !request.quiet {
            write_stderr_line(stderr, already_installed_message(&spec.name, &spec.version));
        }
        return Ok(InstallOutcome::AlreadyInstalled(receipt));
    }

    report_missing_dependencies(request, tools.probe, stderr);

    let staging = StagingArea::create(&spec.name, request.staging_parent)?;
    debug!("staging {} in {}", spec.name, staging.path().display());
    let result = run_pipeline(
        spec,
        &PipelineContext {
            bin_dir: request.bin_dir,
            staging: &staging,
            fetcher: tools.fetcher,
            extractor: tools.extractor,
            smoke: tools.smoke,
            quiet: request.quiet,
        },
        stderr,
    );
    if let Err(err) = staging.close() {
        warn!("failed to remove staging area: {err}");
    }

    let result = result.into_result()?;
    store.save(&Receipt::for_spec(spec, result.installed_paths.clone()))?;

    if !request.quiet {
        write_stderr_line(
            stderr,
            success_message(&spec.name, &spec.version, &result.installed_paths),
        );
        if let Some(version) = &result.detected_version {
            write_stderr_line(stderr, format!("  {version}"));
        }
        if let Some(hint) = path_hint(request.bin_dir) {
            write_stderr_line(stderr, hint);
        }
    }
    Ok(InstallOutcome::Installed(result))
}

/// Return the existing receipt when it makes this install redundant.
fn current_receipt(
    store: &ReceiptStore,
    request: &InstallRequest<'_>,
    stderr: &mut dyn Write,
) -> Option<Receipt> {
    if request.force {
        return None;
    }
    match store.load(&request.spec.name) {
        Ok(receipt) => receipt.filter(|receipt| receipt.is_current_for(request.spec)),
        Err(err) => {
            warn!("ignoring unusable receipt: {err}");
            if !request.quiet {
                write_stderr_line(
                    stderr,
                    format!("Warning: {err}; it will be replaced."),
                );
            }
            None
        }
    }
}

fn report_missing_dependencies(
    request: &InstallRequest<'_>,
    probe: &dyn DependencyProbe,
    stderr: &mut dyn Write,
) {
    let statuses = check_dependencies(probe, &request.spec.depends_on);
    if request.quiet {
        return;
    }
    for name in missing(&statuses) {
        write_stderr_line(
            stderr,
            format!(
                "Warning: runtime dependency `{name}` was not found on PATH; {} may not run.",
                request.spec.name
            ),
        );
    }
}

/// Run the `test` command: smoke-test an already installed package.
///
/// Without `--platform` the recipe is resolved for the platform recorded in
/// the package's receipt, so `{platform}` targets name the files that were
/// actually installed.
///
/// # Errors
///
/// Returns an error if the recipe or directories are unusable or the smoke
/// test fails.
pub fn run_test(
    args: &TestArgs,
    quiet: bool,
    settings: &Settings,
    dirs: &dyn BaseDirs,
    stderr: &mut dyn Write,
) -> Result<SmokeReport> {
    let data_dir = settings.data_dir(dirs)?;
    let spec = resolve_installed_spec(args, &data_dir)?;
    let bin_dir = settings.bin_dir(args.bin_dir.as_deref().map(Utf8Path::as_std_path), dirs)?;
    test_installed(&spec, &bin_dir, &ProcessSmokeTester, quiet, stderr)
}

fn resolve_installed_spec(args: &TestArgs, data_dir: &Path) -> Result<PackageSpec> {
    let recipe = args.recipe.as_std_path();
    if let Some(platform) = args.platform.as_deref() {
        let platform = Platform::try_from(platform)?;
        return Ok(PackageSpec::from_path(recipe, Some(&platform))?);
    }

    let spec = PackageSpec::from_path(recipe, None)?;
    let recorded = ReceiptStore::new(data_dir)
        .load(&spec.name)?
        .map(|receipt| receipt.platform)
        .filter(|platform| platform != spec.platform.as_str());
    match recorded {
        Some(platform) => {
            debug!("testing {} as installed for {platform}", spec.name);
            let platform = Platform::try_from(platform)?;
            Ok(PackageSpec::from_path(recipe, Some(&platform))?)
        }
        None => Ok(spec),
    }
}

/// Smoke-test the installed executable of `spec`.
///
/// # Errors
///
/// Returns [`crate::error::InstallerError::Validation`] if the executable
/// is missing, exits non-zero or overruns its timeout.
pub fn test_installed(
    spec: &PackageSpec,
    bin_dir: &Path,
    smoke: &dyn SmokeTester,
    quiet: bool,
    stderr: &mut dyn Write,
) -> Result<SmokeReport> {
    let executable = spec.smoke_executable(bin_dir);
    if !quiet {
        write_stderr_line(stderr, format!("Testing {}...", executable.display()));
    }
    let report = smoke.run(&executable, &spec.smoke.args, spec.smoke.timeout)?;
    if !quiet {
        let detail = report.version.as_deref().unwrap_or("no output");
        write_stderr_line(stderr, format!("{} passed: {detail}", spec.name));
    }
    Ok(report)
}
