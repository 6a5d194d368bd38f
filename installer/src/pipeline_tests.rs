//! Unit tests for the install pipeline.
//!
//! The fetcher and smoke tester are mocked so the tests never touch the
//! network or spawn processes; extraction and placement run for real
//! against temporary directories unless a test needs to prove a stage was
//! never reached.

use super::*;
use crate::artefact::download::{DownloadError, MockArtefactFetcher};
use crate::artefact::extraction::{ArchiveExtractor, MockArtefactExtractor};
use crate::smoke::{MockSmokeTester, SmokeError, SmokeReport};
use crate::test_utils::{
    RecipeBuilder, TarEntry, sha256_hex, tar_gz_bytes, tar_gz_with_raw_entry,
};
use rstest::{fixture, rstest};
use std::time::Duration;

const X_BYTES: &[u8] = b"#!/bin/sh\n";

struct Harness {
    _temp: tempfile::TempDir,
    bin_dir: PathBuf,
    staging: StagingArea,
}

#[fixture]
fn harness() -> Harness {
    let temp = tempfile::tempdir().expect("temp dir");
    let bin_dir = temp.path().join("bin");
    let staging = StagingArea::create("x", Some(&temp.path().join("staging"))).expect("staging");
    Harness {
        _temp: temp,
        bin_dir,
        staging,
    }
}

impl Harness {
    fn context<'a>(
        &'a self,
        fetcher: &'a dyn ArtefactFetcher,
        extractor: &'a dyn ArtefactExtractor,
        smoke: &'a dyn SmokeTester,
    ) -> PipelineContext<'a> {
        PipelineContext {
            bin_dir: &self.bin_dir,
            staging: &self.staging,
            fetcher,
            extractor,
            smoke,
            quiet: true,
        }
    }
}

fn raw_spec(digest: &str) -> PackageSpec {
    RecipeBuilder::new("x")
        .url("https://example.test/x")
        .format("raw")
        .sha256(digest)
        .install("x", "x", true)
        .build_spec()
}

fn serving(bytes: impl Into<Vec<u8>>) -> MockArtefactFetcher {
    let bytes = bytes.into();
    let mut fetcher = MockArtefactFetcher::new();
    fetcher.expect_fetch().times(1).returning(move |_, dest| {
        std::fs::write(dest, &bytes).map_err(DownloadError::Io)?;
        Ok(u64::try_from(bytes.len()).expect("length fits u64"))
    });
    fetcher
}

fn passing_smoke() -> MockSmokeTester {
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().times(1).returning(|_, _, _| {
        Ok(SmokeReport {
            version: Some("x 1.0.0".to_owned()),
            stdout: "x 1.0.0\n".to_owned(),
        })
    });
    smoke
}

#[rstest]
fn raw_artefact_reaches_validated(harness: Harness) {
    let spec = raw_spec(&sha256_hex(X_BYTES));
    let fetcher = serving(X_BYTES);
    let smoke = passing_smoke();
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert!(result.success, "{:?}", result.failure());
    assert_eq!(result.state, InstallState::Validated);
    assert_eq!(
        result.history,
        vec![
            InstallState::Pending,
            InstallState::Fetched,
            InstallState::Verified,
            InstallState::Extracted,
            InstallState::Installed,
            InstallState::Validated,
        ]
    );
    assert_eq!(result.installed_paths, vec![harness.bin_dir.join("x")]);
    assert_eq!(result.error, None);
    assert_eq!(result.detected_version.as_deref(), Some("x 1.0.0"));
    assert_eq!(result.digest, Some(sha256_hex(X_BYTES)));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(harness.bin_dir.join("x"))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[rstest]
fn smoke_test_runs_installed_target_with_recipe_args(harness: Harness) {
    let spec = raw_spec(&sha256_hex(X_BYTES));
    let fetcher = serving(X_BYTES);
    let expected = harness.bin_dir.join("x");
    let mut smoke = MockSmokeTester::new();
    smoke
        .expect_run()
        .withf(move |path, args, timeout| {
            path == expected.as_path()
                && args == ["--version"]
                && *timeout == Duration::from_secs(30)
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(SmokeReport {
                version: None,
                stdout: String::new(),
            })
        });
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    assert!(run_pipeline(&spec, &context, &mut Vec::new()).success);
}

#[rstest]
fn digest_mismatch_stops_before_extraction(harness: Harness) {
    let spec = raw_spec(&sha256_hex(b"something else"));
    let fetcher = serving(X_BYTES);
    let mut extractor = MockArtefactExtractor::new();
    extractor.expect_extract().never();
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().never();
    let context = harness.context(&fetcher, &extractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::Integrity));
    let failure = result.failure().expect("failure reason");
    assert_eq!(failure.stage, Stage::Verify);
    assert!(failure.cause.contains("checksum mismatch"), "{}", failure.cause);
    assert_eq!(
        std::fs::read_dir(harness.staging.extract_dir())
            .expect("read extract dir")
            .count(),
        0
    );
    assert!(!harness.bin_dir.exists());
}

#[rstest]
fn fetch_failure_is_a_network_error(harness: Harness) {
    let spec = raw_spec(&sha256_hex(X_BYTES));
    let mut fetcher = MockArtefactFetcher::new();
    fetcher.expect_fetch().times(1).returning(|url, _| {
        Err(DownloadError::NotFound {
            url: url.to_owned(),
        })
    });
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().never();
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert_eq!(result.error, Some(ErrorKind::Network));
    assert_eq!(result.history.len(), 2);
    assert!(result.state.is_terminal());
    let err = result.into_result().expect_err("fetch failed");
    assert!(matches!(err, InstallerError::Fetch(DownloadError::NotFound { .. })));
}

#[rstest]
fn traversal_entry_fails_extraction_without_writing_outside(harness: Harness) {
    let archive = tar_gz_with_raw_entry("../escape", b"owned");
    let spec = RecipeBuilder::new("x")
        .url("https://example.test/x.tar.gz")
        .sha256(&sha256_hex(&archive))
        .install("x", "x", true)
        .build_spec();
    let fetcher = serving(archive);
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().never();
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert_eq!(result.error, Some(ErrorKind::Extraction));
    assert_eq!(result.failure().map(|f| f.stage), Some(Stage::Extract));
    assert!(!harness.staging.path().join("escape").exists());
    assert!(result.installed_paths.is_empty());
}

#[rstest]
fn missing_install_source_is_an_install_error(harness: Harness) {
    let archive = tar_gz_bytes(&[TarEntry::file("other", b"data")]);
    let spec = RecipeBuilder::new("x")
        .url("https://example.test/x.tar.gz")
        .sha256(&sha256_hex(&archive))
        .install("bin/x", "x", true)
        .build_spec();
    let fetcher = serving(archive);
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().never();
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert_eq!(result.error, Some(ErrorKind::Install));
    assert_eq!(result.failure().map(|f| f.stage), Some(Stage::Install));
}

#[rstest]
fn failed_smoke_test_keeps_installed_paths(harness: Harness) {
    let spec = raw_spec(&sha256_hex(X_BYTES));
    let fetcher = serving(X_BYTES);
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().times(1).returning(|path, _, timeout| {
        Err(SmokeError::TimedOut {
            path: path.to_path_buf(),
            timeout,
        })
    });
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert_eq!(result.error, Some(ErrorKind::Validation));
    assert_eq!(result.installed_paths, vec![harness.bin_dir.join("x")]);
    assert_eq!(
        result.history.get(result.history.len() - 2),
        Some(&InstallState::Installed)
    );
    let failure = result.failure().expect("failure");
    assert!(failure.to_string().starts_with("validate stage failed (validation error)"));
}

#[rstest]
fn placement_failure_still_reports_files_already_written(harness: Harness) {
    let archive = tar_gz_bytes(&[
        TarEntry::executable("a", b"#!/bin/sh\n"),
        TarEntry::file("b", b"data"),
    ]);
    let spec = RecipeBuilder::new("x")
        .url("https://example.test/x.tar.gz")
        .sha256(&sha256_hex(&archive))
        .install("a", "a", true)
        .also_install("b", "blocker/b", false)
        .test_executable("a")
        .build_spec();
    std::fs::create_dir_all(&harness.bin_dir).expect("create bin");
    std::fs::write(harness.bin_dir.join("blocker"), b"a file").expect("write blocker");
    let fetcher = serving(archive);
    let mut smoke = MockSmokeTester::new();
    smoke.expect_run().never();
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert_eq!(result.error, Some(ErrorKind::Install));
    assert!(harness.bin_dir.join("a").is_file());
    assert_eq!(result.installed_paths, vec![harness.bin_dir.join("a")]);
}

#[rstest]
#[case::quiet(true)]
#[case::verbose(false)]
fn progress_output_respects_quiet(harness: Harness, #[case] quiet: bool) {
    let spec = raw_spec(&sha256_hex(X_BYTES));
    let fetcher = serving(X_BYTES);
    let smoke = passing_smoke();
    let mut context = harness.context(&fetcher, &ArchiveExtractor, &smoke);
    context.quiet = quiet;
    let mut stderr = Vec::new();

    run_pipeline(&spec, &context, &mut stderr);

    let output = String::from_utf8(stderr).expect("utf8");
    assert_eq!(output.is_empty(), quiet, "{output}");
    if !quiet {
        assert!(output.contains("Fetching https://example.test/x"));
    }
}

#[rstest]
fn tarball_installs_every_mapping_and_tests_the_named_executable(harness: Harness) {
    let archive = tar_gz_bytes(&[
        TarEntry::executable("bal-2.0/bin/bal", b"#!/bin/sh\n"),
        TarEntry::file("bal-2.0/lib/bal.jar", b"jar"),
    ]);
    let spec = RecipeBuilder::new("bal")
        .version("2.0")
        .sha256(&sha256_hex(&archive))
        .install("bal-{version}/lib/bal.jar", "lib/bal.jar", false)
        .also_install("bal-{version}/bin/bal", "bal", true)
        .test_executable("bal")
        .test_args(&["version"])
        .build_spec();
    let fetcher = serving(archive);
    let expected = harness.bin_dir.join("bal");
    let mut smoke = MockSmokeTester::new();
    smoke
        .expect_run()
        .withf(move |path, args, _| path == expected.as_path() && args == ["version"])
        .times(1)
        .returning(|_, _, _| {
            Ok(SmokeReport {
                version: Some("bal 2.0".to_owned()),
                stdout: "bal 2.0\n".to_owned(),
            })
        });
    let context = harness.context(&fetcher, &ArchiveExtractor, &smoke);

    let result = run_pipeline(&spec, &context, &mut Vec::new());

    assert!(result.success, "{:?}", result.failure());
    assert_eq!(
        result.installed_paths,
        vec![
            harness.bin_dir.join("lib/bal.jar"),
            harness.bin_dir.join("bal"),
        ]
    );
}

#[test]
fn archive_artefacts_are_named_after_the_package() {
    let spec = RecipeBuilder::new("tool").build_spec();
    assert_eq!(artefact_file_name(&spec), "tool.tar.gz");
    assert_eq!(artefact_file_name(&raw_spec(&sha256_hex(X_BYTES))), "x");
}

#[rstest]
#[case(Stage::Fetch, ErrorKind::Network)]
#[case(Stage::Verify, ErrorKind::Integrity)]
#[case(Stage::Extract, ErrorKind::Extraction)]
#[case(Stage::Install, ErrorKind::Install)]
#[case(Stage::Validate, ErrorKind::Validation)]
fn stages_map_to_error_kinds(#[case] stage: Stage, #[case] kind: ErrorKind) {
    assert_eq!(stage.error_kind(), kind);
}
