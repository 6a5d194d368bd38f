//! BDD tests for receipts: listing, removal and per-package locking.
#![cfg(unix)]

use parcel_installer::artefact::extraction::ArchiveExtractor;
use parcel_installer::cli::{ListArgs, RemoveArgs};
use parcel_installer::deps::PathProbe;
use parcel_installer::error::InstallerError;
use parcel_installer::install_flow::{InstallRequest, Toolset, install_package};
use parcel_installer::list::run_list;
use parcel_installer::lock::PackageLock;
use parcel_installer::receipt::ReceiptStore;
use parcel_installer::remove::run_remove;
use parcel_installer::settings::Settings;
use parcel_installer::smoke::ProcessSmokeTester;
use parcel_installer::test_utils::{FixedBaseDirs, RecipeBuilder, StubFetcher, sha256_hex};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::path::PathBuf;
use tempfile::TempDir;

const SCRIPT: &[u8] = b"#!/bin/sh\necho ok\n";

struct ReceiptsWorld {
    temp: TempDir,
    dirs: FixedBaseDirs,
    held_lock: Option<PackageLock>,
    stdout: Vec<u8>,
    result: Option<Result<(), InstallerError>>,
}

impl ReceiptsWorld {
    fn bin_dir(&self) -> PathBuf {
        self.temp.path().join("bin")
    }

    fn data_dir(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    fn install(&self, name: &str) -> Result<(), InstallerError> {
        let spec = RecipeBuilder::new(name)
            .url(&format!("https://example.test/{name}"))
            .format("raw")
            .sha256(&sha256_hex(SCRIPT))
            .build_spec();
        let fetcher = StubFetcher::serving(SCRIPT);
        let tools = Toolset {
            fetcher: &fetcher,
            extractor: &ArchiveExtractor,
            smoke: &ProcessSmokeTester,
            probe: &PathProbe,
        };
        let request = InstallRequest {
            spec: &spec,
            bin_dir: &self.bin_dir(),
            data_dir: &self.data_dir(),
            staging_parent: None,
            force: false,
            quiet: true,
        };
        install_package(&request, &tools, &mut Vec::new()).map(|_| ())
    }

    fn list(&mut self, json: bool) {
        let result = run_list(
            &ListArgs { json },
            &Settings::default(),
            &self.dirs,
            &mut self.stdout,
        );
        self.result = Some(result);
    }
}

#[fixture]
fn world() -> ReceiptsWorld {
    let temp = TempDir::new().expect("temp dir");
    let dirs = FixedBaseDirs::new(temp.path());
    ReceiptsWorld {
        temp,
        dirs,
        held_lock: None,
        stdout: Vec::new(),
        result: None,
    }
}

#[given("the package \"{name}\" is installed")]
fn given_installed(world: &mut ReceiptsWorld, name: String) {
    world.install(&name).expect("install succeeds");
}

#[given("another run holds the lock for \"{name}\"")]
fn given_lock_held(world: &mut ReceiptsWorld, name: String) {
    let lock = PackageLock::acquire(&world.data_dir(), &name).expect("acquire lock");
    world.held_lock = Some(lock);
}

#[when("the installed packages are listed")]
fn when_listed(world: &mut ReceiptsWorld) {
    world.list(false);
}

#[when("the installed packages are listed as JSON")]
fn when_listed_json(world: &mut ReceiptsWorld) {
    world.list(true);
}

#[when("the package \"{name}\" is removed")]
fn when_removed(world: &mut ReceiptsWorld, name: String) {
    let result = run_remove(
        &RemoveArgs { name },
        true,
        &Settings::default(),
        &world.dirs,
        &mut Vec::new(),
    );
    world.result = Some(result.map(|_| ()));
}

#[when("the package \"{name}\" is installed")]
fn when_installed(world: &mut ReceiptsWorld, name: String) {
    let result = world.install(&name);
    world.result = Some(result);
}

#[then("the listing mentions \"{text}\"")]
fn then_listing_mentions(world: &mut ReceiptsWorld, text: String) {
    assert!(matches!(world.result, Some(Ok(()))), "{:?}", world.result);
    let output = String::from_utf8_lossy(&world.stdout);
    assert!(output.contains(&text), "{output}");
}

#[then("the JSON listing names \"{name}\"")]
fn then_json_names(world: &mut ReceiptsWorld, name: String) {
    let value: serde_json::Value = serde_json::from_slice(&world.stdout).expect("valid JSON");
    let names: Vec<&str> = value["packages"]
        .as_array()
        .expect("packages array")
        .iter()
        .filter_map(|package| package["name"].as_str())
        .collect();
    assert_eq!(names, vec![name.as_str()]);
}

#[then("\"{name}\" in the binary directory does not exist")]
fn then_absent(world: &mut ReceiptsWorld, name: String) {
    assert!(matches!(world.result, Some(Ok(()))), "{:?}", world.result);
    assert!(!world.bin_dir().join(name).exists());
}

#[then("no receipt is recorded for \"{name}\"")]
fn then_no_receipt(world: &mut ReceiptsWorld, name: String) {
    let store = ReceiptStore::new(&world.data_dir());
    assert!(store.load(&name).expect("load receipt").is_none());
}

#[then("the command fails mentioning \"{text}\"")]
fn then_fails_mentioning(world: &mut ReceiptsWorld, text: String) {
    match &world.result {
        Some(Err(err)) => assert!(err.to_string().contains(&text), "{err}"),
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[scenario(
    path = "tests/features/receipts.feature",
    name = "Installed packages are listed"
)]
fn scenario_list(world: ReceiptsWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/receipts.feature",
    name = "An empty data directory lists nothing"
)]
fn scenario_list_empty(world: ReceiptsWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/receipts.feature",
    name = "Installed packages are listed as JSON"
)]
fn scenario_list_json(world: ReceiptsWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/receipts.feature",
    name = "Removing a package deletes its files and receipt"
)]
fn scenario_remove(world: ReceiptsWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/receipts.feature",
    name = "Removing an unknown package fails"
)]
fn scenario_remove_unknown(world: ReceiptsWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/receipts.feature",
    name = "A package locked by another run cannot be installed"
)]
fn scenario_locked(world: ReceiptsWorld) {
    let _ = world;
}
