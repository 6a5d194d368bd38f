//! Install receipts.
//!
//! A successful install records what it put where at
//! `<data_dir>/receipts/<name>.json`. Receipts let a repeat install be
//! skipped, back `parcel list`, and tell `parcel remove` which files to
//! delete.

use crate::recipe::PackageSpec;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const RECEIPTS_DIRNAME: &str = "receipts";
const RECEIPT_EXTENSION: &str = "json";

/// Record of one installed package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    /// Package name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Platform identifier the artefact targeted.
    pub platform: String,
    /// URL the artefact was fetched from.
    pub url: String,
    /// Verified SHA-256 digest of the artefact.
    pub digest: String,
    /// Files written, in install order.
    pub installed_paths: Vec<PathBuf>,
    /// Install time in seconds since the Unix epoch.
    pub installed_at: u64,
}

impl Receipt {
    /// Build a receipt for `spec` stamped with the current time.
    #[must_use]
    pub fn for_spec(spec: &PackageSpec, installed_paths: Vec<PathBuf>) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            name: spec.name.clone(),
            version: spec.version.clone(),
            platform: spec.platform.to_string(),
            url: spec.source_url.clone(),
            digest: spec.expected_digest.to_string(),
            installed_paths,
            installed_at,
        }
    }

    /// Return true when this receipt records exactly `spec`'s artefact and
    /// every recorded file is still present.
    #[must_use]
    pub fn is_current_for(&self, spec: &PackageSpec) -> bool {
        self.version == spec.version
            && self.digest == spec.expected_digest.as_str()
            && self.platform == spec.platform.as_str()
            && self.installed_paths.iter().all(|path| path.is_file())
    }
}

/// Errors arising from receipt persistence.
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    /// The receipts directory could not be created.
    #[error("failed to create receipts directory {}: {source}", path.display())]
    CreateDirectory {
        /// Directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A receipt could not be read.
    #[error("failed to read receipt {}: {source}", path.display())]
    Read {
        /// Receipt path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A receipt exists but is not valid JSON.
    #[error("corrupt receipt {}: {source}", path.display())]
    Corrupt {
        /// Receipt path.
        path: PathBuf,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A receipt could not be serialised.
    #[error("failed to serialise receipt: {source}")]
    Serialize {
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A receipt could not be written or removed.
    #[error("failed to write receipt {}: {source}", path.display())]
    Write {
        /// Receipt path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Receipts found in the store.
#[derive(Debug, Default)]
pub struct ReceiptListing {
    /// Readable receipts, sorted by package name.
    pub receipts: Vec<Receipt>,
    /// Receipt files that could not be parsed.
    pub corrupt: Vec<PathBuf>,
}

/// Directory of receipts.
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    dir: PathBuf,
}

impl ReceiptStore {
    /// Open the store under `data_dir`. Nothing is created until a receipt
    /// is saved.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(RECEIPTS_DIRNAME),
        }
    }

    /// Path of the receipt for `name`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECEIPT_EXTENSION}"))
    }

    /// Load the receipt for `name`, or `None` if the package is not
    /// installed.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::Read`] or [`ReceiptError::Corrupt`] if the
    /// receipt exists but cannot be used.
    pub fn load(&self, name: &str) -> Result<Option<Receipt>, ReceiptError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        read_receipt(&path).map(Some)
    }

    /// Write `receipt`, replacing any previous receipt for the package.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError`] if the receipt cannot be written.
    pub fn save(&self, receipt: &Receipt) -> Result<(), ReceiptError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ReceiptError::CreateDirectory {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(&receipt.name);
        let write_error = |source| ReceiptError::Write {
            path: path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(receipt)
            .map_err(|source| ReceiptError::Serialize { source })?;

        let mut staged = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_error)?;
        std::io::Write::write_all(&mut staged, json.as_bytes()).map_err(write_error)?;
        staged.persist(&path).map_err(|e| write_error(e.error))?;
        Ok(())
    }

    /// Delete the receipt for `name`. Missing receipts are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::Write`] if the file exists but cannot be
    /// removed.
    pub fn remove(&self, name: &str) -> Result<(), ReceiptError> {
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ReceiptError::Write { path, source }),
        }
    }

    /// List every receipt. Corrupt receipts are reported separately rather
    /// than failing the listing.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::Read`] if the directory cannot be read.
    pub fn list(&self) -> Result<ReceiptListing, ReceiptError> {
        let mut listing = ReceiptListing::default();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(source) => {
                return Err(ReceiptError::Read {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        for entry in entries {
            let path = entry
                .map_err(|source| ReceiptError::Read {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_none_or(|ext| ext != RECEIPT_EXTENSION) {
                continue;
            }
            match read_receipt(&path) {
                Ok(receipt) => listing.receipts.push(receipt),
                Err(ReceiptError::Corrupt { path, source }) => {
                    warn!("skipping corrupt receipt {}: {source}", path.display());
                    listing.corrupt.push(path);
                }
                Err(other) => return Err(other),
            }
        }

        listing.receipts.sort_by(|a, b| a.name.cmp(&b.name));
        listing.corrupt.sort();
        Ok(listing)
    }
}

fn read_receipt(path: &Path) -> Result<Receipt, ReceiptError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReceiptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ReceiptError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecipeBuilder;
    use rstest::{fixture, rstest};

    struct Fixture {
        _temp: tempfile::TempDir,
        store: ReceiptStore,
        root: PathBuf,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = temp.path().to_path_buf();
        Fixture {
            store: ReceiptStore::new(&root),
            _temp: temp,
            root,
        }
    }

    fn receipt(name: &str, paths: Vec<PathBuf>) -> Receipt {
        Receipt {
            name: name.to_owned(),
            version: "1.0.0".to_owned(),
            platform: "linux-x64".to_owned(),
            url: "https://example.test/x.tar.gz".to_owned(),
            digest: "a".repeat(64),
            installed_paths: paths,
            installed_at: 1_700_000_000,
        }
    }

    #[rstest]
    fn save_then_load(fixture: Fixture) {
        let original = receipt("tool", vec![PathBuf::from("/bin/tool")]);
        fixture.store.save(&original).expect("save");

        let loaded = fixture.store.load("tool").expect("load");
        assert_eq!(loaded, Some(original));
        assert!(fixture.root.join("receipts/tool.json").is_file());
    }

    #[rstest]
    fn missing_receipt_is_none(fixture: Fixture) {
        assert_eq!(fixture.store.load("absent").expect("load"), None);
    }

    #[rstest]
    fn corrupt_receipt_is_reported(fixture: Fixture) {
        std::fs::create_dir_all(fixture.root.join("receipts")).expect("mkdir");
        std::fs::write(fixture.store.path_for("tool"), "{not json").expect("write");

        let err = fixture.store.load("tool").expect_err("corrupt");
        assert!(matches!(err, ReceiptError::Corrupt { .. }));
    }

    #[rstest]
    fn listing_is_sorted_and_skips_corrupt(fixture: Fixture) {
        fixture.store.save(&receipt("zeta", vec![])).expect("save");
        fixture.store.save(&receipt("alpha", vec![])).expect("save");
        std::fs::write(fixture.store.path_for("broken"), "[]").expect("write");
        std::fs::write(fixture.root.join("receipts/notes.txt"), "ignored").expect("write");

        let listing = fixture.store.list().expect("list");
        let names: Vec<_> = listing.receipts.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert_eq!(listing.corrupt, vec![fixture.store.path_for("broken")]);
    }

    #[rstest]
    fn empty_store_lists_nothing(fixture: Fixture) {
        let listing = fixture.store.list().expect("list");
        assert!(listing.receipts.is_empty());
        assert!(listing.corrupt.is_empty());
    }

    #[rstest]
    fn remove_is_idempotent(fixture: Fixture) {
        fixture.store.save(&receipt("tool", vec![])).expect("save");
        fixture.store.remove("tool").expect("remove");
        fixture.store.remove("tool").expect("remove again");
        assert_eq!(fixture.store.load("tool").expect("load"), None);
    }

    #[rstest]
    fn currency_requires_matching_digest_and_present_files(fixture: Fixture) {
        let installed = fixture.root.join("tool");
        std::fs::write(&installed, b"x").expect("write");
        let spec = RecipeBuilder::new("tool").build_spec();

        let mut current = Receipt::for_spec(&spec, vec![installed.clone()]);
        assert!(current.is_current_for(&spec));

        current.digest = "f".repeat(64);
        assert!(!current.is_current_for(&spec));

        let stale = Receipt::for_spec(&spec, vec![fixture.root.join("gone")]);
        assert!(!stale.is_current_for(&spec));
    }
}
