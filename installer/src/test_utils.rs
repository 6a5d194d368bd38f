//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behavioural suites under `tests/`.

use crate::artefact::download::{ArtefactFetcher, DownloadError};
use crate::dirs::BaseDirs;
use crate::recipe::PackageSpec;
use sha2::{Digest, Sha256};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// Archive builders
// ---------------------------------------------------------------------------

/// One regular file or symlink to put in a test tarball.
#[derive(Debug, Clone)]
pub struct TarEntry {
    /// Path inside the archive.
    pub path: String,
    /// File contents.
    pub contents: Vec<u8>,
    /// Unix mode bits.
    pub mode: u32,
    /// Symlink target; `None` for regular files.
    pub link: Option<String>,
}

impl TarEntry {
    /// A plain `0o644` file.
    pub fn file(path: &str, contents: &[u8]) -> Self {
        Self {
            path: path.to_owned(),
            contents: contents.to_vec(),
            mode: 0o644,
            link: None,
        }
    }

    /// An executable `0o755` file.
    pub fn executable(path: &str, contents: &[u8]) -> Self {
        Self {
            mode: 0o755,
            ..Self::file(path, contents)
        }
    }

    /// A symlink at `path` pointing at `target`, stored verbatim.
    pub fn symlink(path: &str, target: &str) -> Self {
        Self {
            mode: 0o777,
            link: Some(target.to_owned()),
            ..Self::file(path, b"")
        }
    }
}

/// Build a gzip-compressed tarball in memory.
pub fn tar_gz_bytes(entries: &[TarEntry]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.contents.len() as u64);
        header.set_mode(entry.mode);
        if let Some(target) = &entry.link {
            header.set_entry_type(tar::EntryType::Symlink);
            builder
                .append_link(&mut header, &entry.path, target)
                .expect("append tar link");
            continue;
        }
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, &entry.path, entry.contents.as_slice())
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Build a gzip tarball with a single entry whose name is written into the
/// header verbatim, bypassing the `tar` crate's own path checks. Used to
/// produce hostile `../` entries.
pub fn tar_gz_with_raw_entry(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_old();
    let name_field = &mut header.as_old_mut().name;
    assert!(name.len() < name_field.len(), "entry name too long");
    name_field[..name.len()].copy_from_slice(name.as_bytes());
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append(&header, contents).expect("append raw entry");
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Build a zip archive in memory from `(name, contents, unix mode)` triples.
pub fn zip_bytes(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents, mode) in entries {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(contents).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Write an executable shell script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
    path
}

// ---------------------------------------------------------------------------
// Local HTTP servers
// ---------------------------------------------------------------------------

fn read_request(stream: &mut std::net::TcpStream) {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(read) => request.extend_from_slice(&buffer[..read]),
        }
    }
}

/// Serve a single HTTP response on a loopback port and return its URL.
pub fn serve_once(status: &str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let status = status.to_owned();
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        read_request(&mut stream);
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let response = [head.as_bytes(), body.as_slice()].concat();
        if stream.write_all(&response).is_err() {
            // The client gave up; nothing to report.
        }
    });
    format!("http://{addr}/artefact")
}

/// Accept one connection and hold it open without responding.
pub fn serve_stalled(hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            read_request(&mut stream);
            std::thread::sleep(hold);
        }
    });
    format!("http://{addr}/artefact")
}

// ---------------------------------------------------------------------------
// Collaborator stubs
// ---------------------------------------------------------------------------

/// [`ArtefactFetcher`] that serves canned responses without the network.
///
/// Queued responses are returned in order; once the queue is empty every
/// call serves the fallback body, or fails as not found when there is none.
#[derive(Debug, Default)]
pub struct StubFetcher {
    queue: RefCell<VecDeque<Result<Vec<u8>, DownloadError>>>,
    fallback: Option<Vec<u8>>,
    calls: Cell<usize>,
}

impl StubFetcher {
    /// Serve `body` on every call.
    pub fn serving(body: &[u8]) -> Self {
        Self {
            fallback: Some(body.to_vec()),
            ..Self::default()
        }
    }

    /// Return `responses` in order, then fail as not found.
    pub fn sequence(responses: Vec<Result<Vec<u8>, DownloadError>>) -> Self {
        Self {
            queue: RefCell::new(responses.into()),
            ..Self::default()
        }
    }

    /// Number of fetches made so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ArtefactFetcher for StubFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.calls.set(self.calls.get() + 1);
        let body = match self.queue.borrow_mut().pop_front() {
            Some(response) => response?,
            None => self.fallback.clone().ok_or_else(|| DownloadError::NotFound {
                url: url.to_owned(),
            })?,
        };
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

/// [`BaseDirs`] rooted in a single directory, for tests outside this crate
/// where the `mockall` mocks are unavailable.
#[derive(Debug, Clone)]
pub struct FixedBaseDirs {
    root: PathBuf,
}

impl FixedBaseDirs {
    /// Place `home`, `bin`, `data` and `config` under `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl BaseDirs for FixedBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("home"))
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("bin"))
    }

    fn data_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("data"))
    }

    fn config_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("config"))
    }
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// Builder for recipe TOML used in tests.
///
/// Defaults to version `1.0.0` on `linux-x64`, a `.tar.gz` URL and a single
/// executable install entry named after the package.
#[derive(Debug, Clone)]
pub struct RecipeBuilder {
    name: String,
    version: String,
    url: String,
    sha256: String,
    platform: String,
    format: Option<String>,
    install: Vec<(String, String, bool)>,
    test_args: Option<Vec<String>>,
    test_timeout_secs: Option<u64>,
    test_executable: Option<String>,
    depends_on: Vec<String>,
}

impl RecipeBuilder {
    /// Start a recipe for `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: "1.0.0".to_owned(),
            url: "https://example.test/{name}-{version}.tar.gz".to_owned(),
            sha256: "ab".repeat(32),
            platform: "linux-x64".to_owned(),
            format: None,
            install: vec![(name.to_owned(), name.to_owned(), true)],
            test_args: None,
            test_timeout_secs: None,
            test_executable: None,
            depends_on: Vec::new(),
        }
    }

    /// Set the version.
    #[must_use]
    pub fn version(mut self, version: &str) -> Self {
        version.clone_into(&mut self.version);
        self
    }

    /// Set the URL template.
    #[must_use]
    pub fn url(mut self, url: &str) -> Self {
        url.clone_into(&mut self.url);
        self
    }

    /// Set the expected digest.
    #[must_use]
    pub fn sha256(mut self, digest: &str) -> Self {
        digest.clone_into(&mut self.sha256);
        self
    }

    /// Declare the archive format explicitly.
    #[must_use]
    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.to_owned());
        self
    }

    /// Replace the install mapping with a single entry.
    #[must_use]
    pub fn install(mut self, source: &str, target: &str, executable: bool) -> Self {
        self.install = vec![(source.to_owned(), target.to_owned(), executable)];
        self
    }

    /// Append an install entry.
    #[must_use]
    pub fn also_install(mut self, source: &str, target: &str, executable: bool) -> Self {
        self.install
            .push((source.to_owned(), target.to_owned(), executable));
        self
    }

    /// Set the smoke-test arguments.
    #[must_use]
    pub fn test_args(mut self, args: &[&str]) -> Self {
        self.test_args = Some(args.iter().map(|arg| (*arg).to_owned()).collect());
        self
    }

    /// Set the smoke-test timeout.
    #[must_use]
    pub fn test_timeout_secs(mut self, secs: u64) -> Self {
        self.test_timeout_secs = Some(secs);
        self
    }

    /// Name the install target the smoke test runs.
    #[must_use]
    pub fn test_executable(mut self, executable: &str) -> Self {
        self.test_executable = Some(executable.to_owned());
        self
    }

    /// Declare runtime dependencies.
    #[must_use]
    pub fn depends_on(mut self, names: &[&str]) -> Self {
        self.depends_on = names.iter().map(|name| (*name).to_owned()).collect();
        self
    }

    /// Render the recipe as TOML.
    pub fn to_toml(&self) -> String {
        let mut package = toml::Table::new();
        package.insert("name".to_owned(), self.name.clone().into());
        package.insert("version".to_owned(), self.version.clone().into());
        package.insert("url".to_owned(), self.url.clone().into());
        package.insert("sha256".to_owned(), self.sha256.clone().into());
        package.insert("platform".to_owned(), self.platform.clone().into());
        if let Some(format) = &self.format {
            package.insert("format".to_owned(), format.clone().into());
        }
        if !self.depends_on.is_empty() {
            package.insert("depends_on".to_owned(), self.depends_on.clone().into());
        }

        let install = self
            .install
            .iter()
            .map(|(source, target, executable)| {
                let mut entry = toml::Table::new();
                entry.insert("source".to_owned(), source.clone().into());
                entry.insert("target".to_owned(), target.clone().into());
                entry.insert("executable".to_owned(), (*executable).into());
                toml::Value::Table(entry)
            })
            .collect::<Vec<_>>();

        let mut test = toml::Table::new();
        if let Some(args) = &self.test_args {
            test.insert("args".to_owned(), args.clone().into());
        }
        if let Some(secs) = self.test_timeout_secs {
            let secs = i64::try_from(secs).expect("timeout fits i64");
            test.insert("timeout_secs".to_owned(), secs.into());
        }
        if let Some(executable) = &self.test_executable {
            test.insert("executable".to_owned(), executable.clone().into());
        }

        let mut recipe = toml::Table::new();
        recipe.insert("package".to_owned(), toml::Value::Table(package));
        recipe.insert("install".to_owned(), toml::Value::Array(install));
        if !test.is_empty() {
            recipe.insert("test".to_owned(), toml::Value::Table(test));
        }
        toml::to_string(&recipe).expect("serialise recipe")
    }

    /// Parse the recipe into a [`PackageSpec`].
    pub fn build_spec(&self) -> PackageSpec {
        PackageSpec::parse(&self.to_toml(), "test recipe", None).expect("valid test recipe")
    }

    /// Write the recipe to `<dir>/<name>.toml` and return its path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        std::fs::create_dir_all(dir).expect("create recipe dir");
        let path = dir.join(format!("{}.toml", self.name));
        std::fs::write(&path, self.to_toml()).expect("write recipe");
        path
    }
}
