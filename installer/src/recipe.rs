//! Recipe loading.
//!
//! A recipe is a TOML file naming one package: where to download it, the
//! digest it must hash to, which files to install and how to smoke-test the
//! result. Loading resolves the platform, expands `{name}`, `{version}` and
//! `{platform}` placeholders and validates every path, producing an
//! immutable [`PackageSpec`].

use crate::artefact::error::ArtefactError;
use crate::artefact::format::ArchiveFormat;
use crate::artefact::platform::Platform;
use crate::artefact::sha256_digest::Sha256Digest;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default smoke-test timeout.
pub const DEFAULT_SMOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors arising from loading a recipe.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    /// The recipe file could not be read.
    #[error("failed to read recipe {}: {source}", path.display())]
    Read {
        /// The recipe path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The recipe is not valid TOML or does not match the schema.
    #[error("invalid recipe {origin}: {source}")]
    Parse {
        /// Where the recipe came from.
        origin: String,
        /// The TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A field failed validation.
    #[error("invalid recipe field `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A template referenced an unknown placeholder.
    #[error("unknown placeholder {{{placeholder}}} in `{field}`; expected name, version or platform")]
    UnknownPlaceholder {
        /// The field containing the placeholder.
        field: &'static str,
        /// The placeholder name.
        placeholder: String,
    },

    /// A platform, digest or format value was invalid.
    #[error(transparent)]
    Value(#[from] ArtefactError),
}

type Result<T> = std::result::Result<T, RecipeError>;

/// One file to install: a path inside the unpacked artefact and where to
/// put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    /// Path relative to the extraction root.
    pub source: PathBuf,
    /// Destination; relative paths resolve against the binary directory.
    pub target: PathBuf,
    /// Whether the installed file receives executable permissions.
    pub executable: bool,
}

impl InstallEntry {
    /// Resolve the destination against `bin_dir`.
    #[must_use]
    pub fn resolve_target(&self, bin_dir: &Path) -> PathBuf {
        if self.target.is_absolute() {
            self.target.clone()
        } else {
            bin_dir.join(&self.target)
        }
    }
}

/// How to smoke-test an installed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeSpec {
    /// Install target of the executable to run.
    pub executable: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Wall-clock limit for the run.
    pub timeout: Duration,
}

/// A fully resolved package recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Package name; also names receipts and lock files.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Download URL with placeholders expanded.
    pub source_url: String,
    /// Digest the downloaded artefact must hash to.
    pub expected_digest: Sha256Digest,
    /// Platform the artefact targets.
    pub platform: Platform,
    /// Container format of the artefact.
    pub format: ArchiveFormat,
    /// Files to install, in order.
    pub install: Vec<InstallEntry>,
    /// Smoke-test definition.
    pub smoke: SmokeSpec,
    /// Runtime dependencies expected on `PATH`.
    pub depends_on: Vec<String>,
}

impl PackageSpec {
    /// Load a recipe from a file.
    ///
    /// `platform` overrides the recipe's platform, which in turn overrides
    /// the host platform.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError`] if the file cannot be read, parsed or
    /// validated.
    pub fn from_path(path: &Path, platform: Option<&Platform>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string(), platform)
    }

    /// Parse a recipe from TOML text. `origin` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError`] if the text cannot be parsed or validated.
    ///
    /// # Examples
    ///
    /// ```
    /// use parcel_installer::recipe::PackageSpec;
    ///
    /// let recipe = format!(
    ///     r#"
    ///     [package]
    ///     name = "tool"
    ///     version = "1.2.0"
    ///     url = "https://dist.example.org/tool-{{version}}-{{platform}}.tar.gz"
    ///     sha256 = "{}"
    ///     platform = "linux-x64"
    ///
    ///     [[install]]
    ///     source = "tool-{{version}}/bin/tool"
    ///     target = "tool"
    ///     "#,
    ///     "0".repeat(64)
    /// );
    /// let spec = PackageSpec::parse(&recipe, "inline", None).unwrap();
    /// assert_eq!(
    ///     spec.source_url,
    ///     "https://dist.example.org/tool-1.2.0-linux-x64.tar.gz"
    /// );
    /// ```
    pub fn parse(text: &str, origin: &str, platform: Option<&Platform>) -> Result<Self> {
        let file: RecipeFile = toml::from_str(text).map_err(|source| RecipeError::Parse {
            origin: origin.to_owned(),
            source,
        })?;
        file.resolve(platform)
    }

    /// Return the path of the executable the smoke test runs.
    #[must_use]
    pub fn smoke_executable(&self, bin_dir: &Path) -> PathBuf {
        if self.smoke.executable.is_absolute() {
            self.smoke.executable.clone()
        } else {
            bin_dir.join(&self.smoke.executable)
        }
    }

    /// Return the install destinations resolved against `bin_dir`.
    #[must_use]
    pub fn resolved_targets(&self, bin_dir: &Path) -> Vec<PathBuf> {
        self.install
            .iter()
            .map(|entry| entry.resolve_target(bin_dir))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecipeFile {
    package: PackageSection,
    #[serde(default)]
    install: Vec<InstallSection>,
    #[serde(default)]
    test: TestSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageSection {
    name: String,
    version: String,
    url: String,
    sha256: Sha256Digest,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default)]
    format: Option<ArchiveFormat>,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallSection {
    source: String,
    target: String,
    #[serde(default = "default_executable")]
    executable: bool,
}

fn default_executable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TestSection {
    args: Vec<String>,
    timeout_secs: u64,
    executable: Option<String>,
}

impl Default for TestSection {
    fn default() -> Self {
        Self {
            args: vec!["--version".to_owned()],
            timeout_secs: DEFAULT_SMOKE_TIMEOUT.as_secs(),
            executable: None,
        }
    }
}

/// Values substituted into templated fields.
struct Vars<'a> {
    name: &'a str,
    version: &'a str,
    platform: &'a str,
}

impl RecipeFile {
    fn resolve(self, platform_override: Option<&Platform>) -> Result<PackageSpec> {
        let Self {
            package,
            install,
            test,
        } = self;

        validate_name(&package.name)?;
        if package.version.trim().is_empty() {
            return Err(invalid("package.version", "must not be empty"));
        }
        let platform = match (platform_override, package.platform) {
            (Some(cli), _) => cli.clone(),
            (None, Some(recipe)) => recipe,
            (None, None) => Platform::host()?,
        };
        let vars = Vars {
            name: &package.name,
            version: &package.version,
            platform: platform.as_str(),
        };

        let source_url = expand("package.url", &package.url, &vars)?;
        validate_url(&source_url)?;
        let format = match package.format {
            Some(format) => format,
            None => ArchiveFormat::infer_from_url(&source_url)?,
        };

        let install = resolve_install(install, &vars)?;
        if format == ArchiveFormat::Raw {
            let first = install
                .first()
                .map(|entry| entry.source.components().count());
            if first != Some(1) {
                return Err(invalid(
                    "install.source",
                    "raw artefacts install a single file; the first source must be a bare file name",
                ));
            }
        }

        let smoke = resolve_smoke(test, &install, &vars)?;

        Ok(PackageSpec {
            name: package.name,
            version: package.version,
            source_url,
            expected_digest: package.sha256,
            platform,
            format,
            install,
            smoke,
            depends_on: package.depends_on,
        })
    }
}

fn resolve_install(sections: Vec<InstallSection>, vars: &Vars<'_>) -> Result<Vec<InstallEntry>> {
    if sections.is_empty() {
        return Err(invalid("install", "at least one [[install]] entry is required"));
    }
    sections
        .into_iter()
        .map(|section| {
            let source = PathBuf::from(expand("install.source", &section.source, vars)?);
            if !is_contained(&source) {
                return Err(invalid(
                    "install.source",
                    format!(
                        "{} must be a relative path inside the artefact",
                        source.display()
                    ),
                ));
            }
            let target = PathBuf::from(expand("install.target", &section.target, vars)?);
            if !target.is_absolute() && !is_contained(&target) {
                return Err(invalid(
                    "install.target",
                    format!(
                        "{} must be absolute or stay inside the binary directory",
                        target.display()
                    ),
                ));
            }
            Ok(InstallEntry {
                source,
                target,
                executable: section.executable,
            })
        })
        .collect()
}

fn resolve_smoke(
    test: TestSection,
    install: &[InstallEntry],
    vars: &Vars<'_>,
) -> Result<SmokeSpec> {
    if test.timeout_secs == 0 {
        return Err(invalid("test.timeout_secs", "must be greater than zero"));
    }
    let executable = match test.executable {
        Some(name) => {
            let name = PathBuf::from(expand("test.executable", &name, vars)?);
            if !install.iter().any(|entry| entry.target == name) {
                return Err(invalid(
                    "test.executable",
                    format!("{} is not an install target", name.display()),
                ));
            }
            name
        }
        None => install
            .first()
            .map(|entry| entry.target.clone())
            .ok_or_else(|| invalid("install", "at least one [[install]] entry is required"))?,
    };
    Ok(SmokeSpec {
        executable,
        args: test.args,
        timeout: Duration::from_secs(test.timeout_secs),
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> RecipeError {
    RecipeError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Names become file names for receipts and locks.
pub(crate) fn validate_name(name: &str) -> std::result::Result<(), RecipeError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(invalid(
            "package.name",
            format!("{name:?} must be non-empty ASCII letters, digits, '-', '_' or '.'"),
        ))
    }
}

fn validate_url(url: &str) -> Result<()> {
    if ["https://", "http://", "file://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
    {
        Ok(())
    } else {
        Err(invalid(
            "package.url",
            format!("{url} must use https, http or file"),
        ))
    }
}

fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Expand `{name}`, `{version}` and `{platform}` in `template`.
fn expand(field: &'static str, template: &str, vars: &Vars<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(invalid(field, format!("unterminated placeholder in {template:?}")));
        };
        let value = match &after[..close] {
            "name" => vars.name,
            "version" => vars.version,
            "platform" => vars.platform,
            other => {
                return Err(RecipeError::UnknownPlaceholder {
                    field,
                    placeholder: other.to_owned(),
                });
            }
        };
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "recipe_tests.rs"]
mod tests;
