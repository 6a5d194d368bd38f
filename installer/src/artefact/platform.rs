//! Platform identifiers for distribution downloads.
//!
//! Recipes name the platform they target with a short identifier such as
//! `linux-x64`. Only the identifiers listed in [`SUPPORTED_PLATFORMS`] are
//! accepted; anything else is rejected at construction time.

use super::error::{ArtefactError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// The supported platform identifiers.
pub const SUPPORTED_PLATFORMS: &[&str] = &[
    "linux-x64",
    "linux-arm64",
    "macos-x64",
    "macos-arm64",
    "windows-x64",
];

/// A validated platform identifier.
///
/// # Examples
///
/// ```
/// use parcel_installer::artefact::platform::Platform;
///
/// let platform = Platform::try_from("macos-arm64").expect("supported");
/// assert!(platform.is_macos());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    /// Detect the platform of the running host.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedPlatform`] when the host
    /// OS/architecture pair has no distribution identifier.
    pub fn host() -> Result<Self> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map an OS/architecture pair (as reported by [`std::env::consts`]) to
    /// a platform identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedPlatform`] for unknown pairs.
    pub fn from_os_arch(os: &str, arch: &str) -> Result<Self> {
        let os_part = match os {
            "linux" => "linux",
            "macos" => "macos",
            "windows" => "windows",
            other => other,
        };
        let arch_part = match arch {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            other => other,
        };
        Self::try_from(format!("{os_part}-{arch_part}"))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the full list of supported identifiers.
    #[must_use]
    pub fn supported() -> &'static [&'static str] {
        SUPPORTED_PLATFORMS
    }

    /// Return true for Windows platforms.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.0.starts_with("windows-")
    }

    /// Return true for macOS platforms.
    #[must_use]
    pub fn is_macos(&self) -> bool {
        self.0.starts_with("macos-")
    }

    /// Return the executable file suffix for this platform.
    #[must_use]
    pub fn executable_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }
}

impl TryFrom<&str> for Platform {
    type Error = ArtefactError;

    fn try_from(value: &str) -> Result<Self> {
        if SUPPORTED_PLATFORMS.contains(&value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(ArtefactError::UnsupportedPlatform {
                value: value.to_owned(),
                expected: SUPPORTED_PLATFORMS.join(", "),
            })
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = ArtefactError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for Platform {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
