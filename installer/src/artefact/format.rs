//! Archive format selection.
//!
//! Recipes may name the format explicitly; otherwise it is inferred from the
//! suffix of the download URL.

use super::error::{ArtefactError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const FORMAT_NAMES: &str = "tar.gz, tgz, tar.zst, zip, raw";

/// The container format of a downloaded artefact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball.
    TarGz,
    /// Zstandard-compressed tarball.
    TarZst,
    /// Zip archive.
    Zip,
    /// The artefact is the file itself, with no container.
    Raw,
}

impl ArchiveFormat {
    /// Parse a format name as written in a recipe.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedFormat`] for unknown names.
    ///
    /// # Examples
    ///
    /// ```
    /// use parcel_installer::artefact::format::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::from_name("tgz").unwrap(), ArchiveFormat::TarGz);
    /// ```
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "tar.zst" | "tzst" => Ok(Self::TarZst),
            "zip" => Ok(Self::Zip),
            "raw" => Ok(Self::Raw),
            _ => Err(ArtefactError::UnsupportedFormat {
                value: name.to_owned(),
                expected: FORMAT_NAMES.to_owned(),
            }),
        }
    }

    /// Infer the format from the final path segment of a URL.
    ///
    /// Query strings and fragments are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedFormat`] when no known suffix
    /// matches.
    pub fn infer_from_url(url: &str) -> Result<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();

        let suffixes: [(&str, Self); 5] = [
            (".tar.gz", Self::TarGz),
            (".tgz", Self::TarGz),
            (".tar.zst", Self::TarZst),
            (".tzst", Self::TarZst),
            (".zip", Self::Zip),
        ];
        suffixes
            .iter()
            .find(|(suffix, _)| file_name.ends_with(suffix))
            .map(|(_, format)| *format)
            .ok_or_else(|| ArtefactError::UnsupportedFormat {
                value: file_name.clone(),
                expected: FORMAT_NAMES.to_owned(),
            })
    }

    /// Return the canonical name of the format.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::TarZst => "tar.zst",
            Self::Zip => "zip",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ArchiveFormat {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ArchiveFormat {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_name(&raw).map_err(serde::de::Error::custom)
    }
}
