//! SHA-256 digest newtype for artefact verification.
//!
//! Validates that the value is a 64-character hexadecimal string. Recipes
//! copied from release pages sometimes carry uppercase digests, so input is
//! normalised to lowercase rather than rejected.

use super::error::{ArtefactError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A validated, lowercase, hex-encoded SHA-256 digest string.
///
/// # Examples
///
/// ```
/// use parcel_installer::artefact::sha256_digest::Sha256Digest;
///
/// let hex = "AB".repeat(32);
/// let digest = Sha256Digest::try_from(hex.as_str()).expect("valid digest");
/// assert_eq!(digest.as_str(), "ab".repeat(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the digest as raw bytes of its hex representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = ArtefactError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        validate_sha256(trimmed)?;
        Ok(Self(trimmed.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = ArtefactError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_sha256(value: &str) -> Result<()> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(ArtefactError::InvalidSha256Digest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ArtefactError::InvalidSha256Digest {
            reason: format!("non-hex character '{bad}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn accepts_valid_sixty_four_char_hex() {
        let digest = Sha256Digest::try_from("a".repeat(64).as_str());
        assert!(digest.is_ok());
    }

    #[rstest]
    #[case::too_short("abcdef")]
    #[case::too_long("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")]
    #[case::non_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaag")]
    #[case::placeholder("<SHA256_CHECKSUM>")]
    fn rejects_malformed_digests(#[case] input: &str) {
        let result = Sha256Digest::try_from(input);
        assert!(
            matches!(result, Err(ArtefactError::InvalidSha256Digest { .. })),
            "expected rejection for {input:?}"
        );
    }

    #[test]
    fn uppercase_is_normalised() {
        let digest = Sha256Digest::try_from("F".repeat(64)).expect("valid digest");
        assert_eq!(digest.as_str(), "f".repeat(64));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let padded = format!("  {}\n", "0".repeat(64));
        let digest = Sha256Digest::try_from(padded.as_str()).expect("valid digest");
        assert_eq!(digest.as_str().len(), 64);
    }

    #[test]
    fn deserialises_through_validation() {
        #[derive(Deserialize)]
        struct Holder {
            sha256: Sha256Digest,
        }

        let err = toml::from_str::<Holder>("sha256 = \"nope\"").err();
        assert!(err.is_some(), "invalid digest should not deserialise");

        let ok: Holder = toml::from_str(&format!("sha256 = \"{}\"", "b".repeat(64)))
            .expect("valid digest deserialises");
        assert_eq!(ok.sha256.as_str(), "b".repeat(64));
    }
}
