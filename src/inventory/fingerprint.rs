//! Content fingerprints and object locations.
//!
//! A fingerprint is the pair (service digest, byte size). The digest is taken
//! as reported by the storage service with surrounding quote characters
//! removed; no content is read or rehashed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Where an object lives: bucket name plus key.
///
/// Serialized as a two-element array `[bucket, key]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl From<(String, String)> for ObjectLocation {
    fn from((bucket, key): (String, String)) -> Self {
        Self { bucket, key }
    }
}

impl From<ObjectLocation> for (String, String) {
    fn from(location: ObjectLocation) -> Self {
        (location.bucket, location.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Error parsing a `"<digest>,<size>"` register key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintParseError {
    /// No `,` separating digest and size.
    #[error("fingerprint '{0}' is not of the form <digest>,<size>")]
    MissingSeparator(String),

    /// The size part is not a non-negative integer.
    #[error("fingerprint '{0}' has an invalid size")]
    InvalidSize(String),

    /// The size is numeric but not written canonically (leading zeros,
    /// whitespace or a sign), so the key would alias another fingerprint.
    #[error("fingerprint '{0}' is not canonical; expected '{1}'")]
    NonCanonical(String, String),
}

/// Presumed-duplicate identity of an object's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentFingerprint {
    /// Normalized service digest
    pub digest: String,
    /// Byte size
    pub size: u64,
}

impl ContentFingerprint {
    /// Build a fingerprint from a raw service digest and size.
    ///
    /// The digest is normalized with [`normalize_digest`].
    ///
    /// ```
    /// use s3dedupe::inventory::ContentFingerprint;
    ///
    /// let fp = ContentFingerprint::new("\"9a0364b9e99bb480dd25e1f0284c8555\"", 7);
    /// assert_eq!(fp.to_string(), "9a0364b9e99bb480dd25e1f0284c8555,7");
    /// ```
    #[must_use]
    pub fn new(raw_digest: &str, size: u64) -> Self {
        Self {
            digest: normalize_digest(raw_digest).to_string(),
            size,
        }
    }

    /// Whether the digest looks like an S3 multipart ETag (`<hex>-<parts>`).
    ///
    /// Such digests are not a hash of the object's bytes, so equal content
    /// uploaded with different part sizes will not match.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.digest
            .rsplit_once('-')
            .is_some_and(|(_, parts)| !parts.is_empty() && parts.bytes().all(|b| b.is_ascii_digit()))
    }
}

/// Strip surrounding double quotes from a service digest.
///
/// S3 reports ETags as `"abc..."`; every leading and trailing `"` is removed.
#[must_use]
pub fn normalize_digest(raw: &str) -> &str {
    raw.trim_matches('"')
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.digest, self.size)
    }
}

impl FromStr for ContentFingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Split on the last comma: the size never contains one.
        let (digest, raw_size) = s
            .rsplit_once(',')
            .ok_or_else(|| FingerprintParseError::MissingSeparator(s.to_string()))?;
        let size = raw_size
            .trim()
            .parse::<u64>()
            .map_err(|_| FingerprintParseError::InvalidSize(s.to_string()))?;
        let fingerprint = Self {
            digest: digest.to_string(),
            size,
        };

        let canonical = fingerprint.to_string();
        if canonical != s {
            return Err(FingerprintParseError::NonCanonical(s.to_string(), canonical));
        }
        Ok(fingerprint)
    }
}

impl Serialize for ContentFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
