//! Checksum kinds and values as they appear in repo metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A digest algorithm named by repo metadata or a metalink document.
///
/// The variants are ordered by strength so that `Ord` picks the strongest
/// available hash when several are offered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    /// MD5, accepted only because legacy repositories still publish it.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

/// Error returned for digest type strings tundra does not support.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported checksum type {0:?}")]
pub struct ParseChecksumKindError(pub String);

impl ChecksumKind {
    /// The expected hex-digest length for this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            ChecksumKind::Md5 => 32,
            ChecksumKind::Sha1 => 40,
            ChecksumKind::Sha256 => 64,
            ChecksumKind::Sha384 => 96,
            ChecksumKind::Sha512 => 128,
        }
    }

    /// The canonical lowercase name used in repomd/metalink documents.
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha384 => "sha384",
            ChecksumKind::Sha512 => "sha512",
        }
    }
}

impl FromStr for ChecksumKind {
    type Err = ParseChecksumKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // createrepo emits "sha" for historical sha1 digests.
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumKind::Md5),
            "sha" | "sha1" | "sha-1" => Ok(ChecksumKind::Sha1),
            "sha256" | "sha-256" => Ok(ChecksumKind::Sha256),
            "sha384" | "sha-384" => Ok(ChecksumKind::Sha384),
            "sha512" | "sha-512" => Ok(ChecksumKind::Sha512),
            _ => Err(ParseChecksumKindError(s.to_string())),
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest algorithm paired with its lowercase hex value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    /// Digest algorithm.
    pub kind: ChecksumKind,
    /// Lowercase hex digest.
    pub hex: String,
}

impl Checksum {
    /// Construct a checksum, normalizing the hex value to lowercase.
    pub fn new(kind: ChecksumKind, hex: impl Into<String>) -> Self {
        let mut hex = hex.into();
        hex.make_ascii_lowercase();
        Self { kind, hex }
    }

    /// Whether the hex value has the length the algorithm demands and only
    /// hex characters.
    pub fn is_well_formed(&self) -> bool {
        self.hex.len() == self.kind.hex_len()
            && self.hex.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_ordering() {
        assert!(ChecksumKind::Sha512 > ChecksumKind::Sha384);
        assert!(ChecksumKind::Sha384 > ChecksumKind::Sha256);
        assert!(ChecksumKind::Sha256 > ChecksumKind::Sha1);
        assert!(ChecksumKind::Sha1 > ChecksumKind::Md5);
    }

    #[test]
    fn parse_aliases() {
        assert_eq!("sha".parse::<ChecksumKind>().unwrap(), ChecksumKind::Sha1);
        assert_eq!(
            "SHA-256".parse::<ChecksumKind>().unwrap(),
            ChecksumKind::Sha256
        );
        assert!("crc32".parse::<ChecksumKind>().is_err());
    }

    #[test]
    fn well_formed() {
        let ok = Checksum::new(ChecksumKind::Sha256, "AB".repeat(32));
        assert!(ok.is_well_formed());
        assert_eq!(ok.hex, "ab".repeat(32));
        let short = Checksum::new(ChecksumKind::Sha256, "abcd");
        assert!(!short.is_well_formed());
    }
}
