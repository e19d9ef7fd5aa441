//! Metalink documents: alternative download URLs with expected digests.

use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use tundra_digest::verify_file_checksum;
use tundra_types::{Checksum, ChecksumKind};

use crate::RepodataError;

/// One download resource from a metalink document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetalinkUrl {
    /// The resource URL.
    pub url: String,
    /// Protocol attribute as published (`https`, `rsync`, ...).
    pub protocol: String,
    /// Type attribute as published.
    pub kind: String,
    /// Two-letter location code.
    pub location: String,
    /// Mirror preference, 0..=100, higher is better.
    pub preference: u8,
}

/// A parsed metalink file, scoped to the target file it describes
/// (for repositories this is `repomd.xml`).
#[derive(Debug, Clone, PartialEq)]
pub struct Metalink {
    /// Target file name.
    pub filename: String,
    /// Expected size of the target file.
    pub size: Option<u64>,
    /// Published digests, any subset of the supported kinds.
    pub hashes: Vec<Checksum>,
    /// Download resources, sorted by descending preference.
    pub urls: Vec<MetalinkUrl>,
}

impl Metalink {
    /// Parse a metalink document.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RepodataError> {
        let raw: RawMetalink = quick_xml::de::from_reader(reader)?;
        let file = raw
            .files
            .files
            .into_iter()
            .next()
            .ok_or(RepodataError::NoMetalinkResources)?;

        let mut hashes = Vec::new();
        if let Some(verification) = file.verification {
            for hash in verification.hashes {
                // Digest types we do not know (e.g. sha3) are skipped, not
                // fatal; the strongest supported one is used later.
                match ChecksumKind::from_str(&hash.kind) {
                    Ok(kind) => hashes.push(Checksum::new(kind, hash.value)),
                    Err(_) => debug!("ignoring unsupported metalink hash type {}", hash.kind),
                }
            }
        }

        let mut urls: Vec<MetalinkUrl> = file
            .resources
            .map(|r| {
                r.urls
                    .into_iter()
                    .map(|u| MetalinkUrl {
                        url: u.value,
                        protocol: u.protocol.unwrap_or_default(),
                        kind: u.kind.unwrap_or_default(),
                        location: u.location.unwrap_or_default(),
                        preference: u.preference.unwrap_or(0).min(100),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if urls.is_empty() {
            return Err(RepodataError::NoMetalinkResources);
        }
        // Stable sort keeps the published order within a preference tier.
        urls.sort_by(|a, b| b.preference.cmp(&a.preference));

        Ok(Metalink {
            filename: file.name,
            size: file.size,
            hashes,
            urls,
        })
    }

    /// Parse from a string.
    pub fn from_xml(xml: &str) -> Result<Self, RepodataError> {
        Self::from_reader(xml.as_bytes())
    }

    /// The strongest digest the metalink publishes, if any.
    pub fn strongest_hash(&self) -> Option<&Checksum> {
        self.hashes.iter().max_by_key(|c| c.kind)
    }

    /// Base URLs usable for repo content: each resource URL with the
    /// target file name (and its `repodata/` parent) stripped.
    pub fn base_urls(&self) -> Vec<String> {
        self.urls
            .iter()
            .filter(|u| {
                u.protocol.is_empty() || u.protocol == "http" || u.protocol == "https"
            })
            .filter_map(|u| {
                u.url
                    .rfind("/repodata/")
                    .map(|idx| u.url[..idx].to_string())
            })
            .collect()
    }

    /// Check a downloaded file against the strongest published digest and
    /// the expected size. A metalink without any supported digest fails
    /// closed.
    pub fn verify_file(&self, path: &Path) -> Result<(), RepodataError> {
        if let Some(size) = self.size {
            let actual = fs_err::metadata(path)?.len();
            if actual != size {
                return Err(RepodataError::MetalinkDigestMismatch);
            }
        }
        let strongest = self
            .strongest_hash()
            .ok_or(RepodataError::MetalinkDigestMismatch)?;
        if !verify_file_checksum(strongest, path)? {
            return Err(RepodataError::MetalinkDigestMismatch);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawMetalink {
    files: RawFiles,
}

#[derive(Debug, Deserialize)]
struct RawFiles {
    #[serde(default, rename = "file")]
    files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(rename = "@name")]
    name: String,
    size: Option<u64>,
    verification: Option<RawVerification>,
    resources: Option<RawResources>,
}

#[derive(Debug, Deserialize)]
struct RawVerification {
    #[serde(default, rename = "hash")]
    hashes: Vec<RawHash>,
}

#[derive(Debug, Deserialize)]
struct RawHash {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawResources {
    #[serde(default, rename = "url")]
    urls: Vec<RawUrl>,
}

#[derive(Debug, Deserialize)]
struct RawUrl {
    #[serde(rename = "@protocol")]
    protocol: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "@location")]
    location: Option<String>,
    #[serde(rename = "@preference")]
    preference: Option<u8>,
    #[serde(rename = "$text")]
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tundra_digest::hex_file_digest;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<metalink version="3.0" xmlns="http://www.metalinker.org/">
  <files>
    <file name="repomd.xml">
      <size>3116</size>
      <verification>
        <hash type="md5">0123456789abcdef0123456789abcdef</hash>
        <hash type="sha256">aeb080b8fdf9dcb1a9f195a71a1a57a9a09b11e2c97c3f9dae1dcbcb2b3e9c5c</hash>
        <hash type="sha512">ignored-but-strongest</hash>
      </verification>
      <resources maxconnections="1">
        <url protocol="https" type="https" location="DE" preference="90">https://mirror.de/repo/repodata/repomd.xml</url>
        <url protocol="https" type="https" location="US" preference="100">https://mirror.us/repo/repodata/repomd.xml</url>
        <url protocol="rsync" type="rsync" location="US" preference="95">rsync://mirror.us/repo/repodata/repomd.xml</url>
      </resources>
    </file>
  </files>
</metalink>"#;

    #[test]
    fn parse_and_order() {
        let ml = Metalink::from_xml(SAMPLE).unwrap();
        assert_eq!(ml.filename, "repomd.xml");
        assert_eq!(ml.size, Some(3116));
        assert_eq!(ml.urls[0].preference, 100);
        assert_eq!(ml.urls[0].location, "US");
        assert_eq!(ml.urls[2].preference, 90);
        assert_eq!(ml.strongest_hash().unwrap().kind, ChecksumKind::Sha512);
        // rsync resources are not usable as http base urls
        assert_eq!(
            ml.base_urls(),
            vec![
                "https://mirror.us/repo".to_string(),
                "https://mirror.de/repo".to_string()
            ]
        );
    }

    #[test]
    fn no_resources_is_an_error() {
        let xml = r#"<metalink><files><file name="repomd.xml"></file></files></metalink>"#;
        assert_matches!(
            Metalink::from_xml(xml),
            Err(RepodataError::NoMetalinkResources)
        );
    }

    #[test]
    fn verify_against_strongest_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repomd.xml");
        std::fs::write(&path, "<repomd/>").unwrap();

        let sha256 = hex_file_digest(ChecksumKind::Sha256, &path).unwrap();
        let ml = Metalink {
            filename: "repomd.xml".into(),
            size: Some(9),
            hashes: vec![
                Checksum::new(ChecksumKind::Md5, "00".repeat(16)),
                Checksum::new(ChecksumKind::Sha256, sha256),
            ],
            urls: vec![MetalinkUrl {
                url: "https://mirror/repo/repodata/repomd.xml".into(),
                protocol: "https".into(),
                kind: "https".into(),
                location: "US".into(),
                preference: 100,
            }],
        };
        ml.verify_file(&path).unwrap();

        let mut wrong = ml.clone();
        wrong.hashes[1].hex = "ab".repeat(32);
        assert_matches!(
            wrong.verify_file(&path),
            Err(RepodataError::MetalinkDigestMismatch)
        );

        let mut wrong_size = ml.clone();
        wrong_size.size = Some(1);
        assert_matches!(
            wrong_size.verify_file(&path),
            Err(RepodataError::MetalinkDigestMismatch)
        );
    }
}
