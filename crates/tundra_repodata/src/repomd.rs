//! The `repomd.xml` index.

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use serde::Deserialize;

use tundra_types::{Checksum, ChecksumKind};

use crate::RepodataError;

/// The metadata parts a repomd index can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    /// Package records with dependency information. Mandatory.
    Primary,
    /// Per-package file lists.
    Filelists,
    /// Advisory metadata.
    Updateinfo,
    /// Changelogs.
    Other,
}

impl PartKind {
    /// The `type=` attribute value in `repomd.xml`.
    pub fn as_str(self) -> &'static str {
        match self {
            PartKind::Primary => "primary",
            PartKind::Filelists => "filelists",
            PartKind::Updateinfo => "updateinfo",
            PartKind::Other => "other",
        }
    }

    /// All parts in fetch order.
    pub const ALL: [PartKind; 4] = [
        PartKind::Primary,
        PartKind::Filelists,
        PartKind::Updateinfo,
        PartKind::Other,
    ];
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `<data>` element: a referenced metadata part.
#[derive(Debug, Clone, PartialEq)]
pub struct RepomdPart {
    /// Part type, e.g. `primary`. Types tundra does not know are kept
    /// verbatim and ignored by the pipeline.
    pub kind: String,
    /// Location relative to the repository root.
    pub location: String,
    /// Digest of the (compressed) file as published.
    pub checksum: Checksum,
    /// Digest of the decompressed content, when published.
    pub open_checksum: Option<Checksum>,
    /// Size in bytes of the file as published.
    pub size: Option<u64>,
    /// Publication timestamp.
    pub timestamp: Option<u64>,
}

/// A parsed `repomd.xml`.
#[derive(Debug, Clone, PartialEq)]
pub struct Repomd {
    /// Repository revision, monotonically increased by publishers.
    pub revision: Option<String>,
    /// All referenced parts.
    pub parts: Vec<RepomdPart>,
}

impl Repomd {
    /// Parse a `repomd.xml` document.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RepodataError> {
        let raw: RawRepomd = quick_xml::de::from_reader(reader)?;
        let mut parts = Vec::with_capacity(raw.data.len());
        for data in raw.data {
            let kind = ChecksumKind::from_str(&data.checksum.kind)?;
            let open_checksum = data
                .open_checksum
                .map(|c| ChecksumKind::from_str(&c.kind).map(|k| Checksum::new(k, c.value)))
                .transpose()?;
            parts.push(RepomdPart {
                kind: data.kind,
                location: data.location.href,
                checksum: Checksum::new(kind, data.checksum.value),
                open_checksum,
                size: data.size,
                timestamp: data.timestamp.map(|t| t as u64),
            });
        }
        Ok(Repomd {
            revision: raw.revision,
            parts,
        })
    }

    /// Parse from a string.
    pub fn from_xml(xml: &str) -> Result<Self, RepodataError> {
        Self::from_reader(xml.as_bytes())
    }

    /// Look up a part by kind.
    pub fn part(&self, kind: PartKind) -> Option<&RepomdPart> {
        self.parts.iter().find(|p| p.kind == kind.as_str())
    }

    /// Look up a mandatory part, failing with [`RepodataError::MissingPart`].
    pub fn required_part(&self, kind: PartKind) -> Result<&RepomdPart, RepodataError> {
        self.part(kind).ok_or(RepodataError::MissingPart(kind))
    }
}

#[derive(Debug, Deserialize)]
struct RawRepomd {
    revision: Option<String>,
    #[serde(default, rename = "data")]
    data: Vec<RawData>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(rename = "@type")]
    kind: String,
    location: RawLocation,
    checksum: RawChecksum,
    #[serde(rename = "open-checksum")]
    open_checksum: Option<RawChecksum>,
    size: Option<u64>,
    // Fractional timestamps exist in the wild.
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Debug, Deserialize)]
struct RawChecksum {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "$text")]
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1628159953</revision>
  <data type="primary">
    <checksum type="sha256">5eeb0a03e31464d5f32524e761a2a5de0e4e0e92575cdc8309c83d20155e8bdd</checksum>
    <open-checksum type="sha256">aeb080b8fdf9dcb1a9f195a71a1a57a9a09b11e2c97c3f9dae1dcbcb2b3e9c5c</open-checksum>
    <location href="repodata/primary.xml.gz"/>
    <timestamp>1628159953</timestamp>
    <size>1992</size>
  </data>
  <data type="filelists">
    <checksum type="sha256">cccc0a03e31464d5f32524e761a2a5de0e4e0e92575cdc8309c83d20155e8bdd</checksum>
    <location href="repodata/filelists.xml.gz"/>
    <size>220</size>
  </data>
</repomd>"#;

    #[test]
    fn parse_sample() {
        let repomd = Repomd::from_xml(SAMPLE).unwrap();
        assert_eq!(repomd.revision.as_deref(), Some("1628159953"));
        assert_eq!(repomd.parts.len(), 2);

        let primary = repomd.required_part(PartKind::Primary).unwrap();
        assert_eq!(primary.location, "repodata/primary.xml.gz");
        assert_eq!(primary.checksum.kind, ChecksumKind::Sha256);
        assert_eq!(primary.size, Some(1992));
        assert!(primary.open_checksum.is_some());

        assert!(repomd.part(PartKind::Filelists).is_some());
        assert!(repomd.part(PartKind::Updateinfo).is_none());
        assert_matches!(
            repomd.required_part(PartKind::Updateinfo),
            Err(RepodataError::MissingPart(PartKind::Updateinfo))
        );
    }

    #[test]
    fn unknown_checksum_type_is_an_error() {
        let xml = SAMPLE.replace("type=\"sha256\"", "type=\"crc32\"");
        assert_matches!(
            Repomd::from_xml(&xml),
            Err(RepodataError::UnsupportedChecksum(_))
        );
    }
}
