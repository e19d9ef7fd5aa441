//! The `updateinfo.xml` advisory metadata.

use std::fmt;
use std::io::BufRead;

use serde::Deserialize;

use tundra_types::{Evr, Nevra};

use crate::RepodataError;

/// Advisory classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdvisoryKind {
    /// Security fix.
    Security,
    /// Bug fix.
    Bugfix,
    /// Enhancement.
    Enhancement,
    /// Anything else.
    #[default]
    Unknown,
}

impl AdvisoryKind {
    fn from_attr(attr: &str) -> Self {
        match attr {
            "security" => AdvisoryKind::Security,
            "bugfix" => AdvisoryKind::Bugfix,
            "enhancement" => AdvisoryKind::Enhancement,
            _ => AdvisoryKind::Unknown,
        }
    }
}

impl fmt::Display for AdvisoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdvisoryKind::Security => "Security",
            AdvisoryKind::Bugfix => "Bugfix",
            AdvisoryKind::Enhancement => "Enhancement",
            AdvisoryKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// An external reference (CVE, bugzilla, ...) of an advisory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryReference {
    /// Link target.
    pub href: String,
    /// Reference id, e.g. a CVE number.
    pub id: String,
    /// Human title.
    pub title: String,
    /// Reference type string as published.
    pub kind: String,
}

/// A package an advisory ships.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryPackage {
    /// Package identity the advisory updates to.
    pub nevra: Nevra,
    /// Published file name.
    pub filename: String,
    /// Whether installing this update requires a reboot.
    pub reboot_suggested: bool,
}

/// One `<update>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    /// Advisory id, e.g. `PHSA-2024-5.0-0001`.
    pub id: String,
    /// Classification.
    pub kind: AdvisoryKind,
    /// Human title.
    pub title: String,
    /// Severity string as published (`Important`, `Moderate`, ...).
    pub severity: Option<String>,
    /// Long description.
    pub description: String,
    /// Issue date string as published.
    pub issued: Option<String>,
    /// External references.
    pub references: Vec<AdvisoryReference>,
    /// Packages the advisory applies to.
    pub packages: Vec<AdvisoryPackage>,
}

/// A parsed `updateinfo.xml`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Updateinfo {
    /// All advisories.
    pub advisories: Vec<Advisory>,
}

impl Updateinfo {
    /// Parse a (decompressed) `updateinfo.xml` stream.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RepodataError> {
        let raw: RawUpdates = quick_xml::de::from_reader(reader)?;
        let advisories = raw
            .updates
            .into_iter()
            .map(|u| Advisory {
                id: u.id,
                kind: AdvisoryKind::from_attr(&u.kind),
                title: u.title.unwrap_or_default(),
                severity: u.severity,
                description: u.description.unwrap_or_default(),
                issued: u.issued.map(|i| i.date),
                references: u
                    .references
                    .map(|r| {
                        r.references
                            .into_iter()
                            .map(|r| AdvisoryReference {
                                href: r.href.unwrap_or_default(),
                                id: r.id.unwrap_or_default(),
                                title: r.title.unwrap_or_default(),
                                kind: r.kind.unwrap_or_default(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                packages: u
                    .pkglist
                    .map(|p| {
                        p.collections
                            .into_iter()
                            .flat_map(|c| c.packages)
                            .map(|p| AdvisoryPackage {
                                nevra: Nevra::new(
                                    p.name,
                                    Evr {
                                        epoch: p.epoch.unwrap_or(0),
                                        version: p.version,
                                        release: p.release,
                                    },
                                    p.arch,
                                ),
                                filename: p.filename.unwrap_or_default(),
                                reboot_suggested: p.reboot_suggested.is_some(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        Ok(Updateinfo { advisories })
    }

    /// Parse from a string.
    pub fn from_xml(xml: &str) -> Result<Self, RepodataError> {
        Self::from_reader(xml.as_bytes())
    }
}

#[derive(Debug, Deserialize)]
struct RawUpdates {
    #[serde(default, rename = "update")]
    updates: Vec<RawUpdate>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    #[serde(rename = "@type")]
    kind: String,
    id: String,
    title: Option<String>,
    severity: Option<String>,
    description: Option<String>,
    issued: Option<RawIssued>,
    references: Option<RawReferences>,
    pkglist: Option<RawPkglist>,
}

#[derive(Debug, Deserialize)]
struct RawIssued {
    #[serde(rename = "@date")]
    date: String,
}

#[derive(Debug, Deserialize)]
struct RawReferences {
    #[serde(default, rename = "reference")]
    references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPkglist {
    #[serde(default, rename = "collection")]
    collections: Vec<RawCollection>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default, rename = "package")]
    packages: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@epoch")]
    epoch: Option<u64>,
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "@release")]
    release: String,
    #[serde(rename = "@arch")]
    arch: String,
    filename: Option<String>,
    reboot_suggested: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<updates>
  <update from="security@example.org" status="stable" type="security" version="1">
    <id>TSA-2024-001</id>
    <title>Critical openssl update</title>
    <severity>Important</severity>
    <issued date="2024-03-01 10:00:00"/>
    <description>Fixes CVE-2024-0001.</description>
    <references>
      <reference href="https://cve.example.org/CVE-2024-0001" id="CVE-2024-0001" title="CVE-2024-0001" type="cve"/>
    </references>
    <pkglist>
      <collection short="tsa">
        <name>tsa collection</name>
        <package name="openssl" epoch="0" version="3.0.13" release="1" arch="x86_64">
          <filename>openssl-3.0.13-1.x86_64.rpm</filename>
          <reboot_suggested>True</reboot_suggested>
        </package>
      </collection>
    </pkglist>
  </update>
  <update type="bugfix">
    <id>TBA-2024-002</id>
    <title>bar fixes</title>
    <pkglist>
      <collection>
        <package name="bar" version="2.1" release="1" arch="noarch"/>
      </collection>
    </pkglist>
  </update>
</updates>"#;

    #[test]
    fn parse_sample() {
        let info = Updateinfo::from_xml(SAMPLE).unwrap();
        assert_eq!(info.advisories.len(), 2);

        let sec = &info.advisories[0];
        assert_eq!(sec.id, "TSA-2024-001");
        assert_eq!(sec.kind, AdvisoryKind::Security);
        assert_eq!(sec.severity.as_deref(), Some("Important"));
        assert_eq!(sec.references.len(), 1);
        assert_eq!(sec.references[0].id, "CVE-2024-0001");
        assert_eq!(sec.packages.len(), 1);
        assert_eq!(
            sec.packages[0].nevra.to_string(),
            "openssl-3.0.13-1.x86_64"
        );
        assert!(sec.packages[0].reboot_suggested);

        let bug = &info.advisories[1];
        assert_eq!(bug.kind, AdvisoryKind::Bugfix);
        assert!(!bug.packages[0].reboot_suggested);
    }
}
