//! The `primary.xml` package records.

use std::io::BufRead;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use tundra_types::{Checksum, ChecksumKind, Evr, Nevra};

use crate::RepodataError;

/// Comparison operator of a versioned dependency entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepFlags {
    /// Unversioned: any provider satisfies.
    #[default]
    Any,
    /// Exactly the given EVR.
    Eq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl DepFlags {
    fn from_attr(attr: Option<&str>) -> DepFlags {
        match attr {
            Some("EQ") => DepFlags::Eq,
            Some("LT") => DepFlags::Lt,
            Some("LE") => DepFlags::Le,
            Some("GT") => DepFlags::Gt,
            Some("GE") => DepFlags::Ge,
            _ => DepFlags::Any,
        }
    }

    /// Whether `candidate` satisfies this constraint against `wanted`.
    pub fn matches(self, candidate: &Evr, wanted: &Evr) -> bool {
        match self {
            DepFlags::Any => true,
            DepFlags::Eq => candidate == wanted,
            DepFlags::Lt => candidate < wanted,
            DepFlags::Le => candidate <= wanted,
            DepFlags::Gt => candidate > wanted,
            DepFlags::Ge => candidate >= wanted,
        }
    }
}

/// One `rpm:entry`: a named, optionally versioned capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dependency {
    /// Capability name, e.g. `libssl.so.3()(64bit)` or a package name.
    pub name: String,
    /// Constraint operator.
    pub flags: DepFlags,
    /// Constraint EVR; meaningful only when `flags != Any`.
    pub evr: Option<Evr>,
}

impl Dependency {
    /// An unversioned capability.
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: DepFlags::Any,
            evr: None,
        }
    }

    /// A versioned capability.
    pub fn versioned(name: impl Into<String>, flags: DepFlags, evr: Evr) -> Self {
        Self {
            name: name.into(),
            flags,
            evr: Some(evr),
        }
    }

    /// Whether a provider with `provided` EVR satisfies this requirement.
    /// Unversioned provides satisfy any requirement on the same name.
    pub fn satisfied_by(&self, provided: Option<&Evr>) -> bool {
        match (&self.evr, provided) {
            (None, _) => true,
            // Unversioned provide against a versioned requirement: rpm
            // treats this as a match.
            (Some(_), None) => true,
            (Some(wanted), Some(prov)) => self.flags.matches(prov, wanted),
        }
    }
}

/// The byte range of the rpm header within the package file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderRange {
    /// First byte of the header.
    pub start: u64,
    /// One past the last byte of the header.
    pub end: u64,
}

/// One `<package>` record from `primary.xml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryPackage {
    /// Package name.
    pub name: String,
    /// Architecture.
    pub arch: String,
    /// Epoch, version, release.
    pub evr: Evr,
    /// Package digest (`pkgid`).
    pub checksum: Checksum,
    /// One-line summary.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Upstream URL.
    pub url: String,
    /// License string.
    pub license: String,
    /// Download location relative to the repo root.
    pub location: String,
    /// Size of the `.rpm` file in bytes.
    pub download_size: u64,
    /// Installed payload size in bytes.
    pub install_size: u64,
    /// Source rpm file name.
    pub source_rpm: String,
    /// Header byte range, used for partial fetches.
    pub header_range: HeaderRange,
    /// Capabilities this package provides.
    pub provides: Vec<Dependency>,
    /// Capabilities this package requires.
    pub requires: Vec<Dependency>,
    /// Capabilities this package conflicts with.
    pub conflicts: Vec<Dependency>,
    /// Capabilities this package obsoletes.
    pub obsoletes: Vec<Dependency>,
    /// Files listed directly in primary (the full list lives in
    /// filelists).
    pub files: Vec<String>,
}

impl PrimaryPackage {
    /// The package identity.
    pub fn nevra(&self) -> Nevra {
        Nevra::new(self.name.clone(), self.evr.clone(), self.arch.clone())
    }

    /// Whether this is a source package.
    pub fn is_source(&self) -> bool {
        self.arch == "src" || self.arch == "nosrc"
    }
}

/// A parsed `primary.xml` document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrimaryMetadata {
    /// All package records.
    pub packages: Vec<PrimaryPackage>,
}

impl PrimaryMetadata {
    /// Parse a (decompressed) `primary.xml` stream.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RepodataError> {
        let raw: RawMetadata = quick_xml::de::from_reader(reader)?;
        let mut packages = Vec::with_capacity(raw.packages.len());
        for pkg in raw.packages {
            // Anything that is not an rpm entry (e.g. future types) is
            // skipped rather than rejected.
            if pkg.kind.as_deref().unwrap_or("rpm") != "rpm" {
                continue;
            }
            let kind = ChecksumKind::from_str(&pkg.checksum.kind)?;
            let format = pkg.format.unwrap_or_default();
            packages.push(PrimaryPackage {
                name: pkg.name,
                arch: pkg.arch,
                evr: Evr {
                    epoch: pkg.version.epoch,
                    version: pkg.version.ver,
                    release: pkg.version.rel,
                },
                checksum: Checksum::new(kind, pkg.checksum.value),
                summary: pkg.summary.unwrap_or_default(),
                description: pkg.description.unwrap_or_default(),
                url: pkg.url.unwrap_or_default(),
                license: format.license.unwrap_or_default(),
                location: pkg.location.href,
                download_size: pkg.size.package,
                install_size: pkg.size.installed,
                source_rpm: format.sourcerpm.unwrap_or_default(),
                header_range: format
                    .header_range
                    .map(|r| HeaderRange {
                        start: r.start,
                        end: r.end,
                    })
                    .unwrap_or_default(),
                provides: convert_entries(format.provides),
                requires: convert_entries(format.requires),
                conflicts: convert_entries(format.conflicts),
                obsoletes: convert_entries(format.obsoletes),
                files: format.files.into_iter().map(|f| f.path).collect(),
            });
        }
        Ok(PrimaryMetadata { packages })
    }

    /// Parse from a string.
    pub fn from_xml(xml: &str) -> Result<Self, RepodataError> {
        Self::from_reader(xml.as_bytes())
    }
}

fn convert_entries(list: Option<RawEntryList>) -> Vec<Dependency> {
    let Some(list) = list else {
        return Vec::new();
    };
    list.entries
        .into_iter()
        .map(|e| {
            let flags = DepFlags::from_attr(e.flags.as_deref());
            let evr = if flags == DepFlags::Any {
                None
            } else {
                Some(Evr {
                    epoch: e.epoch.unwrap_or(0),
                    version: e.ver.unwrap_or_default(),
                    release: e.rel.unwrap_or_default(),
                })
            };
            Dependency {
                name: e.name,
                flags,
                evr,
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default, rename = "package")]
    packages: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(rename = "@type")]
    kind: Option<String>,
    name: String,
    arch: String,
    version: RawVersion,
    checksum: RawChecksum,
    summary: Option<String>,
    description: Option<String>,
    url: Option<String>,
    location: RawLocation,
    size: RawSize,
    format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    #[serde(rename = "@epoch", default)]
    epoch: u64,
    #[serde(rename = "@ver")]
    ver: String,
    #[serde(rename = "@rel", default)]
    rel: String,
}

#[derive(Debug, Deserialize)]
struct RawChecksum {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Debug, Deserialize)]
struct RawSize {
    #[serde(rename = "@package", default)]
    package: u64,
    #[serde(rename = "@installed", default)]
    installed: u64,
}

// quick-xml strips namespace prefixes down to the local name when
// deserializing elements, hence the unprefixed renames.
#[derive(Debug, Default, Deserialize)]
struct RawFormat {
    #[serde(rename = "license")]
    license: Option<String>,
    #[serde(rename = "sourcerpm")]
    sourcerpm: Option<String>,
    #[serde(rename = "header-range")]
    header_range: Option<RawHeaderRange>,
    #[serde(rename = "provides")]
    provides: Option<RawEntryList>,
    #[serde(rename = "requires")]
    requires: Option<RawEntryList>,
    #[serde(rename = "conflicts")]
    conflicts: Option<RawEntryList>,
    #[serde(rename = "obsoletes")]
    obsoletes: Option<RawEntryList>,
    #[serde(default, rename = "file")]
    files: Vec<RawFile>,
}

#[derive(Debug, Deserialize)]
struct RawHeaderRange {
    #[serde(rename = "@start")]
    start: u64,
    #[serde(rename = "@end")]
    end: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawEntryList {
    #[serde(default, rename = "entry")]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@flags")]
    flags: Option<String>,
    #[serde(rename = "@epoch")]
    epoch: Option<u64>,
    #[serde(rename = "@ver")]
    ver: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(rename = "$text")]
    path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
  <package type="rpm">
    <name>foo</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="1.0" rel="1"/>
    <checksum type="sha256" pkgid="YES">aeb080b8fdf9dcb1a9f195a71a1a57a9a09b11e2c97c3f9dae1dcbcb2b3e9c5c</checksum>
    <summary>Foo summary</summary>
    <description>Foo description</description>
    <url>https://example.org/foo</url>
    <time file="1628159953" build="1628159900"/>
    <size package="123456" installed="345678" archive="345690"/>
    <location href="rpms/x86_64/foo-1.0-1.x86_64.rpm"/>
    <format>
      <rpm:license>MIT</rpm:license>
      <rpm:sourcerpm>foo-1.0-1.src.rpm</rpm:sourcerpm>
      <rpm:header-range start="880" end="5769"/>
      <rpm:provides>
        <rpm:entry name="foo" flags="EQ" epoch="0" ver="1.0" rel="1"/>
        <rpm:entry name="foo(x86-64)" flags="EQ" epoch="0" ver="1.0" rel="1"/>
      </rpm:provides>
      <rpm:requires>
        <rpm:entry name="bar" flags="GE" epoch="0" ver="2.0"/>
        <rpm:entry name="/bin/sh"/>
      </rpm:requires>
      <file>/usr/bin/foo</file>
    </format>
  </package>
  <package type="rpm">
    <name>bar</name>
    <arch>noarch</arch>
    <version epoch="1" ver="2.0" rel="3"/>
    <checksum type="sha256" pkgid="YES">bbb080b8fdf9dcb1a9f195a71a1a57a9a09b11e2c97c3f9dae1dcbcb2b3e9c5c</checksum>
    <summary>Bar</summary>
    <description/>
    <location href="rpms/noarch/bar-2.0-3.noarch.rpm"/>
    <size package="2222" installed="3333" archive="3344"/>
    <format>
      <rpm:provides>
        <rpm:entry name="bar" flags="EQ" epoch="1" ver="2.0" rel="3"/>
      </rpm:provides>
    </format>
  </package>
</metadata>"#;

    #[test]
    fn parse_sample() {
        let meta = PrimaryMetadata::from_xml(SAMPLE).unwrap();
        assert_eq!(meta.packages.len(), 2);

        let foo = &meta.packages[0];
        assert_eq!(foo.nevra().to_string(), "foo-1.0-1.x86_64");
        assert_eq!(foo.location, "rpms/x86_64/foo-1.0-1.x86_64.rpm");
        assert_eq!(foo.download_size, 123456);
        assert_eq!(foo.install_size, 345678);
        assert_eq!(foo.license, "MIT");
        assert_eq!(foo.source_rpm, "foo-1.0-1.src.rpm");
        assert_eq!(foo.header_range, HeaderRange { start: 880, end: 5769 });
        assert_eq!(foo.provides.len(), 2);
        assert_eq!(foo.files, vec!["/usr/bin/foo".to_string()]);

        let versioned = &foo.requires[0];
        assert_eq!(versioned.name, "bar");
        assert_eq!(versioned.flags, DepFlags::Ge);
        assert_eq!(versioned.evr, Some(Evr::new(0, "2.0", "")));

        let unversioned = &foo.requires[1];
        assert_eq!(unversioned.name, "/bin/sh");
        assert_eq!(unversioned.flags, DepFlags::Any);
        assert_eq!(unversioned.evr, None);

        let bar = &meta.packages[1];
        assert_eq!(bar.evr, Evr::new(1, "2.0", "3"));
        assert!(!bar.is_source());
    }

    #[test]
    fn dependency_satisfaction() {
        let req = Dependency::versioned("bar", DepFlags::Ge, Evr::new(0, "2.0", ""));
        assert!(req.satisfied_by(Some(&Evr::new(0, "2.0", ""))));
        assert!(req.satisfied_by(Some(&Evr::new(1, "1.0", ""))));
        assert!(!req.satisfied_by(Some(&Evr::new(0, "1.9", "4"))));
        assert!(req.satisfied_by(None));

        let any = Dependency::unversioned("/bin/sh");
        assert!(any.satisfied_by(None));
        assert!(any.satisfied_by(Some(&Evr::new(0, "9", "9"))));
    }
}
