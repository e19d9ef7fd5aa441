//! The `filelists.xml` per-package file lists.

use std::io::BufRead;

use serde::Deserialize;

use tundra_types::{Evr, Nevra};

use crate::RepodataError;

/// What a file entry denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileKind {
    /// A regular file.
    #[default]
    File,
    /// A directory.
    Dir,
    /// A ghost entry (not shipped, owned at runtime).
    Ghost,
}

/// One file owned by a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path.
    pub path: String,
    /// Entry kind.
    pub kind: FileKind,
}

/// Files of one package.
#[derive(Debug, Clone, PartialEq)]
pub struct FilelistsPackage {
    /// Package digest (`pkgid`), matches the primary record checksum.
    pub pkgid: String,
    /// Package name.
    pub name: String,
    /// Architecture.
    pub arch: String,
    /// Epoch, version, release.
    pub evr: Evr,
    /// Owned files.
    pub files: Vec<FileEntry>,
}

impl FilelistsPackage {
    /// The package identity.
    pub fn nevra(&self) -> Nevra {
        Nevra::new(self.name.clone(), self.evr.clone(), self.arch.clone())
    }
}

/// A parsed `filelists.xml` document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filelists {
    /// Per-package file lists.
    pub packages: Vec<FilelistsPackage>,
}

impl Filelists {
    /// Parse a (decompressed) `filelists.xml` stream.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, RepodataError> {
        let raw: RawFilelists = quick_xml::de::from_reader(reader)?;
        let packages = raw
            .packages
            .into_iter()
            .map(|pkg| FilelistsPackage {
                pkgid: pkg.pkgid,
                name: pkg.name,
                arch: pkg.arch,
                evr: Evr {
                    epoch: pkg.version.epoch,
                    version: pkg.version.ver,
                    release: pkg.version.rel,
                },
                files: pkg
                    .files
                    .into_iter()
                    .map(|f| FileEntry {
                        kind: match f.kind.as_deref() {
                            Some("dir") => FileKind::Dir,
                            Some("ghost") => FileKind::Ghost,
                            _ => FileKind::File,
                        },
                        path: f.path,
                    })
                    .collect(),
            })
            .collect();
        Ok(Filelists { packages })
    }

    /// Parse from a string.
    pub fn from_xml(xml: &str) -> Result<Self, RepodataError> {
        Self::from_reader(xml.as_bytes())
    }
}

#[derive(Debug, Deserialize)]
struct RawFilelists {
    #[serde(default, rename = "package")]
    packages: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(rename = "@pkgid")]
    pkgid: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@arch")]
    arch: String,
    version: RawVersion,
    #[serde(default, rename = "file")]
    files: Vec<RawFile>,
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
struct RawFile {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "$text")]
    path: String,
}
