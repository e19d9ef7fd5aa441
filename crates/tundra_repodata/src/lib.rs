#![deny(missing_docs)]

//! Typed models and parsers for the RPM repository wire format.
//!
//! A repository publishes an index, `repodata/repomd.xml`, that names the
//! metadata parts (`primary`, `filelists`, `updateinfo`, `other`) together
//! with their checksums and on-disk locations. The parts themselves are
//! XML documents, usually gz/xz/zst compressed. This crate turns all of
//! them into plain Rust values; it performs no network I/O.

mod decompress;
mod filelists;
mod metalink;
mod primary;
mod repomd;
mod updateinfo;

pub use decompress::open_metadata_reader;
pub use filelists::{FileEntry, FileKind, Filelists, FilelistsPackage};
pub use metalink::{Metalink, MetalinkUrl};
pub use primary::{DepFlags, Dependency, HeaderRange, PrimaryMetadata, PrimaryPackage};
pub use repomd::{Repomd, RepomdPart, PartKind};
pub use updateinfo::{Advisory, AdvisoryKind, AdvisoryPackage, AdvisoryReference, Updateinfo};

use thiserror::Error;

/// Errors produced while reading repository metadata.
#[derive(Debug, Error)]
pub enum RepodataError {
    /// The XML failed to deserialize.
    #[error("malformed metadata: {0}")]
    Xml(#[from] quick_xml::DeError),
    /// Underlying file I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// `repomd.xml` does not reference a mandatory part.
    #[error("repomd.xml has no {0} part")]
    MissingPart(PartKind),
    /// A checksum type tundra does not support.
    #[error(transparent)]
    UnsupportedChecksum(#[from] tundra_types::ParseChecksumKindError),
    /// A metalink document with no usable resource.
    #[error("metalink file has no download resources")]
    NoMetalinkResources,
    /// The downloaded file does not match the digest the metalink declares.
    #[error("checksum validation failed for file downloaded from metalink")]
    MetalinkDigestMismatch,
}
