#![deny(missing_docs)]

//! Core datatypes shared by every tundra crate.
//!
//! This crate is deliberately free of I/O: it models package identities
//! ([`Nevra`], [`Evr`] with rpm version ordering), checksums, repository
//! descriptors and the main configuration, so that the higher layers
//! (metadata pipeline, solver, history store) can agree on a single
//! vocabulary without depending on each other.

mod checksum;
mod config;
mod evr;
mod nevra;
mod repo;

pub use checksum::{Checksum, ChecksumKind, ParseChecksumKindError};
pub use config::{parse_bool, Config, VersionPin};
pub use evr::{rpmvercmp, Evr, ParseEvrError};
pub use nevra::{Nevra, ParseNevraError};
pub use repo::{
    MetadataExpire, ParseMetadataExpireError, RepoConfig, CMDLINE_REPO_ID, SYSTEM_REPO_ID,
};
