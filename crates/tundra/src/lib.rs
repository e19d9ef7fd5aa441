#![deny(missing_docs)]

//! The tundra package-management engine.
//!
//! Tundra is a client for RPM package repositories, configuration
//! compatible with tdnf: it reads `tdnf.conf` and `*.repo` files,
//! maintains the metadata cache under the configured cache directory,
//! resolves dependencies, downloads and cryptographically verifies
//! packages, drives the rpm transaction engine and records every
//! mutation in a history database that supports rollback, undo and
//! redo.
//!
//! The crate layering mirrors the data flow: [`conf`] and [`repolist`]
//! load configuration, [`refresh`] materializes repo metadata into the
//! [`cache`] layout, [`goal`] drives the resolver, [`acquire`] and
//! [`gpg`] fetch and verify packages, [`trans`] executes the two-phase
//! rpm transaction, and [`session`] ties it all to one root object the
//! [`ops`] command modules run against.

pub mod acquire;
pub mod cache;
pub mod conf;
mod error;
pub mod goal;
pub mod gpg;
pub mod ops;
pub mod output;
pub mod plugin;
pub mod progress;
pub mod refresh;
pub mod remote;
pub mod repolist;
pub mod rpm;
pub mod session;
pub mod trans;

pub use error::{Error, Result};
pub use session::{Session, SessionOptions};
