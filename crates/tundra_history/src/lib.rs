#![deny(missing_docs)]

//! Persistent record of every mutation of the installed package set.
//!
//! The store models history as one *baseline* (the absolute installed set
//! at first use) followed by *delta* transactions (additions and removals
//! relative to the previous state). The state at any transaction is
//! reconstructed by replaying: nearest baseline at or before it, then
//! every delta up to and including it. Auto-installed flags are an
//! append-only log keyed by package name; the value at a transaction is
//! the most recent entry at or before it.
//!
//! Everything lives in a single SQLite file under the persist directory;
//! other processes may open it read-only.

mod diff;
mod store;

pub use diff::diff_sorted;
pub use store::{Delta, HistoryDb, HistoryTransaction, TransactionKind};

use thiserror::Error;

/// Errors from the history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Underlying database failure.
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A transaction id that does not exist.
    #[error("history has no transaction {0}")]
    UnknownTransaction(i64),
    /// The database exists but holds no baseline yet.
    #[error("history database is empty")]
    Empty,
    /// The database content violates an invariant (e.g. a delta before
    /// any baseline).
    #[error("history database is corrupt: {0}")]
    Corrupt(String),
}
