//! The engine's error type and its stable numeric codes.
//!
//! Codes are assigned from disjoint ranges so callers (and the JSON
//! output consumer) can dispatch on the range alone:
//!
//! | range | kind |
//! |---|---|
//! | 1000–1099 | invalid input |
//! | 1100–1199 | not found |
//! | 1200–1299 | solver |
//! | 1300–1399 | repo and metadata |
//! | 1400–1499 | cryptographic verification |
//! | 1500–1599 | resources |
//! | 1600–1699 | rpm transaction |
//! | 1900–1999 | history |
//! | 2000–2999 | system errno, offset by 2000 |
//! | 3000–3099 | transfer |

use thiserror::Error;

use tundra_fetch::FetchError;
use tundra_history::HistoryError;
use tundra_repodata::RepodataError;
use tundra_solve::SolveError;

/// Any failure the engine can surface to the command layer.
#[derive(Debug, Error)]
pub enum Error {
    // -- invalid input ---------------------------------------------------
    /// A command that needs package arguments got none.
    #[error("Package name expected but was not provided")]
    PackageRequired,
    /// Free-form argument validation failure.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// `metadata_expire` value failed to parse.
    #[error("metadata_expire value could not be parsed. Check your repo files.")]
    MetadataExpireParse(String),
    /// A binary rpm was given where a source rpm is required.
    #[error("{0} is not a source rpm")]
    NotSourceRpm(String),

    // -- not found -------------------------------------------------------
    /// No repo with the given id.
    #[error("Repo {0} does not exist")]
    RepoNotFound(String),
    /// A query matched nothing.
    #[error("No matching packages")]
    NoMatch,
    /// Search found nothing.
    #[error("No matches found")]
    NoSearchResults,
    /// A file argument does not exist.
    #[error("File {0} not found")]
    FileNotFound(String),

    // -- conflict --------------------------------------------------------
    /// Two repo definitions share an id.
    #[error("Duplicate repo id: {0}")]
    DuplicateRepoId(String),
    /// The plan would remove a protected package.
    #[error("The operation would result in removing a protected package: {0}")]
    Protected(String),

    // -- solver ----------------------------------------------------------
    /// The resolver reported problems.
    #[error(transparent)]
    Solve(#[from] SolveError),

    // -- repo / metadata -------------------------------------------------
    /// Main config failed to load.
    #[error("Error loading config file {0}")]
    ConfFileLoad(String),
    /// A repo file failed to load or parse.
    #[error("Encountered an invalid repo file: {0}")]
    InvalidRepoFile(String),
    /// The configured repodir cannot be read.
    #[error("Error opening repo dir {0}")]
    RepoDirOpen(String),
    /// No repo is enabled.
    #[error("There are no enabled repos.\n Run \"tundra repolist all\" to see the repos you have.\n You can enable repos by\n 1. by passing in --enablerepo <reponame>\n 2. editing repo files in your repodir")]
    NoEnabledRepos,
    /// A repo has neither baseurl nor metalink nor mirrorlist.
    #[error("Base URL and Metalink URL not found in the repo file for {0}")]
    BaseUrlMissing(String),
    /// The `$releasever` provider package is not installed.
    #[error("distroverpkg config entry is set to a package that is not installed")]
    NoDistroVerPkg,
    /// Metadata parse or reference failure.
    #[error(transparent)]
    Repodata(#[from] RepodataError),

    // -- cryptographic ---------------------------------------------------
    /// Downloaded file size does not match the declared size.
    #[error("File size of {path} does not match: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Offending file.
        path: String,
        /// Declared size.
        expected: u64,
        /// Observed size.
        actual: u64,
    },
    /// Downloaded file digest does not match the declared digest.
    #[error("File checksum of {0} does not match")]
    ChecksumMismatch(String),
    /// Package signature is missing or matches no configured key.
    #[error("Package {0} is not signed with a known key. Use --nogpgcheck to ignore.")]
    NoMatchingKey(String),
    /// A GPG key file failed to parse.
    #[error("Public key file {0} is invalid or corrupted")]
    InvalidPubkey(String),
    /// A gpgkey URL points outside the supported schemes or the keys
    /// directory.
    #[error("GpgKey Url {0} is invalid for this repo")]
    KeyUrlInvalid(String),
    /// A repo needs gpgcheck but declares no keys.
    #[error("gpgkey entry is missing for this repo. Please add gpgkey in the repo file or use --nogpgcheck to ignore.")]
    NoGpgKeyConfEntry,

    // -- resources -------------------------------------------------------
    /// Cache-only mode but no cached metadata present.
    #[error("cache only is set, but no repo data found")]
    CacheDisabled,
    /// The cache filesystem cannot hold the pending downloads.
    #[error("Insufficient disk space at cache directory. Try freeing space first.")]
    CacheDirOutOfDiskSpace,
    /// Mutating operation without root.
    #[error("Operation not permitted. You have to be root.")]
    NotRoot,
    /// The user answered no, or stdin was not a tty.
    #[error("Operation aborted.")]
    OperationAborted,

    // -- rpm transaction -------------------------------------------------
    /// The rpm transaction failed.
    #[error("rpm transaction failed: {0}")]
    TransactionFailed(String),
    /// The rpm test transaction reported problems.
    #[error("rpm check reported errors: {0}")]
    RpmCheck(String),
    /// An rpm file could not be read.
    #[error("unable to read rpm {0}")]
    RpmRead(String),

    // -- history ---------------------------------------------------------
    /// History store failure.
    #[error(transparent)]
    History(#[from] HistoryError),

    // -- system ----------------------------------------------------------
    /// Underlying system error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // -- transfer --------------------------------------------------------
    /// Download engine failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl Error {
    /// The stable numeric code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::PackageRequired => 1001,
            Error::InvalidInput(_) => 1002,
            Error::MetadataExpireParse(_) => 1003,
            Error::NotSourceRpm(_) => 1004,

            Error::RepoNotFound(_) => 1101,
            Error::NoMatch => 1102,
            Error::NoSearchResults => 1103,
            Error::FileNotFound(_) => 1104,

            Error::Solve(_) => 1201,

            Error::ConfFileLoad(_) => 1301,
            Error::InvalidRepoFile(_) => 1302,
            Error::RepoDirOpen(_) => 1303,
            Error::NoEnabledRepos => 1304,
            Error::BaseUrlMissing(_) => 1305,
            Error::NoDistroVerPkg => 1306,
            Error::DuplicateRepoId(_) => 1307,
            Error::Repodata(_) => 1308,

            Error::SizeMismatch { .. } => 1401,
            Error::ChecksumMismatch(_) => 1402,
            Error::NoMatchingKey(_) => 1403,
            Error::InvalidPubkey(_) => 1405,
            Error::KeyUrlInvalid(_) => 1406,
            Error::NoGpgKeyConfEntry => 1407,

            Error::CacheDisabled => 1501,
            Error::CacheDirOutOfDiskSpace => 1502,
            Error::NotRoot => 1503,
            Error::OperationAborted => 1504,
            Error::Protected(_) => 1505,

            Error::TransactionFailed(_) => 1601,
            Error::RpmCheck(_) => 1602,
            Error::RpmRead(_) => 1603,

            Error::History(_) => 1901,

            Error::Io(err) => 2000 + err.raw_os_error().unwrap_or(0).unsigned_abs(),

            Error::Fetch(err) => {
                3000 + match err {
                    FetchError::UnsupportedProtocol(_) => 1,
                    FetchError::MalformedUrl(_) => 3,
                    FetchError::Status { .. } => 22,
                    FetchError::Io(_) => 23,
                    FetchError::SslSettings(_) => 60,
                    FetchError::ProxySettings(_) => 5,
                    FetchError::TooSlow { .. } => 28,
                    FetchError::Transfer(_) | FetchError::TransferIo(_) => 7,
                }
            }
        }
    }
}

/// Engine-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_disjoint() {
        assert!(Error::PackageRequired.code() < 1100);
        assert!((1100..1200).contains(&Error::NoMatch.code()));
        assert!((1400..1500).contains(&Error::ChecksumMismatch("x".into()).code()));
        assert!((1900..2000).contains(&Error::History(HistoryError::Empty).code()));
        let io = Error::Io(std::io::Error::from_raw_os_error(2));
        assert_eq!(io.code(), 2002);
        let fetch = Error::Fetch(FetchError::UnsupportedProtocol("ftp".into()));
        assert_eq!(fetch.code(), 3001);
    }
}
