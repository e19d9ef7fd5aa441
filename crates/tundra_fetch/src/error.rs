//! Transfer error classification.

use thiserror::Error;

/// Errors from the download engine.
///
/// [`FetchError::is_fatal`] decides whether the retry loop may try again:
/// failures rooted in the request itself or in the local machine are
/// final, network weather is not.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL scheme the engine does not speak.
    #[error("unsupported protocol {0:?}")]
    UnsupportedProtocol(String),
    /// The URL failed to parse.
    #[error("malformed URL {0:?}")]
    MalformedUrl(String),
    /// The server answered with an error status.
    #[error("server returned {code} for {url}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// The URL that failed.
        url: String,
    },
    /// Local filesystem failure (create, write, rename).
    #[error("local file error: {0}")]
    Io(#[source] std::io::Error),
    /// TLS or certificate configuration problem.
    #[error("error setting SSL settings: {0}")]
    SslSettings(String),
    /// Proxy configuration problem.
    #[error("error setting proxy {0:?}")]
    ProxySettings(String),
    /// Transfer stayed below the configured minimum rate.
    #[error("transfer rate {rate} B/s below minrate {minrate} B/s")]
    TooSlow {
        /// Observed rate.
        rate: u64,
        /// Configured floor.
        minrate: u64,
    },
    /// Transient transport failure (connect, reset, timeout).
    #[error("transfer error: {0}")]
    Transfer(#[source] reqwest::Error),
    /// Transport failure surfaced through the body reader.
    #[error("transfer error: {0}")]
    TransferIo(#[source] std::io::Error),
}

impl FetchError {
    /// Whether retrying the same request can possibly succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            FetchError::UnsupportedProtocol(_)
            | FetchError::MalformedUrl(_)
            | FetchError::Io(_)
            | FetchError::SslSettings(_)
            | FetchError::ProxySettings(_)
            | FetchError::Status { .. } => true,
            FetchError::TooSlow { .. }
            | FetchError::Transfer(_)
            | FetchError::TransferIo(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchError::MalformedUrl(
                err.url().map(|u| u.to_string()).unwrap_or_default(),
            )
        } else {
            FetchError::Transfer(err)
        }
    }

    pub(crate) fn transfer_io(err: std::io::Error) -> Self {
        FetchError::TransferIo(err)
    }
}
