//! Per-repo transfer options.

use std::path::PathBuf;

/// Everything a [`crate::Fetcher`] needs to know about a remote.
///
/// These map one-to-one onto the repo descriptor knobs; the engine crate
/// converts a repo configuration into this shape.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Total transfer timeout in seconds. `0` disables the limit.
    pub timeout: u64,
    /// Abort transfers that stay below this many bytes/sec. `0` disables.
    pub minrate: u64,
    /// Cap transfers to this many bytes/sec. `0` disables.
    pub throttle: u64,
    /// Verify TLS peer certificates.
    pub sslverify: bool,
    /// Extra CA bundle.
    pub ssl_ca_cert: Option<PathBuf>,
    /// Client certificate (PEM).
    pub ssl_client_cert: Option<PathBuf>,
    /// Client key (PEM).
    pub ssl_client_key: Option<PathBuf>,
    /// HTTP basic auth user.
    pub username: Option<String>,
    /// HTTP basic auth password.
    pub password: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Proxy user.
    pub proxy_username: Option<String>,
    /// Proxy password.
    pub proxy_password: Option<String>,
    /// Attempts per download; transient failures only.
    pub retries: u32,
    /// User agent presented to mirrors.
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: 0,
            minrate: 0,
            throttle: 0,
            sslverify: true,
            ssl_ca_cert: None,
            ssl_client_cert: None,
            ssl_client_key: None,
            username: None,
            password: None,
            proxy: None,
            proxy_username: None,
            proxy_password: None,
            retries: 10,
            user_agent: concat!("tundra/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
