//! Repository descriptors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the synthetic repo holding packages given as file paths or URLs
/// on the command line.
pub const CMDLINE_REPO_ID: &str = "@cmdline";

/// Id of the synthetic repo representing the local rpm database.
pub const SYSTEM_REPO_ID: &str = "@system";

/// How long cached metadata stays fresh.
///
/// `Never` disables age-based refresh entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataExpire {
    /// Metadata never expires purely due to age.
    Never,
    /// Metadata is stale once older than this.
    After(Duration),
}

/// Error parsing a `metadata_expire` value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid metadata_expire value {0:?}")]
pub struct ParseMetadataExpireError(pub String);

impl MetadataExpire {
    /// The tdnf default of 48 hours.
    pub const DEFAULT: MetadataExpire = MetadataExpire::After(Duration::from_secs(172_800));

    /// Seconds representation with `-1` meaning never, as stored by the C
    /// implementation.
    pub fn as_secs(&self) -> i64 {
        match self {
            MetadataExpire::Never => -1,
            MetadataExpire::After(d) => d.as_secs() as i64,
        }
    }
}

impl FromStr for MetadataExpire {
    type Err = ParseMetadataExpireError;

    /// Parse `<int>[s|m|h|d]` with seconds as the default unit, or the
    /// literal `never`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") {
            return Ok(MetadataExpire::Never);
        }
        let (digits, multiplier) = match s.as_bytes().last() {
            Some(b's') => (&s[..s.len() - 1], 1u64),
            Some(b'm') => (&s[..s.len() - 1], 60),
            Some(b'h') => (&s[..s.len() - 1], 3600),
            Some(b'd') => (&s[..s.len() - 1], 86_400),
            _ => (s, 1),
        };
        let value = digits
            .parse::<u64>()
            .map_err(|_| ParseMetadataExpireError(s.to_string()))?;
        Ok(MetadataExpire::After(Duration::from_secs(
            value * multiplier,
        )))
    }
}

impl fmt::Display for MetadataExpire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataExpire::Never => f.write_str("never"),
            MetadataExpire::After(d) => write!(f, "{}", d.as_secs()),
        }
    }
}

/// A parsed repository definition.
///
/// String attributes have `$releasever`/`$basearch` expanded once at
/// registry finalize time; consumers never see the raw variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Unique, case-sensitive id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the repo participates in refresh and resolve.
    pub enabled: bool,
    /// Base URLs, tried in order.
    pub base_urls: Vec<String>,
    /// Metalink URL; takes precedence over `mirrorlist` for cache naming.
    pub metalink: Option<String>,
    /// Mirrorlist URL.
    pub mirrorlist: Option<String>,
    /// GPG key URLs used to seed the verification keyring.
    pub gpg_keys: Vec<String>,
    /// Verify package signatures.
    pub gpgcheck: bool,
    /// Verify TLS peer certificates.
    pub sslverify: bool,
    /// On refresh failure, disable the repo for the session instead of
    /// failing the operation.
    pub skip_if_unavailable: bool,
    /// Do not fetch `filelists` metadata.
    pub skip_md_filelists: bool,
    /// Do not fetch `updateinfo` metadata.
    pub skip_md_updateinfo: bool,
    /// Do not fetch `other` metadata.
    pub skip_md_other: bool,
    /// Refresh scheduling order; lower goes first.
    pub priority: u32,
    /// Download retry count.
    pub retries: u32,
    /// Transfer timeout in seconds; `0` uses the transport default.
    pub timeout: u64,
    /// Abort transfers slower than this many bytes/sec.
    pub minrate: u64,
    /// Throttle transfers to this many bytes/sec; `0` is unlimited.
    pub throttle: u64,
    /// Metadata freshness window.
    pub metadata_expire: MetadataExpire,
    /// HTTP basic auth user.
    pub username: Option<String>,
    /// HTTP basic auth password.
    pub password: Option<String>,
    /// Path to an SSL CA certificate bundle.
    pub ssl_ca_cert: Option<String>,
    /// Path to an SSL client certificate.
    pub ssl_client_cert: Option<String>,
    /// Path to an SSL client key.
    pub ssl_client_key: Option<String>,
    /// Deterministic cache directory name, `<id>-<hash>`; filled in by the
    /// registry at finalize time. Synthetic repos leave it empty and never
    /// touch the cache.
    pub cache_name: String,
}

impl RepoConfig {
    /// A descriptor with tdnf's documented defaults, enabled off.
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: false,
            base_urls: Vec::new(),
            metalink: None,
            mirrorlist: None,
            gpg_keys: Vec::new(),
            gpgcheck: true,
            sslverify: true,
            skip_if_unavailable: false,
            skip_md_filelists: false,
            skip_md_updateinfo: false,
            skip_md_other: false,
            priority: 50,
            retries: 10,
            timeout: 0,
            minrate: 0,
            throttle: 0,
            metadata_expire: MetadataExpire::DEFAULT,
            username: None,
            password: None,
            ssl_ca_cert: None,
            ssl_client_cert: None,
            ssl_client_key: None,
            cache_name: String::new(),
        }
    }

    /// The synthetic command-line repo.
    pub fn cmdline() -> Self {
        let mut repo = Self::with_id(CMDLINE_REPO_ID);
        repo.name = "@cmdline".to_string();
        repo.enabled = true;
        repo.gpgcheck = false;
        repo
    }

    /// Whether this is one of the synthetic repos that never refresh and
    /// never own a cache directory.
    pub fn is_synthetic(&self) -> bool {
        self.id == CMDLINE_REPO_ID || self.id == SYSTEM_REPO_ID
    }

    /// The remote URL that keys the cache directory name: metalink, else
    /// mirrorlist, else the first base URL.
    pub fn primary_url(&self) -> Option<&str> {
        self.metalink
            .as_deref()
            .or(self.mirrorlist.as_deref())
            .or_else(|| self.base_urls.first().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("never", MetadataExpire::Never)]
    #[case("NEVER", MetadataExpire::Never)]
    #[case("0", MetadataExpire::After(Duration::ZERO))]
    #[case("86400", MetadataExpire::After(Duration::from_secs(86400)))]
    #[case("90s", MetadataExpire::After(Duration::from_secs(90)))]
    #[case("5m", MetadataExpire::After(Duration::from_secs(300)))]
    #[case("2h", MetadataExpire::After(Duration::from_secs(7200)))]
    #[case("1d", MetadataExpire::After(Duration::from_secs(86400)))]
    fn expire_parse(#[case] input: &str, #[case] expected: MetadataExpire) {
        assert_eq!(input.parse::<MetadataExpire>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("x")]
    #[case("-5")]
    #[case("5w")]
    #[case("m5")]
    fn expire_parse_rejects(#[case] input: &str) {
        assert!(input.parse::<MetadataExpire>().is_err());
    }

    #[test]
    fn primary_url_preference() {
        let mut repo = RepoConfig::with_id("r1");
        repo.base_urls = vec!["http://a/".into()];
        assert_eq!(repo.primary_url(), Some("http://a/"));
        repo.mirrorlist = Some("http://m/".into());
        assert_eq!(repo.primary_url(), Some("http://m/"));
        repo.metalink = Some("http://ml/".into());
        assert_eq!(repo.primary_url(), Some("http://ml/"));
    }

    #[test]
    fn defaults_match_documentation() {
        let repo = RepoConfig::with_id("r");
        assert!(repo.gpgcheck);
        assert!(repo.sslverify);
        assert_eq!(repo.retries, 10);
        assert_eq!(repo.priority, 50);
        assert_eq!(repo.metadata_expire.as_secs(), 172_800);
    }
}
