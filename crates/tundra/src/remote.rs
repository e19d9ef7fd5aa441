//! Per-repo remote access: fetcher wiring and base-URL resolution.

use std::path::Path;

use tracing::{debug, warn};

use tundra_fetch::{FetchError, FetchOptions, FetchProgress, Fetcher};
use tundra_types::{Config, RepoConfig};

use crate::error::{Error, Result};

/// Build the transfer options for one repo from its descriptor and the
/// main configuration.
pub fn fetch_options(repo: &RepoConfig, config: &Config) -> FetchOptions {
    FetchOptions {
        timeout: repo.timeout,
        minrate: repo.minrate,
        throttle: repo.throttle,
        sslverify: repo.sslverify,
        ssl_ca_cert: repo.ssl_ca_cert.as_ref().map(Into::into),
        ssl_client_cert: repo.ssl_client_cert.as_ref().map(Into::into),
        ssl_client_key: repo.ssl_client_key.as_ref().map(Into::into),
        username: repo.username.clone(),
        password: repo.password.clone(),
        proxy: config.proxy.clone(),
        proxy_username: config.proxy_username.clone(),
        proxy_password: config.proxy_password.clone(),
        retries: repo.retries.max(1),
        ..FetchOptions::default()
    }
}

/// A repo's resolved download endpoints plus the fetcher to use them.
pub struct RepoRemote {
    /// Owning repo id, for diagnostics.
    pub repo_id: String,
    /// Base URLs in preference order. The metalink plugin may substitute
    /// these before the repomd fetch.
    pub base_urls: Vec<String>,
    pub(crate) fetcher: Fetcher,
}

impl RepoRemote {
    /// Wire up a repo. A mirrorlist is resolved immediately; a metalink
    /// is left to the plugin hook around the repomd fetch.
    pub fn new(repo: &RepoConfig, config: &Config) -> Result<Self> {
        let fetcher = Fetcher::new(fetch_options(repo, config))?;
        let mut base_urls = repo.base_urls.clone();
        if base_urls.is_empty() {
            if let Some(mirrorlist) = &repo.mirrorlist {
                base_urls = resolve_mirrorlist(&fetcher, mirrorlist)?;
            }
        }
        Ok(Self {
            repo_id: repo.id.clone(),
            base_urls,
            fetcher,
        })
    }

    /// The underlying fetcher.
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Download a repo-relative location to `dest`, trying base URLs in
    /// order. Absolute paths and full URLs bypass the base list.
    pub fn download_location(
        &self,
        location: &str,
        dest: &Path,
        progress: &dyn FetchProgress,
    ) -> Result<()> {
        if location.starts_with('/') || location.contains("://") {
            return Ok(self.fetcher.fetch_url(location, dest, progress)?);
        }
        if self.base_urls.is_empty() {
            return Err(Error::BaseUrlMissing(self.repo_id.clone()));
        }
        let mut last_err: Option<FetchError> = None;
        for base in &self.base_urls {
            let url = join_url(base, location);
            match self.fetcher.fetch_url(&url, dest, progress) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(repo = %self.repo_id, url = %url, error = %err, "base url failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .map(Error::Fetch)
            .unwrap_or_else(|| Error::BaseUrlMissing(self.repo_id.clone())))
    }

    /// The full URL a location resolves to against the first base URL,
    /// for `reposync --urls` style output.
    pub fn location_url(&self, location: &str) -> Option<String> {
        if location.starts_with('/') || location.contains("://") {
            return Some(location.to_string());
        }
        self.base_urls
            .first()
            .map(|base| join_url(base, location))
    }
}

/// Fetch and parse a mirrorlist: one URL per line, comments allowed.
fn resolve_mirrorlist(fetcher: &Fetcher, url: &str) -> Result<Vec<String>> {
    debug!(url = %url, "resolving mirrorlist");
    let body = fetcher.fetch_string(url)?;
    let urls: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    Ok(urls)
}

/// Join a base URL and a relative location with exactly one slash.
pub fn join_url(base: &str, location: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        location.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_fetch::SilentProgress;

    #[test]
    fn join_urls() {
        assert_eq!(join_url("http://h/repo/", "/a/b.rpm"), "http://h/repo/a/b.rpm");
        assert_eq!(join_url("http://h/repo", "a/b.rpm"), "http://h/repo/a/b.rpm");
    }

    #[test]
    fn fetch_options_carry_repo_knobs() {
        let mut repo = RepoConfig::with_id("r1");
        repo.timeout = 30;
        repo.retries = 3;
        repo.sslverify = false;
        repo.username = Some("u".into());
        let mut config = Config::default();
        config.proxy = Some("http://proxy:3128".into());

        let options = fetch_options(&repo, &config);
        assert_eq!(options.timeout, 30);
        assert_eq!(options.retries, 3);
        assert!(!options.sslverify);
        assert_eq!(options.username.as_deref(), Some("u"));
        assert_eq!(options.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn mirrorlist_resolution_from_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("mirrors");
        std::fs::write(&list, "# best\nfile:///srv/repo\n\nfile:///backup/repo\n").unwrap();

        let mut repo = RepoConfig::with_id("r1");
        repo.mirrorlist = Some(format!("file://{}", list.display()));
        let remote = RepoRemote::new(&repo, &Config::default()).unwrap();
        assert_eq!(
            remote.base_urls,
            vec!["file:///srv/repo".to_string(), "file:///backup/repo".to_string()]
        );
    }

    #[test]
    fn download_tries_base_urls_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        std::fs::create_dir_all(good.join("repodata")).unwrap();
        std::fs::write(good.join("repodata/repomd.xml"), "<repomd/>").unwrap();

        let mut repo = RepoConfig::with_id("r1");
        repo.base_urls = vec![
            format!("file://{}/missing", dir.path().display()),
            format!("file://{}", good.display()),
        ];
        // local-file errors are fatal per transfer but the next base url
        // is still tried
        let remote = RepoRemote::new(&repo, &Config::default()).unwrap();
        let dest = dir.path().join("out.xml");
        remote
            .download_location("repodata/repomd.xml", &dest, &SilentProgress)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "<repomd/>");
    }

    #[test]
    fn no_base_urls_is_an_error() {
        let repo = RepoConfig::with_id("@cmdline");
        let remote = RepoRemote::new(&repo, &Config::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = remote
            .download_location("pkgs/foo.rpm", &dir.path().join("foo.rpm"), &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, Error::BaseUrlMissing(_)));
    }
}
