#![deny(missing_docs)]

//! Blocking download engine.
//!
//! All repository traffic goes through [`Fetcher`]: metadata, packages and
//! GPG keys. Files are written to a `<target>.tmp` sibling and renamed
//! into place on completion, so a failed transfer never leaves a partial
//! file under the final name. Transient network failures are retried up
//! to a caller-supplied budget; failure classes that retrying cannot fix
//! (bad URL, unsupported scheme, local I/O, TLS trust problems) abort
//! immediately.

mod error;
mod options;

pub use error::FetchError;
pub use options::FetchOptions;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

/// Observer for transfer progress.
pub trait FetchProgress {
    /// Called as bytes arrive. `total` is the declared content length
    /// when the server provides one.
    fn on_progress(&self, url: &str, downloaded: u64, total: Option<u64>);

    /// Called once when a transfer finishes successfully.
    fn on_done(&self, url: &str, downloaded: u64);
}

/// A no-op progress sink.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_progress(&self, _url: &str, _downloaded: u64, _total: Option<u64>) {}
    fn on_done(&self, _url: &str, _downloaded: u64) {}
}

/// The download engine. One instance per repo: credentials, TLS and
/// proxy settings are fixed at construction.
pub struct Fetcher {
    client: Client,
    options: FetchOptions,
}

const COPY_BUF_SIZE: usize = 64 * 1024;

impl Fetcher {
    /// Build a fetcher from per-repo options.
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(options.user_agent.clone())
            .connect_timeout(Duration::from_secs(10));
        if options.timeout > 0 {
            builder = builder.timeout(Duration::from_secs(options.timeout));
        } else {
            // Blocking reqwest defaults to 30s total; repo transfers can
            // legitimately take longer.
            builder = builder.timeout(None);
        }
        if !options.sslverify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(ca) = &options.ssl_ca_cert {
            let pem = fs_err::read(ca).map_err(FetchError::Io)?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| FetchError::SslSettings(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        if let (Some(cert), Some(key)) = (&options.ssl_client_cert, &options.ssl_client_key) {
            let mut pem = fs_err::read(cert).map_err(FetchError::Io)?;
            let mut key = fs_err::read(key).map_err(FetchError::Io)?;
            pem.append(&mut key);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| FetchError::SslSettings(e.to_string()))?;
            builder = builder.identity(identity);
        }
        if let Some(proxy) = &options.proxy {
            let mut proxy = reqwest::Proxy::all(proxy)
                .map_err(|_| FetchError::ProxySettings(options.proxy.clone().unwrap_or_default()))?;
            if let (Some(user), Some(pass)) =
                (&options.proxy_username, &options.proxy_password)
            {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::SslSettings(e.to_string()))?;
        Ok(Self { client, options })
    }

    /// Access the options this fetcher was built with.
    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Download `url` to `dest`, retrying transient failures. The
    /// destination directory must exist; the final file is created with
    /// mode 0644.
    pub fn fetch_url(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn FetchProgress,
    ) -> Result<(), FetchError> {
        if let Some(local) = local_source_path(url) {
            return self.copy_local(&local, dest);
        }

        let parsed = Url::parse(url).map_err(|_| FetchError::MalformedUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(FetchError::UnsupportedProtocol(other.to_string())),
        }

        let mut last_err = None;
        for attempt in 0..self.options.retries.max(1) {
            if attempt > 0 {
                debug!(url, attempt, "retrying download");
            }
            match self.fetch_once(&parsed, dest, progress) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(url, attempt, error = %err, "transfer failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| FetchError::MalformedUrl(url.to_string())))
    }

    /// Fetch a URL into memory. Used for mirrorlists and other small
    /// documents.
    pub fn fetch_string(&self, url: &str) -> Result<String, FetchError> {
        if let Some(local) = local_source_path(url) {
            return fs_err::read_to_string(&local).map_err(FetchError::Io);
        }
        let parsed = Url::parse(url).map_err(|_| FetchError::MalformedUrl(url.to_string()))?;
        let response = self
            .client
            .get(parsed)
            .basic_auth_opt(&self.options.username, &self.options.password)
            .send()
            .map_err(FetchError::from_reqwest)?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().map_err(FetchError::from_reqwest)
    }

    /// Issue a HEAD request and report whether the resource exists.
    pub fn probe(&self, url: &str) -> Result<bool, FetchError> {
        if let Some(local) = local_source_path(url) {
            return Ok(local.exists());
        }
        let parsed = Url::parse(url).map_err(|_| FetchError::MalformedUrl(url.to_string()))?;
        let response = self
            .client
            .head(parsed)
            .basic_auth_opt(&self.options.username, &self.options.password)
            .send()
            .map_err(FetchError::from_reqwest)?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }

    fn fetch_once(
        &self,
        url: &Url,
        dest: &Path,
        progress: &dyn FetchProgress,
    ) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url.clone())
            .basic_auth_opt(&self.options.username, &self.options.password)
            .send()
            .map_err(FetchError::from_reqwest)?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        let total = response.content_length();

        // Every attempt starts over with a fresh temporary file.
        let tmp = tmp_path(dest);
        let mut file = fs_err::File::create(&tmp).map_err(FetchError::Io)?;
        let result = self.copy_body(url.as_str(), response, &mut file, total, progress);
        drop(file);
        match result {
            Ok(written) => {
                persist(&tmp, dest)?;
                progress.on_done(url.as_str(), written);
                Ok(())
            }
            Err(err) => {
                let _ = fs_err::remove_file(&tmp);
                Err(err)
            }
        }
    }

    fn copy_body(
        &self,
        url: &str,
        mut body: impl Read,
        file: &mut fs_err::File,
        total: Option<u64>,
        progress: &dyn FetchProgress,
    ) -> Result<u64, FetchError> {
        let started = Instant::now();
        let mut buf = [0u8; COPY_BUF_SIZE];
        let mut written: u64 = 0;
        loop {
            let n = body.read(&mut buf).map_err(FetchError::transfer_io)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).map_err(FetchError::Io)?;
            written += n as u64;
            progress.on_progress(url, written, total);
            self.enforce_rates(started, written)?;
        }
        file.flush().map_err(FetchError::Io)?;
        Ok(written)
    }

    /// Enforce `throttle` (sleep when ahead of the cap) and `minrate`
    /// (abort when persistently below the floor).
    fn enforce_rates(&self, started: Instant, written: u64) -> Result<(), FetchError> {
        let elapsed = started.elapsed();
        if self.options.throttle > 0 {
            let budget = Duration::from_secs_f64(written as f64 / self.options.throttle as f64);
            if budget > elapsed {
                std::thread::sleep(budget - elapsed);
            }
        }
        if self.options.minrate > 0 && elapsed > Duration::from_secs(10) {
            let rate = written as f64 / elapsed.as_secs_f64();
            if rate < self.options.minrate as f64 {
                return Err(FetchError::TooSlow {
                    rate: rate as u64,
                    minrate: self.options.minrate,
                });
            }
        }
        Ok(())
    }

    fn copy_local(&self, source: &Path, dest: &Path) -> Result<(), FetchError> {
        if source == dest {
            return Ok(());
        }
        let tmp = tmp_path(dest);
        fs_err::copy(source, &tmp).map_err(FetchError::Io)?;
        persist(&tmp, dest)
    }
}

/// Extension trait: reqwest's `basic_auth` takes ownership-style args, so
/// wrap the optional-credentials dance once.
trait BasicAuthOpt {
    fn basic_auth_opt(self, user: &Option<String>, pass: &Option<String>) -> Self;
}

impl BasicAuthOpt for reqwest::blocking::RequestBuilder {
    fn basic_auth_opt(self, user: &Option<String>, pass: &Option<String>) -> Self {
        match user {
            Some(user) => self.basic_auth(user, pass.as_deref()),
            None => self,
        }
    }
}

/// Map `file://` URLs and plain absolute paths onto the local filesystem.
fn local_source_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.starts_with('/') {
        return Some(PathBuf::from(url));
    }
    None
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Rename the staging file into place and fix the mode to 0644.
fn persist(tmp: &Path, dest: &Path) -> Result<(), FetchError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs_err::set_permissions(tmp, std::fs::Permissions::from_mode(0o644))
            .map_err(FetchError::Io)?;
    }
    fs_err::rename(tmp, dest).map_err(FetchError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchOptions::default()).unwrap()
    }

    #[test]
    fn file_url_copies_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.xml");
        std::fs::write(&source, "<repomd/>").unwrap();
        let dest = dir.path().join("repomd.xml");

        let url = format!("file://{}", source.display());
        fetcher().fetch_url(&url, &dest, &SilentProgress).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "<repomd/>");
        // No staging file left behind.
        assert!(!dir.path().join("repomd.xml.tmp").exists());
    }

    #[test]
    fn missing_local_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        let err = fetcher()
            .fetch_url("file:///does/not/exist", &dest, &SilentProgress)
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(!dest.exists());
    }

    #[test]
    fn unsupported_scheme_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher()
            .fetch_url("ftp://host/file", &dir.path().join("out"), &SilentProgress)
            .unwrap_err();
        assert_matches!(err, FetchError::UnsupportedProtocol(_));
        assert!(err.is_fatal());
    }

    #[test]
    fn malformed_url_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher()
            .fetch_url("http://[bad", &dir.path().join("out"), &SilentProgress)
            .unwrap_err();
        assert_matches!(err, FetchError::MalformedUrl(_));
        assert!(err.is_fatal());
    }

    #[test]
    fn fetch_string_from_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mirrorlist");
        std::fs::write(&source, "http://a/\nhttp://b/\n").unwrap();
        let body = fetcher()
            .fetch_string(&format!("file://{}", source.display()))
            .unwrap();
        assert_eq!(body.lines().count(), 2);
    }
}
