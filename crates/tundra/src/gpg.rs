//! GPG key management and package signature verification.
//!
//! Keys are declared per repo as `gpgkey=` URLs. Local (`file://`) keys
//! are used in place; remote keys are downloaded into the repo cache's
//! `keys/` directory under a path derived from the URL, with a
//! containment check so a hostile URL cannot write outside that
//! directory. Before a downloaded key is imported into the rpm keyring
//! the user is asked to confirm.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use url::Url;

use tundra_fetch::SilentProgress;
use tundra_types::RepoConfig;

use crate::cache::{is_contained, RepoCache};
use crate::error::{Error, Result};
use crate::output::Confirm;
use crate::remote::RepoRemote;
use crate::rpm::RpmBackend;

/// A repo's resolved signing keys: local paths, downloaded and imported
/// as needed.
#[derive(Debug, Default)]
pub struct Keyring {
    key_paths: Vec<PathBuf>,
}

impl Keyring {
    /// Whether any key is available.
    pub fn is_empty(&self) -> bool {
        self.key_paths.is_empty()
    }

    /// The key files backing this keyring.
    pub fn paths(&self) -> &[PathBuf] {
        &self.key_paths
    }

    /// Materialize the keyring of a repo: resolve every `gpgkey` URL,
    /// downloading missing remote keys, then offer them to the rpm
    /// keyring (with confirmation).
    pub fn for_repo(
        repo: &RepoConfig,
        cache: &RepoCache,
        remote: &RepoRemote,
        backend: &dyn RpmBackend,
        confirm: &dyn Confirm,
    ) -> Result<Self> {
        if repo.gpg_keys.is_empty() {
            return Err(Error::NoGpgKeyConfEntry);
        }
        let mut key_paths = Vec::new();
        for key_url in &repo.gpg_keys {
            let path = resolve_key(key_url, cache, remote)?;
            key_paths.push(path);
        }
        for path in &key_paths {
            let prompt = format!(
                "Importing key from {}. Is this ok [y/N]: ",
                path.display()
            );
            if confirm.confirm(&prompt) {
                backend.import_key(path)?;
            } else {
                info!(key = %path.display(), "key import declined");
            }
        }
        Ok(Self { key_paths })
    }

    /// Verify the embedded signature of an rpm file against this
    /// keyring. The package is accepted when at least one key verifies
    /// it.
    pub fn verify_package(&self, rpm_path: &Path) -> Result<()> {
        let package = ::rpm::Package::open(rpm_path)
            .map_err(|_| Error::RpmRead(rpm_path.display().to_string()))?;

        let mut any_key_loaded = false;
        for key_path in &self.key_paths {
            let bytes = fs_err::read(key_path)?;
            let verifier = match ::rpm::signature::pgp::Verifier::load_from_asc_bytes(&bytes) {
                Ok(verifier) => verifier,
                Err(err) => {
                    warn!(key = %key_path.display(), error = %err, "unusable gpg key");
                    continue;
                }
            };
            any_key_loaded = true;
            match package.verify_signature(verifier) {
                Ok(()) => {
                    debug!(rpm = %rpm_path.display(), key = %key_path.display(), "signature ok");
                    return Ok(());
                }
                Err(err) => {
                    debug!(rpm = %rpm_path.display(), key = %key_path.display(), error = %err,
                           "signature check failed");
                }
            }
        }
        if !any_key_loaded {
            return Err(Error::InvalidPubkey(
                self.key_paths
                    .first()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ));
        }
        Err(Error::NoMatchingKey(rpm_path.display().to_string()))
    }
}

/// Turn one `gpgkey` URL into a local path, downloading if necessary.
fn resolve_key(key_url: &str, cache: &RepoCache, remote: &RepoRemote) -> Result<PathBuf> {
    if let Some(path) = key_url.strip_prefix("file://") {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(Error::KeyUrlInvalid(key_url.to_string()));
        }
        return Ok(path);
    }
    let parsed =
        Url::parse(key_url).map_err(|_| Error::KeyUrlInvalid(key_url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(Error::KeyUrlInvalid(key_url.to_string())),
    }

    let keys_dir = cache.keys_dir();
    let relative = parsed.path().trim_start_matches('/');
    if relative.is_empty() {
        return Err(Error::KeyUrlInvalid(key_url.to_string()));
    }
    let dest = keys_dir.join(relative);
    if !is_contained(&keys_dir, &dest) {
        return Err(Error::KeyUrlInvalid(key_url.to_string()));
    }
    if !dest.exists() {
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        debug!(url = %key_url, dest = %dest.display(), "downloading gpg key");
        remote
            .fetcher()
            .fetch_url(key_url, &dest, &SilentProgress)?;
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::repo_cache_name;
    use crate::output::AlwaysAnswer;
    use crate::rpm::mock::FakeRpm;
    use assert_matches::assert_matches;
    use tundra_types::Config;

    fn fixture(dir: &Path, key_urls: Vec<String>) -> (RepoConfig, RepoCache, RepoRemote) {
        let mut repo = RepoConfig::with_id("r1");
        repo.base_urls = vec![format!("file://{}", dir.display())];
        repo.cache_name = repo_cache_name("r1", &repo.base_urls[0]);
        repo.gpg_keys = key_urls;
        let cache = RepoCache::new(&dir.join("cache"), &repo);
        cache.ensure_dirs().unwrap();
        let remote = RepoRemote::new(&repo, &Config::default()).unwrap();
        (repo, cache, remote)
    }

    #[test]
    fn no_keys_configured_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, cache, remote) = fixture(dir.path(), vec![]);
        let backend = FakeRpm::default();
        let err = Keyring::for_repo(&repo, &cache, &remote, &backend, &AlwaysAnswer(true))
            .unwrap_err();
        assert_matches!(err, Error::NoGpgKeyConfEntry);
    }

    #[test]
    fn local_key_is_used_in_place_and_imported() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("RPM-GPG-KEY-test");
        std::fs::write(&key, "not really a key").unwrap();
        let (repo, cache, remote) =
            fixture(dir.path(), vec![format!("file://{}", key.display())]);

        let backend = FakeRpm::default();
        let keyring =
            Keyring::for_repo(&repo, &cache, &remote, &backend, &AlwaysAnswer(true)).unwrap();
        assert_eq!(keyring.paths(), &[key.clone()]);
        assert_eq!(backend.imported_keys.borrow().as_slice(), &[key]);
    }

    #[test]
    fn declined_import_keeps_key_out_of_rpm() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("key.asc");
        std::fs::write(&key, "key").unwrap();
        let (repo, cache, remote) =
            fixture(dir.path(), vec![format!("file://{}", key.display())]);

        let backend = FakeRpm::default();
        let keyring =
            Keyring::for_repo(&repo, &cache, &remote, &backend, &AlwaysAnswer(false)).unwrap();
        assert!(!keyring.is_empty());
        assert!(backend.imported_keys.borrow().is_empty());
    }

    #[test]
    fn missing_local_key_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, cache, remote) = fixture(
            dir.path(),
            vec!["file:///does/not/exist.asc".to_string()],
        );
        let backend = FakeRpm::default();
        let err = Keyring::for_repo(&repo, &cache, &remote, &backend, &AlwaysAnswer(true))
            .unwrap_err();
        assert_matches!(err, Error::KeyUrlInvalid(_));
    }

    #[test]
    fn unsupported_key_scheme_and_empty_path_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (_, cache, remote) = fixture(dir.path(), vec![]);
        let err = resolve_key("ftp://host/key.asc", &cache, &remote).unwrap_err();
        assert_matches!(err, Error::KeyUrlInvalid(_));
        let err = resolve_key("https://host", &cache, &remote).unwrap_err();
        assert_matches!(err, Error::KeyUrlInvalid(_));
    }

    #[test]
    fn garbage_key_fails_verification_as_invalid_pubkey() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("bad.asc");
        std::fs::write(&key, "definitely not pgp").unwrap();
        let rpm = dir.path().join("pkg.rpm");
        std::fs::write(&rpm, "not an rpm either").unwrap();

        let keyring = Keyring {
            key_paths: vec![key],
        };
        // the rpm itself fails to open first
        let err = keyring.verify_package(&rpm).unwrap_err();
        assert_matches!(err, Error::RpmRead(_));
    }
}
