//! Deterministic on-disk layout of the per-repo cache.
//!
//! Everything a repo owns lives under `<cachedir>/<cache-name>/`:
//!
//! ```text
//! <cachedir>/<id>-<hash>/
//!   repodata/     downloaded xml metadata
//!   rpms/         downloaded packages, source subtree preserved
//!   solvcache/    serialized solver input keyed by the repomd cookie
//!   keys/         downloaded gpg keys
//!   tmp/          staging area for in-flight metadata
//!   lastrefresh   zero-byte marker, mtime of the last successful refresh
//! ```
//!
//! The cache name mixes the repo id with a digest of its primary remote
//! URL so the same id pointed at different remotes maps to different
//! directories.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use tundra_digest::{compute_bytes_digest, Sha256};
use tundra_types::{MetadataExpire, RepoConfig};

use crate::error::Result;

/// Number of hex digits of the URL digest kept in the cache name.
const CACHE_NAME_HASH_LEN: usize = 16;

/// Compute `<id>-<hash>` for a repo from its id and primary remote URL.
pub fn repo_cache_name(id: &str, url: &str) -> String {
    let digest = compute_bytes_digest::<Sha256>(url.as_bytes());
    let hex = format!("{digest:x}");
    format!("{id}-{}", &hex[..CACHE_NAME_HASH_LEN])
}

/// Whether `candidate`, resolved lexically, stays under `root`. Used to
/// keep hostile `location` attributes from escaping the cache.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    let mut depth: i64 = 0;
    if !candidate.starts_with(root) {
        return false;
    }
    let Ok(relative) = candidate.strip_prefix(root) else {
        return false;
    };
    for component in relative.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// The cache directory of one repo.
#[derive(Debug, Clone)]
pub struct RepoCache {
    root: PathBuf,
}

impl RepoCache {
    /// The cache of `repo` under `cachedir`. Synthetic repos have no
    /// cache name and fall back to their id; callers never refresh them.
    pub fn new(cachedir: &Path, repo: &RepoConfig) -> Self {
        let name = if repo.cache_name.is_empty() {
            &repo.id
        } else {
            &repo.cache_name
        };
        Self {
            root: cachedir.join(name),
        }
    }

    /// The cache root for this repo.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `repodata/` directory.
    pub fn repodata_dir(&self) -> PathBuf {
        self.root.join("repodata")
    }

    /// `rpms/` directory.
    pub fn rpms_dir(&self) -> PathBuf {
        self.root.join("rpms")
    }

    /// `solvcache/` directory.
    pub fn solvcache_dir(&self) -> PathBuf {
        self.root.join("solvcache")
    }

    /// `keys/` directory.
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    /// `tmp/` staging directory.
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// The live `repomd.xml`.
    pub fn repomd_path(&self) -> PathBuf {
        self.repodata_dir().join("repomd.xml")
    }

    /// The zero-byte refresh marker.
    pub fn lastrefresh_path(&self) -> PathBuf {
        self.root.join("lastrefresh")
    }

    /// Create the directory tree.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.repodata_dir(),
            self.rpms_dir(),
            self.solvcache_dir(),
            self.keys_dir(),
            self.tmp_dir(),
        ] {
            fs_err::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Update the refresh marker mtime to now.
    pub fn touch_lastrefresh(&self) -> Result<()> {
        fs_err::create_dir_all(&self.root)?;
        let path = self.lastrefresh_path();
        if path.exists() {
            // Recreating the empty file bumps the mtime.
            fs_err::remove_file(&path)?;
        }
        fs_err::File::create(&path)?;
        Ok(())
    }

    /// When the last successful refresh happened, if ever.
    pub fn last_refresh_time(&self) -> Option<SystemTime> {
        fs_err::metadata(self.lastrefresh_path())
            .and_then(|m| m.modified())
            .ok()
    }

    /// The age-based staleness rule: stale iff the expiry is finite and
    /// the marker is older than it (or missing entirely).
    pub fn is_stale(&self, expire: MetadataExpire) -> bool {
        let MetadataExpire::After(window) = expire else {
            return false;
        };
        let Some(refreshed) = self.last_refresh_time() else {
            return true;
        };
        let age = SystemTime::now()
            .duration_since(refreshed)
            .unwrap_or(Duration::ZERO);
        age > window
    }

    /// Remove `repodata/`.
    pub fn remove_metadata(&self) -> Result<()> {
        remove_dir_if_present(&self.repodata_dir())
    }

    /// Remove `solvcache/`.
    pub fn remove_solvcache(&self) -> Result<()> {
        remove_dir_if_present(&self.solvcache_dir())
    }

    /// Remove `rpms/`.
    pub fn remove_rpms(&self) -> Result<()> {
        remove_dir_if_present(&self.rpms_dir())
    }

    /// Remove `keys/`.
    pub fn remove_keys(&self) -> Result<()> {
        remove_dir_if_present(&self.keys_dir())
    }

    /// Remove the staging directory.
    pub fn remove_tmp(&self) -> Result<()> {
        remove_dir_if_present(&self.tmp_dir())
    }

    /// Remove the refresh marker.
    pub fn remove_lastrefresh_marker(&self) -> Result<()> {
        let path = self.lastrefresh_path();
        if path.exists() {
            fs_err::remove_file(&path)?;
        }
        Ok(())
    }

    /// Remove the whole cache directory after the scoped removals. A
    /// directory that still has content (e.g. the user kept `rpms/`)
    /// is reported and left in place rather than failing the clean.
    pub fn remove_cache_dir(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        match std::fs::remove_dir(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::ENOTEMPTY) => {
                warn!(dir = %self.root.display(), "cache directory not empty, keeping");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!(dir = %dir.display(), "removing");
        fs_err::remove_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn repo(id: &str, url: &str) -> RepoConfig {
        let mut repo = RepoConfig::with_id(id);
        repo.base_urls = vec![url.to_string()];
        repo.cache_name = repo_cache_name(id, url);
        repo
    }

    #[test]
    fn cache_name_is_stable_and_url_sensitive() {
        let a = repo_cache_name("photon", "https://mirror.one/photon/");
        let b = repo_cache_name("photon", "https://mirror.one/photon/");
        let c = repo_cache_name("photon", "https://mirror.two/photon/");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("photon-"));
        assert_eq!(a.len(), "photon-".len() + CACHE_NAME_HASH_LEN);
    }

    #[test]
    fn layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepoCache::new(dir.path(), &repo("r1", "http://h/"));
        assert!(cache.root().starts_with(dir.path()));
        assert!(cache.repomd_path().ends_with("repodata/repomd.xml"));
        cache.ensure_dirs().unwrap();
        assert!(cache.rpms_dir().is_dir());
        assert!(cache.keys_dir().is_dir());
    }

    #[test]
    fn staleness() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepoCache::new(dir.path(), &repo("r1", "http://h/"));
        // no marker yet: always stale unless expiry is never
        assert!(cache.is_stale(MetadataExpire::After(Duration::from_secs(10))));
        assert!(!cache.is_stale(MetadataExpire::Never));

        cache.touch_lastrefresh().unwrap();
        assert!(!cache.is_stale(MetadataExpire::After(Duration::from_secs(3600))));
        assert!(cache.is_stale(MetadataExpire::After(Duration::ZERO)));
        assert!(!cache.is_stale(MetadataExpire::Never));
    }

    #[test]
    fn scoped_removals() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepoCache::new(dir.path(), &repo("r1", "http://h/"));
        cache.ensure_dirs().unwrap();
        cache.touch_lastrefresh().unwrap();
        std::fs::write(cache.repodata_dir().join("repomd.xml"), "x").unwrap();
        std::fs::write(cache.rpms_dir().join("a.rpm"), "x").unwrap();

        cache.remove_metadata().unwrap();
        assert!(!cache.repodata_dir().exists());
        assert!(cache.rpms_dir().exists());

        cache.remove_lastrefresh_marker().unwrap();
        assert!(!cache.lastrefresh_path().exists());

        // rpms/ still present: the cache dir survives a remove attempt
        cache.remove_solvcache().unwrap();
        cache.remove_keys().unwrap();
        cache.remove_tmp().unwrap();
        cache.remove_cache_dir().unwrap();
        assert!(cache.root().exists());

        cache.remove_rpms().unwrap();
        cache.remove_cache_dir().unwrap();
        assert!(!cache.root().exists());
    }

    #[rstest]
    #[case("rpms/x86_64/foo.rpm", true)]
    #[case("repodata/repomd.xml", true)]
    #[case("rpms/../rpms/foo.rpm", true)]
    #[case("../outside", false)]
    #[case("rpms/../../outside", false)]
    fn containment(#[case] relative: &str, #[case] expected: bool) {
        let root = Path::new("/var/cache/tdnf/r1");
        let candidate = root.join(relative);
        assert_eq!(is_contained(root, &candidate), expected);
    }
}
