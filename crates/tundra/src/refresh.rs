//! The metadata pipeline: from "absent" to "present and fresh".
//!
//! A repo's metadata moves through absent → downloading → present →
//! stale. `repomd.xml` is always fetched first, into the cache's `tmp/`
//! staging directory, so a failed transfer never corrupts the live
//! `repodata/`. When a refreshed repomd carries the same cookie as the
//! cached one, the dependent parts are left untouched; otherwise the
//! metadata, solver cache and refresh marker (and, unless `keepcache`,
//! the packages) are purged before the new index moves into place.
//! Referenced parts download to their final names and are skipped when
//! already present, so a repeated refresh resumes after a partial
//! failure.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use tundra_digest::{compute_file_digest, Sha256};
use tundra_fetch::SilentProgress;
use tundra_repodata::{
    open_metadata_reader, Filelists, PartKind, PrimaryMetadata, Repomd, Updateinfo,
};
use tundra_types::RepoConfig;

use crate::cache::RepoCache;
use crate::error::{Error, Result};
use crate::plugin::{PluginBus, PluginEvent};
use crate::remote::RepoRemote;

/// Caller switches for a refresh round.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshFlags {
    /// Never touch the network; fail when inputs are missing.
    pub cache_only: bool,
    /// Treat metadata as expired regardless of age.
    pub force: bool,
    /// Keep downloaded packages when metadata changes.
    pub keepcache: bool,
}

/// The parsed metadata of one refreshed repo.
#[derive(Debug, Clone)]
pub struct RepoMetadata {
    /// Owning repo.
    pub repo_id: String,
    /// Cookie over the live `repomd.xml`.
    pub cookie: String,
    /// Mandatory primary part.
    pub primary: PrimaryMetadata,
    /// Optional filelists part.
    pub filelists: Option<Filelists>,
    /// Optional updateinfo part.
    pub updateinfo: Option<Updateinfo>,
}

/// Ensure the metadata of `repo` is present and fresh on disk.
pub fn refresh_repo(
    repo: &RepoConfig,
    cache: &RepoCache,
    remote: &mut RepoRemote,
    bus: &mut PluginBus,
    flags: RefreshFlags,
) -> Result<()> {
    let repomd_path = cache.repomd_path();
    let present = repomd_path.exists();

    if !present {
        if flags.cache_only {
            return Err(Error::CacheDisabled);
        }
        info!(repo = %repo.id, "downloading repository metadata");
        cache.ensure_dirs()?;
        let staged = fetch_repomd_staged(repo, cache, remote, bus)?;
        fs_err::rename(&staged, &repomd_path)?;
        fetch_parts(repo, cache, remote)?;
        cache.touch_lastrefresh()?;
        return Ok(());
    }

    let stale = flags.force || cache.is_stale(repo.metadata_expire);
    if !stale || flags.cache_only {
        if !flags.cache_only {
            // A previous partial failure may have left parts missing;
            // presence is checked per part, so this is cheap.
            fetch_parts(repo, cache, remote)?;
        }
        return Ok(());
    }

    debug!(repo = %repo.id, "metadata expired, revalidating");
    cache.ensure_dirs()?;
    let staged = fetch_repomd_staged(repo, cache, remote, bus)?;

    let old_cookie = repomd_cookie(&repomd_path)?;
    let new_cookie = repomd_cookie(&staged)?;
    if old_cookie == new_cookie {
        debug!(repo = %repo.id, "metadata unchanged upstream");
        fs_err::remove_file(&staged)?;
        // Resume any parts a previous partial refresh left missing.
        fetch_parts(repo, cache, remote)?;
        cache.touch_lastrefresh()?;
        return Ok(());
    }

    info!(repo = %repo.id, "metadata changed upstream, replacing cache");
    cache.remove_metadata()?;
    cache.remove_solvcache()?;
    cache.remove_lastrefresh_marker()?;
    if !flags.keepcache {
        cache.remove_rpms()?;
    }
    cache.ensure_dirs()?;
    fs_err::rename(&staged, &cache.repomd_path())?;
    fetch_parts(repo, cache, remote)?;
    cache.touch_lastrefresh()?;
    Ok(())
}

/// Fetch `repomd.xml` into the staging directory, with the plugin events
/// around it, and validate that it parses. Returns the staged path.
fn fetch_repomd_staged(
    repo: &RepoConfig,
    cache: &RepoCache,
    remote: &mut RepoRemote,
    bus: &mut PluginBus,
) -> Result<PathBuf> {
    let tmp_dir = cache.tmp_dir();
    bus.dispatch(&mut PluginEvent::RepoMdDownloadStart {
        repo_id: &repo.id,
        cache_dir: cache.root(),
        tmp_dir: &tmp_dir,
        fetcher: &remote.fetcher,
        base_urls: &mut remote.base_urls,
    })?;

    let staged = tmp_dir.join("repomd.xml");
    remote.download_location("repodata/repomd.xml", &staged, &SilentProgress)?;

    // Reject garbage before it can replace the live index.
    Repomd::from_reader(std::io::BufReader::new(fs_err::File::open(&staged)?))?;

    bus.dispatch(&mut PluginEvent::RepoMdDownloadEnd {
        repo_id: &repo.id,
        cache_dir: cache.root(),
        repomd_path: &staged,
    })?;
    Ok(staged)
}

/// Fetch the parts the live repomd references, honoring the per-type
/// skip flags. Present parts are not fetched again. Missing optional
/// parts are fine; a missing primary is not.
fn fetch_parts(repo: &RepoConfig, cache: &RepoCache, remote: &RepoRemote) -> Result<()> {
    let repomd = load_repomd(cache)?;
    for kind in PartKind::ALL {
        let skipped = match kind {
            PartKind::Primary => false,
            PartKind::Filelists => repo.skip_md_filelists,
            PartKind::Updateinfo => repo.skip_md_updateinfo,
            PartKind::Other => repo.skip_md_other,
        };
        if skipped {
            continue;
        }
        let part = match (repomd.part(kind), kind) {
            (Some(part), _) => part,
            (None, PartKind::Primary) => {
                return Err(Error::Repodata(
                    tundra_repodata::RepodataError::MissingPart(kind),
                ))
            }
            (None, _) => continue,
        };
        let dest = part_path(cache, &part.location);
        if dest.exists() {
            continue;
        }
        debug!(repo = %repo.id, part = %kind, "downloading metadata part");
        remote.download_location(&part.location, &dest, &SilentProgress)?;
    }
    Ok(())
}

/// Parse the live repomd of a repo.
pub fn load_repomd(cache: &RepoCache) -> Result<Repomd> {
    let path = cache.repomd_path();
    if !path.exists() {
        return Err(Error::CacheDisabled);
    }
    Ok(Repomd::from_reader(std::io::BufReader::new(
        fs_err::File::open(&path)?,
    ))?)
}

/// Load the parsed metadata of a refreshed repo, using the solver cache
/// (`solvcache/<cookie>.primary.json`) to skip the XML parse when the
/// cookie still matches.
pub fn load_repo_metadata(repo: &RepoConfig, cache: &RepoCache) -> Result<RepoMetadata> {
    let repomd = load_repomd(cache)?;
    let cookie = repomd_cookie(&cache.repomd_path())?;

    let primary = load_primary_cached(cache, &repomd, &cookie)?;

    let filelists = match repomd.part(PartKind::Filelists) {
        Some(part) if !repo.skip_md_filelists => {
            let path = part_path(cache, &part.location);
            if path.exists() {
                Some(Filelists::from_reader(open_metadata_reader(&path)?)?)
            } else {
                None
            }
        }
        _ => None,
    };
    let updateinfo = match repomd.part(PartKind::Updateinfo) {
        Some(part) if !repo.skip_md_updateinfo => {
            let path = part_path(cache, &part.location);
            if path.exists() {
                Some(Updateinfo::from_reader(open_metadata_reader(&path)?)?)
            } else {
                None
            }
        }
        _ => None,
    };

    Ok(RepoMetadata {
        repo_id: repo.id.clone(),
        cookie,
        primary,
        filelists,
        updateinfo,
    })
}

fn load_primary_cached(
    cache: &RepoCache,
    repomd: &Repomd,
    cookie: &str,
) -> Result<PrimaryMetadata> {
    let solv_path = cache.solvcache_dir().join(format!("{cookie}.primary.json"));
    if solv_path.exists() {
        match serde_json::from_reader(std::io::BufReader::new(fs_err::File::open(&solv_path)?)) {
            Ok(primary) => {
                debug!(cache = %solv_path.display(), "loaded primary from solver cache");
                return Ok(primary);
            }
            Err(err) => {
                debug!(error = %err, "solver cache unreadable, reparsing");
                let _ = fs_err::remove_file(&solv_path);
            }
        }
    }

    let part = repomd.required_part(PartKind::Primary)?;
    let path = part_path(cache, &part.location);
    if !path.exists() {
        return Err(Error::CacheDisabled);
    }
    let primary = PrimaryMetadata::from_reader(open_metadata_reader(&path)?)?;

    if let Some(parent) = solv_path.parent() {
        fs_err::create_dir_all(parent)?;
    }
    let file = fs_err::File::create(&solv_path)?;
    if let Err(err) = serde_json::to_writer(std::io::BufWriter::new(file), &primary) {
        debug!(error = %err, "could not write solver cache");
        let _ = fs_err::remove_file(&solv_path);
    }
    Ok(primary)
}

/// Metadata parts live under `repodata/` by their published basename.
fn part_path(cache: &RepoCache, location: &str) -> PathBuf {
    let basename = Path::new(location)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(location));
    cache.repodata_dir().join(basename)
}

/// The metadata cookie: a digest over the raw `repomd.xml` bytes.
pub fn repomd_cookie(path: &Path) -> Result<String> {
    let digest = compute_file_digest::<Sha256>(path)?;
    Ok(format!("{digest:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::repo_cache_name;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tundra_digest::hex_file_digest;
    use tundra_types::{ChecksumKind, Config, MetadataExpire};

    const PRIMARY_XML: &str = r#"<?xml version="1.0"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
  <package type="rpm">
    <name>foo</name><arch>x86_64</arch>
    <version epoch="0" ver="1.0" rel="1"/>
    <checksum type="sha256" pkgid="YES">aaaa0a03e31464d5f32524e761a2a5de0e4e0e92575cdc8309c83d20155e8bdd</checksum>
    <summary>foo</summary><description/>
    <location href="rpms/foo-1.0-1.x86_64.rpm"/>
    <size package="100" installed="200" archive="210"/>
    <format/>
  </package>
</metadata>"#;

    struct Upstream {
        dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Upstream {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("upstream");
            std::fs::create_dir_all(root.join("repodata")).unwrap();
            let upstream = Self { dir, root };
            upstream.publish(PRIMARY_XML, "rev-1");
            upstream
        }

        /// Write primary + repomd referencing it.
        fn publish(&self, primary: &str, revision: &str) {
            let primary_path = self.root.join("repodata/primary.xml");
            std::fs::write(&primary_path, primary).unwrap();
            let digest = hex_file_digest(ChecksumKind::Sha256, &primary_path).unwrap();
            let repomd = format!(
                r#"<repomd><revision>{revision}</revision>
                <data type="primary">
                  <checksum type="sha256">{digest}</checksum>
                  <location href="repodata/primary.xml"/>
                </data></repomd>"#
            );
            std::fs::write(self.root.join("repodata/repomd.xml"), repomd).unwrap();
        }

        fn repo(&self) -> RepoConfig {
            let mut repo = RepoConfig::with_id("r1");
            repo.base_urls = vec![format!("file://{}", self.root.display())];
            repo.cache_name = repo_cache_name("r1", &repo.base_urls[0]);
            repo.enabled = true;
            repo
        }

        fn cache(&self, repo: &RepoConfig) -> RepoCache {
            RepoCache::new(&self.dir.path().join("cache"), repo)
        }
    }

    fn refresh(repo: &RepoConfig, cache: &RepoCache, flags: RefreshFlags) -> Result<()> {
        let mut remote = RepoRemote::new(repo, &Config::default()).unwrap();
        let mut bus = PluginBus::new();
        refresh_repo(repo, cache, &mut remote, &mut bus, flags)
    }

    #[test]
    fn absent_to_present() {
        let upstream = Upstream::new();
        let repo = upstream.repo();
        let cache = upstream.cache(&repo);

        refresh(&repo, &cache, RefreshFlags::default()).unwrap();
        assert!(cache.repomd_path().exists());
        assert!(cache.repodata_dir().join("primary.xml").exists());
        assert!(cache.lastrefresh_path().exists());
        // staging area left clean
        assert!(!cache.tmp_dir().join("repomd.xml").exists());

        let metadata = load_repo_metadata(&repo, &cache).unwrap();
        assert_eq!(metadata.primary.packages.len(), 1);
        assert_eq!(metadata.primary.packages[0].name, "foo");
        // solver cache was materialized
        assert!(cache
            .solvcache_dir()
            .join(format!("{}.primary.json", metadata.cookie))
            .exists());
        // and loads back
        let again = load_repo_metadata(&repo, &cache).unwrap();
        assert_eq!(again.primary, metadata.primary);
    }

    #[test]
    fn cache_only_with_empty_cache_fails() {
        let upstream = Upstream::new();
        let repo = upstream.repo();
        let cache = upstream.cache(&repo);

        let err = refresh(
            &repo,
            &cache,
            RefreshFlags {
                cache_only: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_matches!(err, Error::CacheDisabled);
    }

    #[test]
    fn unchanged_cookie_keeps_parts() {
        let upstream = Upstream::new();
        let mut repo = upstream.repo();
        let cache = upstream.cache(&repo);
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();

        // expire everything, refresh again without upstream changes
        repo.metadata_expire = MetadataExpire::After(Duration::ZERO);
        let before = std::fs::metadata(cache.repodata_dir().join("primary.xml"))
            .unwrap()
            .modified()
            .unwrap();
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();
        let after = std::fs::metadata(cache.repodata_dir().join("primary.xml"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn changed_cookie_purges_and_replaces() {
        let upstream = Upstream::new();
        let mut repo = upstream.repo();
        let cache = upstream.cache(&repo);
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();

        // leave a package and a solvcache entry behind
        std::fs::write(cache.rpms_dir().join("old.rpm"), "x").unwrap();
        let old_cookie = repomd_cookie(&cache.repomd_path()).unwrap();

        let new_primary = PRIMARY_XML.replace("1.0", "2.0");
        upstream.publish(&new_primary, "rev-2");

        repo.metadata_expire = MetadataExpire::After(Duration::ZERO);
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();

        let new_cookie = repomd_cookie(&cache.repomd_path()).unwrap();
        assert_ne!(old_cookie, new_cookie);
        // packages purged along with the metadata
        assert!(!cache.rpms_dir().join("old.rpm").exists());

        let metadata = load_repo_metadata(&repo, &cache).unwrap();
        assert_eq!(metadata.primary.packages[0].evr.version, "2.0");
    }

    #[test]
    fn keepcache_preserves_rpms_across_replace() {
        let upstream = Upstream::new();
        let mut repo = upstream.repo();
        let cache = upstream.cache(&repo);
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();
        std::fs::write(cache.rpms_dir().join("old.rpm"), "x").unwrap();

        upstream.publish(&PRIMARY_XML.replace("1.0", "3.0"), "rev-3");
        repo.metadata_expire = MetadataExpire::After(Duration::ZERO);
        refresh(
            &repo,
            &cache,
            RefreshFlags {
                keepcache: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cache.rpms_dir().join("old.rpm").exists());
    }

    #[test]
    fn metadata_expire_never_skips_refresh() {
        let upstream = Upstream::new();
        let mut repo = upstream.repo();
        let cache = upstream.cache(&repo);
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();

        upstream.publish(&PRIMARY_XML.replace("1.0", "9.0"), "rev-9");
        repo.metadata_expire = MetadataExpire::Never;
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();

        // still the old metadata
        let metadata = load_repo_metadata(&repo, &cache).unwrap();
        assert_eq!(metadata.primary.packages[0].evr.version, "1.0");
    }

    #[test]
    fn partial_failure_resumes() {
        let upstream = Upstream::new();
        let repo = upstream.repo();
        let cache = upstream.cache(&repo);
        refresh(&repo, &cache, RefreshFlags::default()).unwrap();

        // simulate a partial failure: primary lost, repomd still present
        std::fs::remove_file(cache.repodata_dir().join("primary.xml")).unwrap();
        cache.remove_solvcache().unwrap();
        let err = load_repo_metadata(&repo, &cache).unwrap_err();
        assert_matches!(err, Error::CacheDisabled);

        // a forced refresh restores the missing part without a cookie
        // change
        refresh(
            &repo,
            &cache,
            RefreshFlags {
                force: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(cache.repodata_dir().join("primary.xml").exists());
    }
}
