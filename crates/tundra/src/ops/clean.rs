//! `clean`: scoped removal of cached repo artifacts.

use std::path::Path;

use tracing::info;

use crate::cache::RepoCache;
use crate::error::Result;
use crate::session::Session;

/// What to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanType {
    /// Everything, including the per-repo cache directories.
    All,
    /// Metadata (`repodata/`), the solver cache and the refresh marker.
    Metadata,
    /// Downloaded packages.
    Packages,
    /// The solver cache only.
    DbCache,
    /// Only the refresh marker, forcing the next refresh.
    ExpireCache,
    /// Downloaded GPG keys.
    Keys,
}

impl CleanType {
    /// Parse the clean type word.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "all" => Some(Self::All),
            "metadata" => Some(Self::Metadata),
            "packages" => Some(Self::Packages),
            "dbcache" => Some(Self::DbCache),
            "expire-cache" => Some(Self::ExpireCache),
            "keys" => Some(Self::Keys),
            _ => None,
        }
    }
}

/// Apply one clean type to every configured repo's cache.
pub fn clean(session: &Session, clean_type: CleanType) -> Result<()> {
    let cachedir = Path::new(&session.config.cachedir);
    for repo in session.registry.all() {
        if repo.is_synthetic() {
            continue;
        }
        let cache = RepoCache::new(cachedir, repo);
        if !cache.root().exists() {
            continue;
        }
        clean_one(&cache, clean_type)?;
        info!(repo = %repo.id, ?clean_type, "cleaned");
    }
    Ok(())
}

fn clean_one(cache: &RepoCache, clean_type: CleanType) -> Result<()> {
    match clean_type {
        CleanType::Metadata => {
            cache.remove_metadata()?;
            cache.remove_solvcache()?;
            cache.remove_lastrefresh_marker()?;
        }
        CleanType::Packages => cache.remove_rpms()?,
        CleanType::DbCache => cache.remove_solvcache()?,
        CleanType::ExpireCache => cache.remove_lastrefresh_marker()?,
        CleanType::Keys => cache.remove_keys()?,
        CleanType::All => {
            cache.remove_metadata()?;
            cache.remove_solvcache()?;
            cache.remove_rpms()?;
            cache.remove_keys()?;
            cache.remove_tmp()?;
            cache.remove_lastrefresh_marker()?;
            cache.remove_cache_dir()?;
        }
    }
    Ok(())
}

/// `makecache`: force-refresh the metadata of every enabled repo.
pub fn makecache(session: &mut Session) -> Result<()> {
    session.options.refresh = true;
    session.refresh_metadata()?;
    println!("Metadata cache created.");
    Ok(())
}
