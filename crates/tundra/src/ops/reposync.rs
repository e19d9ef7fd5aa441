//! `reposync`: mirror enabled repos into a local directory tree.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use tundra_fetch::SilentProgress;
use tundra_solve::PlanPackage;

use crate::acquire::{acquire_package, DownloadDest};
use crate::error::{Error, Result};
use crate::session::Session;

/// Options of one reposync run.
#[derive(Debug, Clone, Default)]
pub struct ReposyncOptions {
    /// Also download the `repodata/` tree.
    pub download_metadata: bool,
    /// Delete local files the repo no longer carries.
    pub delete: bool,
    /// Keep only these architectures (plus `noarch`).
    pub archs: Vec<String>,
    /// Only source packages.
    pub source: bool,
    /// Only the newest version of each package name.
    pub newest_only: bool,
    /// Do not create a per-repo subdirectory.
    pub norepopath: bool,
    /// Print the URLs instead of downloading.
    pub urls: bool,
    /// Verify signatures of downloaded packages.
    pub gpgcheck: bool,
    /// Target directory; defaults to the current directory.
    pub download_path: Option<PathBuf>,
}

/// Mirror every enabled repo per the options.
pub fn reposync(session: &mut Session, options: &ReposyncOptions) -> Result<()> {
    session.refresh_metadata()?;
    let base_dir = options
        .download_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    if options.norepopath && session.metadata().len() > 1 {
        return Err(Error::InvalidInput(
            "cannot use --norepopath with multiple enabled repos".to_string(),
        ));
    }

    let metadata: Vec<(String, Vec<PlanPackage>)> = session
        .metadata()
        .iter()
        .map(|meta| {
            let packages = select_packages(meta, options);
            (meta.repo_id.clone(), packages)
        })
        .collect();

    if options.gpgcheck {
        let confirm = session.confirm();
        for (repo_id, _) in &metadata {
            session.ensure_keyring(repo_id, &confirm)?;
        }
    }

    for (repo_id, packages) in metadata {
        let repo_dir = if options.norepopath {
            base_dir.clone()
        } else {
            base_dir.join(&repo_id)
        };

        if options.urls {
            let handle = session.handles.get(&repo_id)?;
            for pkg in &packages {
                match handle.remote.location_url(&pkg.location) {
                    Some(url) => println!("{url}"),
                    None => warn!(location = %pkg.location, "no base url"),
                }
            }
            continue;
        }

        fs_err::create_dir_all(&repo_dir)?;
        let mut kept: HashSet<PathBuf> = HashSet::new();
        for pkg in &packages {
            let handle = session.handles.get(&repo_id)?;
            let keyring = if options.gpgcheck {
                handle.keyring.as_ref()
            } else {
                None
            };
            // The repo-relative subtree is preserved under the target.
            let dest_path = repo_dir.join(pkg.location.trim_start_matches('/'));
            if let Some(parent) = dest_path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            let flat_parent = dest_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| repo_dir.clone());
            let path = acquire_package(
                pkg,
                &handle.remote,
                DownloadDest::Flat(&flat_parent),
                handle.repo.retries.max(1),
                keyring,
                &SilentProgress,
            )?;
            kept.insert(path);
        }

        if options.download_metadata {
            let handle = session.handles.get(&repo_id)?;
            let repomd = crate::refresh::load_repomd(&handle.cache)?;
            let metadata_dir = repo_dir.join("repodata");
            fs_err::create_dir_all(&metadata_dir)?;
            fs_err::copy(handle.cache.repomd_path(), metadata_dir.join("repomd.xml"))?;
            for part in &repomd.parts {
                let name = Path::new(&part.location)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default();
                let cached = handle.cache.repodata_dir().join(&name);
                if cached.exists() {
                    fs_err::copy(&cached, metadata_dir.join(&name))?;
                }
            }
        }

        if options.delete {
            delete_extraneous(&repo_dir, &kept)?;
        }
        info!(repo = %repo_id, "synchronized");
    }
    Ok(())
}

/// Pick the packages of one repo per the filters.
fn select_packages(
    meta: &crate::refresh::RepoMetadata,
    options: &ReposyncOptions,
) -> Vec<PlanPackage> {
    let mut selected: Vec<&tundra_repodata::PrimaryPackage> = meta
        .primary
        .packages
        .iter()
        .filter(|pkg| {
            if options.source {
                return pkg.is_source();
            }
            if pkg.is_source() {
                return false;
            }
            options.archs.is_empty()
                || pkg.arch == "noarch"
                || options.archs.iter().any(|a| *a == pkg.arch)
        })
        .collect();

    if options.newest_only {
        let mut best: BTreeMap<(&str, &str), &tundra_repodata::PrimaryPackage> = BTreeMap::new();
        for pkg in selected {
            let key = (pkg.name.as_str(), pkg.arch.as_str());
            match best.get(&key) {
                Some(existing) if existing.evr >= pkg.evr => {}
                _ => {
                    best.insert(key, pkg);
                }
            }
        }
        selected = best.into_values().collect();
    }

    selected
        .into_iter()
        .map(|pkg| PlanPackage {
            nevra: pkg.nevra(),
            repo_id: meta.repo_id.clone(),
            location: pkg.location.clone(),
            checksum: Some(pkg.checksum.clone()),
            download_size: pkg.download_size,
            install_size: pkg.install_size,
        })
        .collect()
}

/// Remove files under the sync tree the repo no longer publishes.
fn delete_extraneous(repo_dir: &Path, kept: &HashSet<PathBuf>) -> Result<()> {
    for entry in WalkDir::new(repo_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rpm") {
            continue;
        }
        if !kept.contains(path) {
            info!(file = %path.display(), "deleting extraneous file");
            fs_err::remove_file(path)?;
        }
    }
    Ok(())
}
