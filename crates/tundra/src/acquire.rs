//! Package acquisition: resolve, download, verify.
//!
//! Every package file an executor needs goes through [`acquire_package`]:
//! the location from the repo metadata is resolved against the repo's
//! base URLs, downloaded into the cache (source subtree preserved) or a
//! flat user directory, and then verified in order: declared size,
//! declared digest, GPG signature. Any verification failure deletes the
//! local file; size and digest failures are retried up to the repo's
//! retry budget since they usually mean a broken transfer.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use tundra_digest::verify_file_checksum;
use tundra_fetch::FetchProgress;
use tundra_solve::PlanPackage;

use crate::cache::{is_contained, RepoCache};
use crate::error::{Error, Result};
use crate::gpg::Keyring;
use crate::remote::RepoRemote;

/// Where a download lands.
#[derive(Debug, Clone, Copy)]
pub enum DownloadDest<'a> {
    /// Into the repo cache `rpms/` tree, preserving the source-relative
    /// subtree.
    Cache(&'a RepoCache),
    /// Into a flat user-chosen directory, basename only.
    Flat(&'a Path),
}

/// Resolve where a plan package will be stored locally.
pub fn local_package_path(pkg: &PlanPackage, dest: DownloadDest<'_>) -> Result<PathBuf> {
    // Command-line rpms already live on disk.
    if pkg.location.starts_with('/') {
        return Ok(PathBuf::from(&pkg.location));
    }
    if let Some(path) = pkg.location.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    match dest {
        DownloadDest::Cache(cache) => {
            let rpms_dir = cache.rpms_dir();
            let path = rpms_dir.join(pkg.location.trim_start_matches('/'));
            if !is_contained(&rpms_dir, &path) {
                return Err(Error::InvalidInput(format!(
                    "package location {} escapes the cache",
                    pkg.location
                )));
            }
            Ok(path)
        }
        DownloadDest::Flat(dir) => {
            let name = Path::new(&pkg.location)
                .file_name()
                .ok_or_else(|| Error::InvalidInput(format!("bad location {}", pkg.location)))?;
            Ok(dir.join(name))
        }
    }
}

/// Download (if necessary) and verify one package. Returns the local
/// path of the verified file.
pub fn acquire_package(
    pkg: &PlanPackage,
    remote: &RepoRemote,
    dest: DownloadDest<'_>,
    retries: u32,
    keyring: Option<&Keyring>,
    progress: &dyn FetchProgress,
) -> Result<PathBuf> {
    let path = local_package_path(pkg, dest)?;
    let local_source = pkg.location.starts_with('/') || pkg.location.starts_with("file://");

    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)?;
    }

    let mut last_err = None;
    for attempt in 0..retries.max(1) {
        if !present_with_content(&path) {
            if local_source {
                return Err(Error::FileNotFound(path.display().to_string()));
            }
            remote.download_location(&pkg.location, &path, progress)?;
        }
        match verify_transfer(pkg, &path) {
            Ok(()) => {
                // Signature trouble is not a transfer problem; no retry.
                if let Some(keyring) = keyring {
                    if let Err(err) = keyring.verify_package(&path) {
                        if !local_source {
                            let _ = fs_err::remove_file(&path);
                        }
                        return Err(err);
                    }
                }
                return Ok(path);
            }
            Err(err) => {
                warn!(rpm = %path.display(), attempt, error = %err, "verification failed");
                if !local_source {
                    let _ = fs_err::remove_file(&path);
                }
                last_err = Some(err);
                if local_source {
                    break;
                }
            }
        }
    }
    Err(last_err.unwrap_or(Error::NoMatch))
}

/// Size and digest checks against the resolver-declared values.
fn verify_transfer(pkg: &PlanPackage, path: &Path) -> Result<()> {
    if pkg.download_size > 0 {
        let actual = fs_err::metadata(path)?.len();
        if actual != pkg.download_size {
            return Err(Error::SizeMismatch {
                path: path.display().to_string(),
                expected: pkg.download_size,
                actual,
            });
        }
    }
    if let Some(checksum) = &pkg.checksum {
        if !verify_file_checksum(checksum, path)? {
            return Err(Error::ChecksumMismatch(path.display().to_string()));
        }
    }
    debug!(rpm = %path.display(), "transfer verified");
    Ok(())
}

/// Zero-byte files are leftovers from interrupted runs of older versions
/// and count as absent.
fn present_with_content(path: &Path) -> bool {
    fs_err::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
