//! The repo registry: loading, overrides, variable expansion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use tracing::{debug, warn};

use tundra_types::{parse_bool, Config, MetadataExpire, RepoConfig, CMDLINE_REPO_ID};

use crate::cache::repo_cache_name;
use crate::error::{Error, Result};
use crate::rpm::RpmBackend;

/// Values for `$releasever` and `$basearch`.
#[derive(Debug, Clone)]
pub struct Variables {
    /// Distribution release version.
    pub releasever: String,
    /// Machine architecture.
    pub basearch: String,
}

impl Variables {
    /// Resolve the variables: `$basearch` from `uname(2)`, `$releasever`
    /// from the version of the package providing one of the configured
    /// `distroverpkg` names, unless overridden.
    pub fn detect(
        backend: &dyn RpmBackend,
        config: &Config,
        releasever_override: Option<String>,
    ) -> Result<Self> {
        let basearch = uname_machine();
        if let Some(releasever) = releasever_override {
            return Ok(Self {
                releasever,
                basearch,
            });
        }
        for provide in &config.distroverpkg {
            if let Some(version) = backend.provider_version(provide)? {
                return Ok(Self {
                    releasever: version,
                    basearch,
                });
            }
        }
        Err(Error::NoDistroVerPkg)
    }

    /// Expand `$releasever` and `$basearch` in one string.
    pub fn expand(&self, value: &str) -> String {
        value
            .replace("$releasever", &self.releasever)
            .replace("$basearch", &self.basearch)
    }
}

/// The machine field of `uname(2)`.
fn uname_machine() -> String {
    // SAFETY: utsname is plain bytes; uname only writes into it.
    unsafe {
        let mut name: libc::utsname = std::mem::zeroed();
        if libc::uname(&mut name) != 0 {
            return String::from("x86_64");
        }
        let machine = std::ffi::CStr::from_ptr(name.machine.as_ptr());
        machine.to_string_lossy().into_owned()
    }
}

/// One enable/disable request from the command line, applied in the
/// order given.
#[derive(Debug, Clone)]
pub enum RepoStateChange {
    /// `--enablerepo=<glob>`
    Enable(String),
    /// `--disablerepo=<glob>`
    Disable(String),
    /// All `--repo=<id>` selectors of the invocation: disables
    /// everything first, then enables every named id.
    Only(Vec<String>),
}

/// The loaded set of repo descriptors plus the synthetic command-line
/// repo.
#[derive(Debug, Default)]
pub struct RepoRegistry {
    repos: Vec<RepoConfig>,
}

impl RepoRegistry {
    /// Load every `*.repo` file under the configured repodir plus any
    /// ad-hoc paths, apply the state changes in order, expand variables
    /// and derive cache names.
    pub fn load(
        config: &Config,
        extra_repo_files: &[PathBuf],
        changes: &[RepoStateChange],
        vars: &Variables,
    ) -> Result<Self> {
        let mut registry = Self::default();
        let mut seen = HashSet::new();

        let repodir = Path::new(&config.repodir);
        if repodir.is_dir() {
            let mut files: Vec<PathBuf> = fs_err::read_dir(repodir)
                .map_err(|_| Error::RepoDirOpen(config.repodir.clone()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("repo"))
                .collect();
            files.sort();
            for file in files {
                registry.load_file(&file, &mut seen)?;
            }
        } else {
            debug!(repodir = %config.repodir, "repodir does not exist");
        }
        for file in extra_repo_files {
            registry.load_file(file, &mut seen)?;
        }

        registry.repos.push(RepoConfig::cmdline());

        for change in changes {
            match change {
                RepoStateChange::Enable(pattern) => registry.alter_state(pattern, true),
                RepoStateChange::Disable(pattern) => registry.alter_state(pattern, false),
                RepoStateChange::Only(ids) => {
                    registry.alter_state("*", false);
                    for id in ids {
                        registry.alter_state(id, true);
                    }
                }
            }
        }

        for repo in &mut registry.repos {
            if repo.is_synthetic() {
                continue;
            }
            finalize_repo(repo, vars)?;
        }

        // Stable refresh order: priority ascending, id as tiebreak.
        registry
            .repos
            .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(registry)
    }

    fn load_file(&mut self, path: &Path, seen: &mut HashSet<String>) -> Result<()> {
        debug!(file = %path.display(), "loading repo file");
        let mut ini = Ini::new_cs();
        ini.load(path)
            .map_err(|_| Error::InvalidRepoFile(path.display().to_string()))?;
        for section in ini.sections() {
            if !seen.insert(section.clone()) {
                return Err(Error::DuplicateRepoId(section));
            }
            let repo = parse_repo_section(&ini, &section, path)?;
            self.repos.push(repo);
        }
        Ok(())
    }

    /// Enable or disable repos matching a glob or exact id.
    pub fn alter_state(&mut self, pattern: &str, enable: bool) {
        let glob = glob::Pattern::new(pattern).ok();
        for repo in &mut self.repos {
            if repo.id == CMDLINE_REPO_ID {
                continue;
            }
            let matched = repo.id == pattern
                || glob.as_ref().map(|g| g.matches(&repo.id)).unwrap_or(false);
            if matched {
                repo.enabled = enable;
            }
        }
    }

    /// Look up by id.
    pub fn get(&self, id: &str) -> Result<&RepoConfig> {
        self.repos
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::RepoNotFound(id.to_string()))
    }

    /// All repos, refresh order.
    pub fn all(&self) -> impl Iterator<Item = &RepoConfig> {
        self.repos.iter()
    }

    /// Enabled, non-synthetic repos in refresh order.
    pub fn enabled(&self) -> impl Iterator<Item = &RepoConfig> {
        self.repos
            .iter()
            .filter(|r| r.enabled && !r.is_synthetic())
    }

    /// Fail unless at least one repo is enabled.
    pub fn require_enabled(&self) -> Result<()> {
        if self.enabled().next().is_none() {
            return Err(Error::NoEnabledRepos);
        }
        Ok(())
    }

    /// Disable a repo for the rest of the session
    /// (`skip_if_unavailable`).
    pub fn disable_for_session(&mut self, id: &str) {
        for repo in &mut self.repos {
            if repo.id == id {
                repo.enabled = false;
                warn!(repo = %id, "disabled for this session");
            }
        }
    }
}

fn parse_repo_section(ini: &Ini, section: &str, path: &Path) -> Result<RepoConfig> {
    let mut repo = RepoConfig::with_id(section);
    let get = |key: &str| ini.get(section, key);

    if let Some(name) = get("name") {
        repo.name = name;
    }
    repo.enabled = get("enabled").map(|v| parse_bool(&v)).unwrap_or(false);
    if let Some(urls) = get("baseurl") {
        repo.base_urls = urls.split_whitespace().map(str::to_string).collect();
    }
    repo.metalink = get("metalink");
    repo.mirrorlist = get("mirrorlist");
    if let Some(keys) = get("gpgkey") {
        repo.gpg_keys = keys.split_whitespace().map(str::to_string).collect();
    }
    if let Some(v) = get("gpgcheck") {
        repo.gpgcheck = parse_bool(&v);
    }
    if let Some(v) = get("sslverify") {
        repo.sslverify = parse_bool(&v);
    }
    if let Some(v) = get("skip_if_unavailable") {
        repo.skip_if_unavailable = parse_bool(&v);
    }
    if let Some(v) = get("skip_md_filelists") {
        repo.skip_md_filelists = parse_bool(&v);
    }
    if let Some(v) = get("skip_md_updateinfo") {
        repo.skip_md_updateinfo = parse_bool(&v);
    }
    if let Some(v) = get("skip_md_other") {
        repo.skip_md_other = parse_bool(&v);
    }
    parse_int(&get("priority"), &mut repo.priority, section)?;
    parse_int(&get("retries"), &mut repo.retries, section)?;
    parse_int(&get("timeout"), &mut repo.timeout, section)?;
    parse_int(&get("minrate"), &mut repo.minrate, section)?;
    parse_int(&get("throttle"), &mut repo.throttle, section)?;
    if let Some(v) = get("metadata_expire") {
        repo.metadata_expire = v
            .parse::<MetadataExpire>()
            .map_err(|_| Error::MetadataExpireParse(v))?;
    }
    repo.username = get("username");
    repo.password = get("password");
    repo.ssl_ca_cert = get("sslcacert");
    repo.ssl_client_cert = get("sslclientcert");
    repo.ssl_client_key = get("sslclientkey");

    // A repo must say where its content lives, even while disabled.
    if repo.base_urls.is_empty() && repo.metalink.is_none() && repo.mirrorlist.is_none() {
        warn!(repo = %section, file = %path.display(), "no baseurl, metalink or mirrorlist");
        return Err(Error::BaseUrlMissing(section.to_string()));
    }
    Ok(repo)
}

fn parse_int<T: std::str::FromStr>(
    value: &Option<String>,
    target: &mut T,
    section: &str,
) -> Result<()> {
    if let Some(value) = value {
        *target = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRepoFile(format!("bad integer in [{section}]")))?;
    }
    Ok(())
}

/// Expand variables in every string attribute, then derive the cache
/// name from the primary remote URL.
fn finalize_repo(repo: &mut RepoConfig, vars: &Variables) -> Result<()> {
    repo.name = vars.expand(&repo.name);
    for url in &mut repo.base_urls {
        *url = vars.expand(url);
    }
    repo.metalink = repo.metalink.take().map(|u| vars.expand(&u));
    repo.mirrorlist = repo.mirrorlist.take().map(|u| vars.expand(&u));
    for key in &mut repo.gpg_keys {
        *key = vars.expand(key);
    }
    let primary = repo
        .primary_url()
        .ok_or_else(|| Error::BaseUrlMissing(repo.id.clone()))?
        .to_string();
    repo.cache_name = repo_cache_name(&repo.id, &primary);
    Ok(())
}
