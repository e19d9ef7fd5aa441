//! The transaction executor: from solved plan to mutated system.
//!
//! Execution is two-phase: a test transaction runs rpm's ordering,
//! dependency and file-conflict checks without touching the filesystem;
//! only on success does the real transaction run. The history database
//! is reconciled immediately before and updated immediately after, so
//! the recorded state tracks the rpm database even when other tools
//! intervene between runs.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use tundra_fetch::FetchProgress;
use tundra_history::HistoryDb;
use tundra_solve::SolvedPlan;

use crate::acquire::{acquire_package, DownloadDest};
use crate::cache::RepoCache;
use crate::error::{Error, Result};
use crate::gpg::Keyring;
use crate::output::Confirm;
use crate::remote::RepoRemote;
use crate::rpm::{RpmBackend, RpmTransaction, VerifyFlags};

/// Everything the executor needs to reach one repo.
pub struct RepoHandle {
    /// The repo descriptor.
    pub repo: tundra_types::RepoConfig,
    /// Its cache directory.
    pub cache: RepoCache,
    /// Its resolved remote.
    pub remote: RepoRemote,
    /// Its keyring, when signature checking applies.
    pub keyring: Option<Keyring>,
}

/// Per-repo handles keyed by repo id.
#[derive(Default)]
pub struct RepoHandles {
    handles: HashMap<String, RepoHandle>,
}

impl RepoHandles {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle.
    pub fn insert(&mut self, handle: RepoHandle) {
        self.handles.insert(handle.repo.id.clone(), handle);
    }

    /// Look up by repo id.
    pub fn get(&self, repo_id: &str) -> Result<&RepoHandle> {
        self.handles
            .get(repo_id)
            .ok_or_else(|| Error::RepoNotFound(repo_id.to_string()))
    }

    /// Iterate over all handles.
    pub fn iter(&self) -> impl Iterator<Item = &RepoHandle> {
        self.handles.values()
    }

    /// Attach a keyring to a repo handle.
    pub fn set_keyring(&mut self, repo_id: &str, keyring: Keyring) {
        if let Some(handle) = self.handles.get_mut(repo_id) {
            handle.keyring = Some(keyring);
        }
    }
}

/// Switches for one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Stop after downloading; keep the files.
    pub download_only: bool,
    /// Flat download directory instead of the cache tree.
    pub download_dir: Option<PathBuf>,
    /// Keep downloaded packages after success.
    pub keepcache: bool,
    /// Erase the plan's `unneeded` list too (autoremove semantics).
    pub erase_unneeded: bool,
    /// rpm verify policy.
    pub verify: VerifyFlags,
    /// Skip the engine-side GPG check entirely (`--nogpgcheck`).
    pub nogpgcheck: bool,
    /// Command line recorded in history.
    pub cmdline: String,
    /// Restore auto-flags to their values at this transaction after
    /// recording (rollback/undo/redo).
    pub restore_flags_to: Option<i64>,
    /// RLIMIT_NOFILE cap raised before the real transaction.
    pub openmax: u64,
}

/// Outcome of a successful execution.
#[derive(Debug, Default)]
pub struct ExecuteSummary {
    /// History transaction recorded, if the installed set changed.
    pub history_id: Option<i64>,
    /// Files downloaded for this transaction.
    pub downloaded: Vec<PathBuf>,
}

/// Download, verify and apply a solved plan.
pub fn execute_plan(
    plan: &SolvedPlan,
    repos: &RepoHandles,
    backend: &dyn RpmBackend,
    history: &mut HistoryDb,
    options: &ExecuteOptions,
    confirm: &dyn Confirm,
    progress: &dyn FetchProgress,
) -> Result<ExecuteSummary> {
    let mut summary = ExecuteSummary::default();
    if !plan.need_action() {
        info!("nothing to do");
        return Ok(summary);
    }

    if !confirm.confirm("Is this ok [y/N]: ") {
        return Err(Error::OperationAborted);
    }

    // Acquisition: every package that needs its rpm file present.
    let mut install_files = Vec::new();
    let mut cache_owned = Vec::new();
    for pkg in plan.downloads() {
        let handle = repos.get(&pkg.repo_id)?;
        let dest = match &options.download_dir {
            Some(dir) => {
                fs_err::create_dir_all(dir)?;
                DownloadDest::Flat(dir)
            }
            None => DownloadDest::Cache(&handle.cache),
        };
        let keyring = if options.nogpgcheck {
            None
        } else {
            handle.keyring.as_ref()
        };
        let path = acquire_package(
            pkg,
            &handle.remote,
            dest,
            handle.repo.retries.max(1),
            keyring,
            progress,
        )?;
        let downloaded = !pkg.location.starts_with('/') && !pkg.location.starts_with("file://");
        if downloaded {
            cache_owned.push(path.clone());
        }
        summary.downloaded.push(path.clone());
        install_files.push(path);
    }

    if options.download_only {
        info!("download complete, skipping transaction");
        return Ok(summary);
    }

    raise_open_file_limit(options.openmax);

    // Reconcile history with reality before mutating anything.
    let now = chrono::Utc::now().timestamp();
    let installed_before: Vec<String> = installed_nevras(backend)?;
    if history.is_initialized()? {
        history.sync(&installed_before, &backend.db_cookie()?, now)?;
    } else {
        history.init_baseline(&installed_before, &backend.db_cookie()?, "(baseline)", now)?;
    }

    let mut erase_nevras: Vec<_> = plan.to_remove.iter().map(|p| p.nevra.clone()).collect();
    if options.erase_unneeded {
        erase_nevras.extend(plan.unneeded.iter().map(|p| p.nevra.clone()));
    }
    erase_nevras.sort();
    erase_nevras.dedup();
    let transaction = RpmTransaction {
        install_files,
        has_downgrades: !plan.to_downgrade.is_empty(),
        has_reinstalls: !plan.to_reinstall.is_empty(),
        erase_nevras,
        verify: options.verify,
    };

    debug!(
        installs = transaction.install_files.len(),
        erases = transaction.erase_nevras.len(),
        "running test transaction"
    );
    backend
        .run_transaction(&transaction, true)
        .map_err(|err| match err {
            Error::TransactionFailed(msg) => Error::RpmCheck(msg),
            other => other,
        })?;

    info!("running transaction");
    backend.run_transaction(&transaction, false)?;

    // Record the delta and the auto-installed flags.
    let installed_after = installed_nevras(backend)?;
    let cookie_after = backend.db_cookie()?;
    let now = chrono::Utc::now().timestamp();
    let history_id =
        history.record_transaction(&installed_after, &cookie_after, &options.cmdline, now)?;
    if let Some(trans_id) = history_id {
        for name in &plan.user_installed {
            history.set_flag(trans_id, name, false)?;
        }
        for pkg in &plan.to_install {
            if !plan.user_installed.contains(&pkg.nevra.name) {
                history.set_flag(trans_id, &pkg.nevra.name, true)?;
            }
        }
        if let Some(target) = options.restore_flags_to {
            let restored = history.restore_flags(target, trans_id)?;
            debug!(restored, target, "restored auto flags");
        }
    }
    summary.history_id = history_id;

    // Downloaded packages are kept only by explicit policy.
    if !options.keepcache {
        for path in &cache_owned {
            if let Err(err) = fs_err::remove_file(path) {
                warn!(file = %path.display(), error = %err, "could not remove package");
            }
        }
    }

    Ok(summary)
}

fn installed_nevras(backend: &dyn RpmBackend) -> Result<Vec<String>> {
    Ok(backend
        .list_installed()?
        .iter()
        .map(|r| format!("{}-{}.{}", r.name, r.evr, r.arch))
        .collect())
}

/// Raise `RLIMIT_NOFILE` to the configured cap so rpm's fd iteration
/// stays bounded in chroot installs. Failure is a warning, never an
/// error.
fn raise_open_file_limit(openmax: u64) {
    if openmax == 0 {
        return;
    }
    // SAFETY: getrlimit/setrlimit write only into the provided struct.
    unsafe {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) != 0 {
            warn!("could not query RLIMIT_NOFILE");
            return;
        }
        if limit.rlim_cur >= openmax {
            return;
        }
        limit.rlim_cur = openmax.min(limit.rlim_max);
        if libc::setrlimit(libc::RLIMIT_NOFILE, &limit) != 0 {
            warn!(openmax, "could not raise RLIMIT_NOFILE");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::repo_cache_name;
    use crate::output::AlwaysAnswer;
    use crate::rpm::mock::FakeRpm;
    use assert_matches::assert_matches;
    use std::path::Path;
    use tundra_digest::hex_file_digest;
    use tundra_fetch::SilentProgress;
    use tundra_solve::{InstalledRecord, PlanPackage};
    use tundra_types::{Checksum, ChecksumKind, Config, Nevra, RepoConfig};

    struct Fixture {
        _dir: tempfile::TempDir,
        upstream: PathBuf,
        repos: RepoHandles,
        history: HistoryDb,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let upstream = dir.path().join("upstream");
        std::fs::create_dir_all(upstream.join("rpms")).unwrap();

        let mut repo = RepoConfig::with_id("r1");
        repo.base_urls = vec![format!("file://{}", upstream.display())];
        repo.cache_name = repo_cache_name("r1", &repo.base_urls[0]);
        repo.gpgcheck = false;
        let cache = RepoCache::new(&dir.path().join("cache"), &repo);
        cache.ensure_dirs().unwrap();
        let remote = RepoRemote::new(&repo, &Config::default()).unwrap();

        let mut repos = RepoHandles::new();
        repos.insert(RepoHandle {
            repo,
            cache,
            remote,
            keyring: None,
        });
        Fixture {
            _dir: dir,
            upstream,
            repos,
            history: HistoryDb::open_in_memory().unwrap(),
        }
    }

    /// Publish a fake rpm upstream and return its plan entry. The file
    /// stem encodes the NEVRA so FakeRpm can track it.
    fn publish(upstream: &Path, nevra: &str) -> PlanPackage {
        let location = format!("rpms/{nevra}.rpm");
        let path = upstream.join(&location);
        std::fs::write(&path, nevra.as_bytes()).unwrap();
        PlanPackage {
            nevra: Nevra::parse(nevra).unwrap(),
            repo_id: "r1".to_string(),
            location,
            checksum: Some(Checksum::new(
                ChecksumKind::Sha256,
                hex_file_digest(ChecksumKind::Sha256, &path).unwrap(),
            )),
            download_size: nevra.len() as u64,
            install_size: 0,
        }
    }

    fn installed(nevra: &str) -> InstalledRecord {
        let nevra = Nevra::parse(nevra).unwrap();
        InstalledRecord {
            name: nevra.name.clone(),
            evr: nevra.evr.clone(),
            arch: nevra.arch.clone(),
            install_size: 0,
            provides: Vec::new(),
            requires: Vec::new(),
            summary: String::new(),
        }
    }

    fn options(cmdline: &str) -> ExecuteOptions {
        ExecuteOptions {
            cmdline: cmdline.to_string(),
            openmax: 0,
            ..Default::default()
        }
    }

    #[test]
    fn empty_plan_is_a_noop() {
        let mut fx = fixture();
        let backend = FakeRpm::default();
        let summary = execute_plan(
            &SolvedPlan::default(),
            &fx.repos,
            &backend,
            &mut fx.history,
            &options("install nothing"),
            &AlwaysAnswer(false),
            &SilentProgress,
        )
        .unwrap();
        assert!(summary.history_id.is_none());
        assert!(backend.transactions.borrow().is_empty());
    }

    #[test]
    fn declined_prompt_aborts() {
        let mut fx = fixture();
        let backend = FakeRpm::default();
        let mut plan = SolvedPlan::default();
        plan.to_install.push(publish(&fx.upstream, "foo-1.0-1.x86_64"));

        let err = execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &options("install foo"),
            &AlwaysAnswer(false),
            &SilentProgress,
        )
        .unwrap_err();
        assert_matches!(err, Error::OperationAborted);
    }

    #[test]
    fn install_records_history_and_flags() {
        let mut fx = fixture();
        let backend = FakeRpm::with_installed(vec![installed("glibc-2.36-1.x86_64")]);
        let mut plan = SolvedPlan::default();
        plan.to_install.push(publish(&fx.upstream, "foo-1.0-1.x86_64"));
        plan.to_install.push(publish(&fx.upstream, "bar-2.0-1.x86_64"));
        plan.user_installed = vec!["foo".to_string()];

        let summary = execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &options("install foo"),
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();

        // test phase ran before the real one
        let transactions = backend.transactions.borrow();
        assert_eq!(transactions.len(), 2);
        assert!(transactions[0].1, "first run must be the test phase");
        assert!(!transactions[1].1);

        let trans_id = summary.history_id.unwrap();
        let recorded = fx.history.transaction(trans_id).unwrap();
        assert_eq!(recorded.cmdline, "install foo");
        assert_eq!(
            recorded.added,
            vec!["bar-2.0-1.x86_64".to_string(), "foo-1.0-1.x86_64".to_string()]
        );
        // explicit install: not auto; dependency: auto
        assert!(!fx.history.flag_at("foo", trans_id).unwrap());
        assert!(fx.history.flag_at("bar", trans_id).unwrap());
    }

    #[test]
    fn downloads_removed_unless_keepcache() {
        let mut fx = fixture();
        let backend = FakeRpm::default();
        let mut plan = SolvedPlan::default();
        plan.to_install.push(publish(&fx.upstream, "foo-1.0-1.x86_64"));

        let summary = execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &options("install foo"),
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();
        for path in &summary.downloaded {
            assert!(!path.exists(), "{} should be cleaned", path.display());
        }

        // keepcache keeps them
        let mut opts = options("install foo");
        opts.keepcache = true;
        let summary = execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &opts,
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();
        for path in &summary.downloaded {
            assert!(path.exists());
        }
    }

    #[test]
    fn download_only_skips_the_transaction_and_keeps_files() {
        let mut fx = fixture();
        let backend = FakeRpm::default();
        let mut plan = SolvedPlan::default();
        plan.to_install.push(publish(&fx.upstream, "foo-1.0-1.x86_64"));

        let mut opts = options("install foo");
        opts.download_only = true;
        let summary = execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &opts,
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();
        assert!(backend.transactions.borrow().is_empty());
        assert!(summary.downloaded.iter().all(|p| p.exists()));
    }

    #[test]
    fn failed_test_transaction_aborts_before_mutation() {
        let mut fx = fixture();
        let backend = FakeRpm::default();
        *backend.fail_next.borrow_mut() = Some("file conflicts".to_string());
        let mut plan = SolvedPlan::default();
        plan.to_install.push(publish(&fx.upstream, "foo-1.0-1.x86_64"));

        let err = execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &options("install foo"),
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap_err();
        assert_matches!(err, Error::RpmCheck(_));
        // the real transaction never ran
        assert!(backend.transactions.borrow().is_empty());
        assert!(backend.installed.borrow().is_empty());
    }

    #[test]
    fn erase_includes_unneeded_when_requested() {
        let mut fx = fixture();
        let backend = FakeRpm::with_installed(vec![
            installed("bar-2.0-1.x86_64"),
            installed("foo-1.0-1.x86_64"),
        ]);
        let mut plan = SolvedPlan::default();
        plan.to_remove.push(PlanPackage {
            nevra: Nevra::parse("bar-2.0-1.x86_64").unwrap(),
            repo_id: "@system".to_string(),
            location: String::new(),
            checksum: None,
            download_size: 0,
            install_size: 0,
        });
        plan.unneeded.push(PlanPackage {
            nevra: Nevra::parse("foo-1.0-1.x86_64").unwrap(),
            repo_id: "@system".to_string(),
            location: String::new(),
            checksum: None,
            download_size: 0,
            install_size: 0,
        });

        let mut opts = options("autoremove bar");
        opts.erase_unneeded = true;
        execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &opts,
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();
        assert!(backend.installed.borrow().is_empty());
    }

    #[test]
    fn rollback_restores_flags() {
        let mut fx = fixture();
        let backend = FakeRpm::with_installed(vec![installed("glibc-2.36-1.x86_64")]);

        // transaction 1: baseline + install bar as a dependency
        let mut plan = SolvedPlan::default();
        plan.to_install.push(publish(&fx.upstream, "bar-2.0-1.x86_64"));
        execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &options("install something"),
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();
        assert!(fx
            .history
            .flag_at("bar", fx.history.latest_id().unwrap())
            .unwrap());

        // roll back to the baseline: erase bar, restore flags
        let mut plan = SolvedPlan::default();
        plan.to_remove.push(PlanPackage {
            nevra: Nevra::parse("bar-2.0-1.x86_64").unwrap(),
            repo_id: "@system".to_string(),
            location: String::new(),
            checksum: None,
            download_size: 0,
            install_size: 0,
        });
        let mut opts = options("rollback 1");
        opts.restore_flags_to = Some(1);
        execute_plan(
            &plan,
            &fx.repos,
            &backend,
            &mut fx.history,
            &opts,
            &AlwaysAnswer(true),
            &SilentProgress,
        )
        .unwrap();
        let latest = fx.history.latest_id().unwrap();
        assert!(!fx.history.flag_at("bar", latest).unwrap());
    }
}
