//! The session: the root object every command runs against.
//!
//! A session owns the loaded configuration, the repo registry, the
//! history database connection, the plugin bus and (for mutating
//! operations) the process-wide instance lock. Teardown cascades in
//! field order; the lock is declared last so it releases after
//! everything else.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use tundra_history::HistoryDb;
use tundra_solve::{BuiltinSolver, Pool, SolvableId, SolvedPlan, SolverBackend};
use tundra_types::Config;

use crate::cache::RepoCache;
use crate::conf::{load_config, LoadedConfig};
use crate::error::{Error, Result};
use crate::goal::{self, GoalOptions, GoalPolicy, Intent};
use crate::gpg::Keyring;
use crate::output::{Confirm, OutputMode, TtyConfirm};
use crate::plugin::{MetalinkPlugin, PluginBus};
use crate::refresh::{load_repo_metadata, refresh_repo, RefreshFlags, RepoMetadata};
use crate::remote::RepoRemote;
use crate::repolist::{RepoRegistry, RepoStateChange, Variables};
use crate::rpm::{RpmBackend, VerifyFlags};
use crate::trans::{execute_plan, ExecuteOptions, ExecuteSummary, RepoHandle, RepoHandles};

/// Path of the advisory lock serializing mutating sessions.
pub const INSTANCE_LOCK_PATH: &str = "/var/run/.tdnf-instance-lock";

/// Everything the command line hands the engine.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Main config file.
    pub config_file: PathBuf,
    /// `--releasever` override.
    pub releasever: Option<String>,
    /// Enable/disable/only changes, in order.
    pub repo_state_changes: Vec<RepoStateChange>,
    /// Ad-hoc repo files (`--repofrompath`).
    pub extra_repo_files: Vec<PathBuf>,
    /// `--cacheonly`.
    pub cache_only: bool,
    /// `--refresh`.
    pub refresh: bool,
    /// `--assumeyes`.
    pub assume_yes: bool,
    /// `--assumeno`.
    pub assume_no: bool,
    /// `--json`.
    pub json: bool,
    /// `--nogpgcheck`.
    pub nogpgcheck: bool,
    /// `--skipsignature`.
    pub skipsignature: bool,
    /// `--skipdigest`.
    pub skipdigest: bool,
    /// `--downloadonly`.
    pub download_only: bool,
    /// `--downloaddir`.
    pub download_dir: Option<PathBuf>,
    /// Resolver switches.
    pub goal: GoalOptions,
    /// The command line as typed, recorded in history.
    pub cmdline: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(crate::conf::DEFAULT_CONF_FILE),
            releasever: None,
            repo_state_changes: Vec::new(),
            extra_repo_files: Vec::new(),
            cache_only: false,
            refresh: false,
            assume_yes: false,
            assume_no: false,
            json: false,
            nogpgcheck: false,
            skipsignature: false,
            skipdigest: false,
            download_only: false,
            download_dir: None,
            goal: GoalOptions::default(),
            cmdline: String::new(),
        }
    }
}

/// The root object.
pub struct Session {
    /// Parsed main configuration.
    pub config: Config,
    /// Locked package names.
    pub locks: Vec<String>,
    /// Protected package names.
    pub protected: Vec<String>,
    /// Loaded repo registry.
    pub registry: RepoRegistry,
    /// Resolved `$releasever`/`$basearch`.
    pub vars: Variables,
    /// Per-repo caches/remotes, built by [`Session::refresh_metadata`].
    pub handles: RepoHandles,
    /// Metadata of refreshed repos.
    metadata: Vec<RepoMetadata>,
    /// Guards against refreshing twice in one session.
    refreshed: bool,
    /// Open history database.
    pub history: HistoryDb,
    /// rpm seam.
    backend: Box<dyn RpmBackend>,
    /// Plugin event bus.
    bus: PluginBus,
    /// Session options.
    pub options: SessionOptions,
    /// Held for the whole session when mutating.
    instance_lock: Option<fslock::LockFile>,
}

impl Session {
    /// Open a session: load config, resolve variables, load the repo
    /// registry, open history.
    pub fn open(options: SessionOptions, backend: Box<dyn RpmBackend>) -> Result<Self> {
        let LoadedConfig {
            config,
            locks,
            protected,
        } = load_config(&options.config_file)?;

        let vars = Variables::detect(backend.as_ref(), &config, options.releasever.clone())?;
        debug!(
            releasever = %vars.releasever,
            basearch = %vars.basearch,
            "resolved repo variables"
        );
        let registry = RepoRegistry::load(
            &config,
            &options.extra_repo_files,
            &options.repo_state_changes,
            &vars,
        )?;

        let persistdir = Path::new(&config.persistdir);
        fs_err::create_dir_all(persistdir)?;
        let history = HistoryDb::open(&persistdir.join("history.db"))?;

        let mut bus = PluginBus::new();
        let metalink = MetalinkPlugin::from_repos(registry.all());
        if !metalink.is_empty() {
            bus.register(Box::new(metalink));
        }
        for repo in registry.all() {
            bus.dispatch(&mut crate::plugin::PluginEvent::RepoReadConfig { repo })?;
        }

        Ok(Self {
            config,
            locks,
            protected,
            registry,
            vars,
            handles: RepoHandles::new(),
            metadata: Vec::new(),
            refreshed: false,
            history,
            backend,
            bus,
            options,
            instance_lock: None,
        })
    }

    /// The interactive answerer for this session.
    pub fn confirm(&self) -> TtyConfirm {
        TtyConfirm {
            assume_yes: self.options.assume_yes,
            assume_no: self.options.assume_no,
        }
    }

    /// The output mode for this session.
    pub fn output_mode(&self) -> OutputMode {
        if self.options.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }

    /// The rpm seam.
    pub fn backend(&self) -> &dyn RpmBackend {
        self.backend.as_ref()
    }

    /// Acquire the advisory instance lock. Non-root callers skip it:
    /// they cannot write the lock file and their operations are
    /// read-only by policy.
    pub fn acquire_instance_lock(&mut self) -> Result<()> {
        if self.instance_lock.is_some() {
            return Ok(());
        }
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 {
            debug!("not root, skipping instance lock");
            return Ok(());
        }
        let mut lock = fslock::LockFile::open(INSTANCE_LOCK_PATH)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let acquired = lock
            .try_lock()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        if !acquired {
            info!("waiting for another instance to finish");
            lock.lock()
                .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        }
        self.instance_lock = Some(lock);
        Ok(())
    }

    /// Refuse mutating work for non-root callers.
    pub fn require_root(&self) -> Result<()> {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 {
            return Err(Error::NotRoot);
        }
        Ok(())
    }

    /// Refresh every enabled repo in priority order and load its
    /// metadata. Repos with `skip_if_unavailable` that fail are disabled
    /// for the rest of the session.
    pub fn refresh_metadata(&mut self) -> Result<()> {
        if self.refreshed {
            return Ok(());
        }
        self.registry.require_enabled()?;
        let flags = RefreshFlags {
            cache_only: self.options.cache_only,
            force: self.options.refresh,
            keepcache: self.config.keepcache || self.options.download_only,
        };

        let repos: Vec<tundra_types::RepoConfig> =
            self.registry.enabled().cloned().collect();
        let mut failed_skippable = Vec::new();
        for repo in repos {
            let cache = RepoCache::new(Path::new(&self.config.cachedir), &repo);
            let mut remote = RepoRemote::new(&repo, &self.config)?;
            let result = refresh_repo(&repo, &cache, &mut remote, &mut self.bus, flags)
                .and_then(|()| load_repo_metadata(&repo, &cache));
            match result {
                Ok(metadata) => {
                    self.metadata.push(metadata);
                    self.handles.insert(RepoHandle {
                        repo,
                        cache,
                        remote,
                        keyring: None,
                    });
                }
                Err(err) if repo.skip_if_unavailable => {
                    warn!(repo = %repo.id, error = %err, "skipping unavailable repo");
                    failed_skippable.push(repo.id.clone());
                }
                Err(err) => return Err(err),
            }
        }
        for id in failed_skippable {
            self.registry.disable_for_session(&id);
        }

        // The command-line repo never refreshes, but the executor still
        // needs a handle for packages given as local rpm files.
        let cmdline = tundra_types::RepoConfig::cmdline();
        let cache = RepoCache::new(Path::new(&self.config.cachedir), &cmdline);
        let remote = RepoRemote::new(&cmdline, &self.config)?;
        self.handles.insert(RepoHandle {
            repo: cmdline,
            cache,
            remote,
            keyring: None,
        });
        self.refreshed = true;
        Ok(())
    }

    /// Metadata of the refreshed repos.
    pub fn metadata(&self) -> &[RepoMetadata] {
        &self.metadata
    }

    /// Build the solver pool: installed set plus every refreshed repo,
    /// with excludes and minversions applied; optionally load local rpm
    /// files into the command-line repo.
    pub fn build_pool(&self, cmdline_files: &[PathBuf]) -> Result<(Pool, Vec<SolvableId>)> {
        let mut pool = Pool::new();
        for record in self.backend.list_installed()? {
            pool.add_installed(record);
        }
        for metadata in &self.metadata {
            let repo = self.registry.get(&metadata.repo_id)?;
            pool.add_repo(&metadata.repo_id, repo.priority, &metadata.primary);
        }
        let mut cmdline_ids = Vec::new();
        for file in cmdline_files {
            cmdline_ids.push(goal::add_cmdline_rpm(&mut pool, file)?);
        }
        let patterns = goal::exclude_patterns(&self.config, &self.options.goal);
        goal::apply_policy(&mut pool, &patterns, &self.config.minversions);
        Ok((pool, cmdline_ids))
    }

    fn policy(&self) -> Result<GoalPolicy<'_>> {
        let auto_installed = if self.history.is_initialized()? {
            self.history.auto_installed_names()?
        } else {
            Vec::new()
        };
        Ok(GoalPolicy {
            config: &self.config,
            locks: &self.locks,
            protected: &self.protected,
            auto_installed,
        })
    }

    /// Resolve an intent against the refreshed metadata. For autoremove
    /// intents without arguments the orphan sweep drives the plan.
    pub fn resolve(&self, intent: &Intent) -> Result<SolvedPlan> {
        let cmdline_files = match intent {
            Intent::Install { specs } => goal::split_install_specs(specs).1,
            _ => Vec::new(),
        };
        if self.options.goal.source_only {
            for file in &cmdline_files {
                if !crate::rpm::is_source_rpm(file)? {
                    return Err(Error::NotSourceRpm(file.display().to_string()));
                }
            }
        }
        let (pool, cmdline_ids) = self.build_pool(&cmdline_files)?;
        let policy = self.policy()?;
        let task =
            goal::task_for_intent(intent, &pool, &cmdline_ids, &policy, &self.options.goal)?;
        let plan = BuiltinSolver.solve(&pool, &task).map_err(map_solve_error)?;
        goal::check_disk_space(&plan, Path::new(&self.config.cachedir))?;
        Ok(plan)
    }

    /// Build (once) the keyring of a repo so its downloads can be
    /// verified. A no-op for repos with `gpgcheck=0`.
    pub fn ensure_keyring(&mut self, repo_id: &str, confirm: &dyn Confirm) -> Result<()> {
        let handle = self.handles.get(repo_id)?;
        if !handle.repo.gpgcheck || handle.keyring.is_some() {
            return Ok(());
        }
        let keyring = Keyring::for_repo(
            &handle.repo,
            &handle.cache,
            &handle.remote,
            self.backend.as_ref(),
            confirm,
        )?;
        self.handles.set_keyring(repo_id, keyring);
        Ok(())
    }

    /// Build keyrings for the repos contributing downloads to a plan.
    fn prepare_keyrings(&mut self, plan: &SolvedPlan, confirm: &dyn Confirm) -> Result<()> {
        if self.options.nogpgcheck {
            return Ok(());
        }
        let repo_ids: std::collections::BTreeSet<String> =
            plan.downloads().map(|p| p.repo_id.clone()).collect();
        for repo_id in repo_ids {
            self.ensure_keyring(&repo_id, confirm)?;
        }
        Ok(())
    }

    /// Execute a resolved plan: confirm, download, verify, run the
    /// two-phase transaction, update history.
    pub fn execute(
        &mut self,
        plan: &SolvedPlan,
        erase_unneeded: bool,
        restore_flags_to: Option<i64>,
    ) -> Result<ExecuteSummary> {
        if plan.need_action() && !self.options.download_only {
            self.require_root()?;
        }
        self.acquire_instance_lock()?;
        let confirm = self.confirm();
        self.prepare_keyrings(plan, &confirm)?;

        let options = ExecuteOptions {
            download_only: self.options.download_only,
            download_dir: self.options.download_dir.clone(),
            keepcache: self.config.keepcache || self.options.download_only,
            erase_unneeded,
            verify: VerifyFlags::from_switches(
                self.options.nogpgcheck,
                self.options.skipsignature,
                self.options.skipdigest,
            ),
            nogpgcheck: self.options.nogpgcheck,
            cmdline: self.options.cmdline.clone(),
            restore_flags_to,
            openmax: self.config.openmax,
        };
        let progress = crate::progress::TextProgress::for_mode(self.output_mode());
        execute_plan(
            plan,
            &self.handles,
            self.backend.as_ref(),
            &mut self.history,
            &options,
            &confirm,
            &progress,
        )
    }

    /// Make sure the history database has a baseline.
    pub fn ensure_history_initialized(&mut self) -> Result<()> {
        if self.history.is_initialized()? {
            return Ok(());
        }
        let installed: Vec<String> = self
            .backend
            .list_installed()?
            .iter()
            .map(|r| format!("{}-{}.{}", r.name, r.evr, r.arch))
            .collect();
        let cookie = self.backend.db_cookie()?;
        let now = chrono::Utc::now().timestamp();
        self.history
            .init_baseline(&installed, &cookie, "history init", now)?;
        Ok(())
    }
}

/// A protected-package violation gets its own error kind; every other
/// problem list stays a solver error.
fn map_solve_error(err: tundra_solve::SolveError) -> Error {
    let tundra_solve::SolveError::Problems(problems) = &err;
    if let Some(protected) = problems
        .iter()
        .find(|p| p.kind == tundra_solve::ProblemKind::Protected)
    {
        return Error::Protected(protected.message.clone());
    }
    Error::Solve(err)
}
