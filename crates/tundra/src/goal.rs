//! The resolver driver: user intents in, solver jobs out.

use std::path::{Path, PathBuf};

use tracing::debug;

use tundra_solve::{Job, Pool, Selector, SolvableId, SolverFlags, SolverTask};
use tundra_types::{Config, Nevra, VersionPin, CMDLINE_REPO_ID};

use crate::error::{Error, Result};
use crate::rpm;

/// What the user asked for.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Install names, globs or local rpm files.
    Install {
        /// Package specs; entries ending in `.rpm` are file paths.
        specs: Vec<String>,
    },
    /// Erase installed packages.
    Erase {
        /// Package specs.
        specs: Vec<String>,
    },
    /// Upgrade named packages, or everything when empty.
    Upgrade {
        /// Package specs; empty means upgrade-all.
        specs: Vec<String>,
    },
    /// Downgrade named packages.
    Downgrade {
        /// Package specs.
        specs: Vec<String>,
    },
    /// Reinstall named packages at their installed NEVRA.
    Reinstall {
        /// Package specs.
        specs: Vec<String>,
    },
    /// Synchronize the installed set with the repos, both directions.
    DistroSync,
    /// Erase auto-installed orphans, or the named packages plus their
    /// orphaned dependencies.
    AutoErase {
        /// Package specs; empty means every orphan.
        specs: Vec<String>,
    },
    /// Dependency-check every available package without installing.
    Check,
    /// Replay a history delta: install and erase exact NEVRAs.
    Replay {
        /// NEVRAs to install.
        install: Vec<Nevra>,
        /// NEVRAs to erase.
        erase: Vec<Nevra>,
    },
}

impl Intent {
    /// Whether this intent implies removing packages (and therefore
    /// `ALLOW_UNINSTALL`).
    fn implies_uninstall(&self) -> bool {
        matches!(
            self,
            Intent::Erase { .. }
                | Intent::AutoErase { .. }
                | Intent::DistroSync
                | Intent::Replay { .. }
        )
    }
}

/// Per-invocation switches affecting the solve.
#[derive(Debug, Clone, Default)]
pub struct GoalOptions {
    /// `--best`: fail rather than settle for a lesser candidate.
    pub best: bool,
    /// `--allowerasing`.
    pub allow_erasing: bool,
    /// `--skipconflicts`.
    pub skip_conflicts: bool,
    /// `--skipobsoletes`.
    pub skip_obsoletes: bool,
    /// `--skipbroken`.
    pub skip_broken: bool,
    /// Extra `--exclude` globs on top of the config's `excludepkgs`.
    pub excludes: Vec<String>,
    /// `--source`: command-line rpm arguments must be source packages.
    pub source_only: bool,
}

/// Everything the driver applies to the pool before solving.
pub struct GoalPolicy<'a> {
    /// Main configuration.
    pub config: &'a Config,
    /// Locked names from `locks.d` (only installed ones become jobs).
    pub locks: &'a [String],
    /// Protected names from `protected.d`.
    pub protected: &'a [String],
    /// History auto-installed names, for orphan handling.
    pub auto_installed: Vec<String>,
}

/// Build the shared glob set from config excludes plus command-line
/// excludes.
pub fn exclude_patterns(config: &Config, options: &GoalOptions) -> Vec<glob::Pattern> {
    config
        .excludepkgs
        .iter()
        .chain(options.excludes.iter())
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect()
}

/// Apply excludes and minversions to a freshly built pool.
pub fn apply_policy(pool: &mut Pool, patterns: &[glob::Pattern], pins: &[VersionPin]) {
    pool.apply_excludes(patterns);
    pool.apply_min_versions(pins);
}

/// Load a local rpm file into the command-line repo portion of the pool.
pub fn add_cmdline_rpm(pool: &mut Pool, path: &Path) -> Result<SolvableId> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.display().to_string()));
    }
    let nevra = rpm::nevra_of_rpm_file(path)?;
    let size = fs_err::metadata(path)?.len();
    let record = tundra_repodata::PrimaryPackage {
        name: nevra.name.clone(),
        arch: nevra.arch.clone(),
        evr: nevra.evr.clone(),
        checksum: tundra_types::Checksum::new(tundra_types::ChecksumKind::Sha256, String::new()),
        summary: String::new(),
        description: String::new(),
        url: String::new(),
        license: String::new(),
        location: path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string(),
        download_size: size,
        install_size: 0,
        source_rpm: String::new(),
        header_range: Default::default(),
        provides: Vec::new(),
        requires: Vec::new(),
        conflicts: Vec::new(),
        obsoletes: Vec::new(),
        files: Vec::new(),
    };
    Ok(pool.add_available(CMDLINE_REPO_ID, 0, &record))
}

/// Split install specs into names and rpm file paths.
pub fn split_install_specs(specs: &[String]) -> (Vec<String>, Vec<PathBuf>) {
    let mut names = Vec::new();
    let mut files = Vec::new();
    for spec in specs {
        if spec.ends_with(".rpm") {
            files.push(PathBuf::from(spec));
        } else {
            names.push(spec.clone());
        }
    }
    (names, files)
}

/// Translate an intent into solver jobs against the given pool.
/// Command-line rpm files must already be in the pool; their ids are
/// passed in `cmdline_ids`.
pub fn jobs_for_intent(
    intent: &Intent,
    pool: &Pool,
    cmdline_ids: &[SolvableId],
    policy: &GoalPolicy<'_>,
) -> Result<Vec<Job>> {
    let mut jobs = Vec::new();
    match intent {
        Intent::Install { specs } => {
            let (names, files) = split_install_specs(specs);
            if names.is_empty() && files.is_empty() {
                return Err(Error::PackageRequired);
            }
            for id in cmdline_ids {
                jobs.push(Job::Install(Selector::Id(*id)));
            }
            for name in names {
                jobs.push(Job::Install(Selector::from_spec(&name)));
            }
        }
        Intent::Erase { specs } => {
            if specs.is_empty() {
                return Err(Error::PackageRequired);
            }
            for spec in specs {
                jobs.push(Job::Erase(Selector::from_spec(spec)));
            }
        }
        Intent::Upgrade { specs } => {
            if specs.is_empty() {
                jobs.push(Job::UpgradeAll);
            } else {
                for spec in specs {
                    jobs.push(Job::Upgrade(Selector::from_spec(spec)));
                }
            }
        }
        Intent::Downgrade { specs } => {
            if specs.is_empty() {
                return Err(Error::PackageRequired);
            }
            for spec in specs {
                jobs.push(Job::Downgrade(Selector::from_spec(spec)));
            }
        }
        Intent::Reinstall { specs } => {
            if specs.is_empty() {
                return Err(Error::PackageRequired);
            }
            for spec in specs {
                jobs.push(Job::Reinstall(Selector::from_spec(spec)));
            }
        }
        Intent::DistroSync => jobs.push(Job::DistroSync),
        Intent::AutoErase { specs } => {
            if specs.is_empty() {
                // every name history knows as auto-installed and that is
                // still installed becomes an erase candidate through the
                // orphan sweep; explicit jobs are not needed
            } else {
                for spec in specs {
                    jobs.push(Job::Erase(Selector::from_spec(spec)));
                }
            }
        }
        Intent::Check => {
            for solvable in pool.available() {
                if solvable.selectable() {
                    jobs.push(Job::Install(Selector::Id(solvable.id)));
                }
            }
        }
        Intent::Replay { install, erase } => {
            for nevra in install {
                jobs.push(Job::Install(Selector::Nevra(nevra.clone())));
            }
            for nevra in erase {
                jobs.push(Job::Erase(Selector::Nevra(nevra.clone())));
            }
        }
    }

    // Locked installed packages pin their version in every solve.
    for name in policy.locks {
        if pool.installed_by_name(name).is_some() {
            jobs.push(Job::Lock(name.clone()));
        }
    }
    Ok(jobs)
}

/// Assemble the solver task for an intent.
pub fn task_for_intent(
    intent: &Intent,
    pool: &Pool,
    cmdline_ids: &[SolvableId],
    policy: &GoalPolicy<'_>,
    options: &GoalOptions,
) -> Result<SolverTask> {
    let jobs = jobs_for_intent(intent, pool, cmdline_ids, policy)?;
    let autoerase = matches!(intent, Intent::AutoErase { .. });
    let flags = SolverFlags {
        allow_uninstall: options.allow_erasing || intent.implies_uninstall(),
        force_best: options.best,
        clean_deps: autoerase || policy.config.clean_requirements_on_remove,
        allow_downgrade: matches!(intent, Intent::DistroSync | Intent::Downgrade { .. }),
        obey_obsoletes: true,
        keep_orphans: false,
        skip_conflicts: options.skip_conflicts,
        skip_obsoletes: options.skip_obsoletes,
        skip_broken: options.skip_broken,
    };
    debug!(?flags, jobs = jobs.len(), "assembled solver task");
    Ok(SolverTask {
        jobs,
        flags,
        auto_installed: policy.auto_installed.clone(),
        protected: policy.protected.to_vec(),
    })
}

/// Reject plans whose downloads cannot fit in the cache filesystem.
pub fn check_disk_space(plan: &tundra_solve::SolvedPlan, cache_root: &Path) -> Result<()> {
    let needed = plan.download_size();
    if needed == 0 {
        return Ok(());
    }
    let available = available_bytes(cache_root)?;
    if needed > available {
        debug!(needed, available, "plan exceeds cache filesystem space");
        return Err(Error::CacheDirOutOfDiskSpace);
    }
    Ok(())
}

fn available_bytes(path: &Path) -> Result<u64> {
    use std::os::unix::ffi::OsStrExt;
    let cstr = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::InvalidInput(format!("bad path {}", path.display())))?;
    // SAFETY: statvfs writes into the zeroed struct on success.
    unsafe {
        let mut stat: libc::statvfs = std::mem::zeroed();
        if libc::statvfs(cstr.as_ptr(), &mut stat) != 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(stat.f_bsize as u64 * stat.f_bavail as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tundra_solve::{InstalledRecord, SolvedPlan};

    fn policy_fixture(config: &Config) -> GoalPolicy<'_> {
        GoalPolicy {
            config,
            locks: &[],
            protected: &[],
            auto_installed: Vec::new(),
        }
    }

    #[test]
    fn empty_specs_rejected_where_required() {
        let pool = Pool::new();
        let config = Config::default();
        let policy = policy_fixture(&config);
        for intent in [
            Intent::Install { specs: vec![] },
            Intent::Erase { specs: vec![] },
            Intent::Reinstall { specs: vec![] },
            Intent::Downgrade { specs: vec![] },
        ] {
            let err = jobs_for_intent(&intent, &pool, &[], &policy).unwrap_err();
            assert_matches!(err, Error::PackageRequired);
        }
    }

    #[test]
    fn upgrade_with_no_args_is_upgrade_all() {
        let pool = Pool::new();
        let config = Config::default();
        let policy = policy_fixture(&config);
        let jobs =
            jobs_for_intent(&Intent::Upgrade { specs: vec![] }, &pool, &[], &policy).unwrap();
        assert_eq!(jobs, vec![Job::UpgradeAll]);
    }

    #[test]
    fn install_splits_files_and_names() {
        let (names, files) = split_install_specs(&[
            "vim".to_string(),
            "/tmp/foo-1.0-1.x86_64.rpm".to_string(),
        ]);
        assert_eq!(names, vec!["vim"]);
        assert_eq!(files, vec![PathBuf::from("/tmp/foo-1.0-1.x86_64.rpm")]);
    }

    #[test]
    fn locks_only_apply_to_installed_names() {
        let mut pool = Pool::new();
        pool.add_installed(InstalledRecord {
            name: "kernel".to_string(),
            evr: tundra_types::Evr::new(0, "6.1", "1"),
            arch: "x86_64".to_string(),
            install_size: 0,
            provides: Vec::new(),
            requires: Vec::new(),
            summary: String::new(),
        });
        let config = Config::default();
        let locks = vec!["kernel".to_string(), "not-installed".to_string()];
        let policy = GoalPolicy {
            config: &config,
            locks: &locks,
            protected: &[],
            auto_installed: Vec::new(),
        };
        let jobs =
            jobs_for_intent(&Intent::Upgrade { specs: vec![] }, &pool, &[], &policy).unwrap();
        assert!(jobs.contains(&Job::Lock("kernel".to_string())));
        assert!(!jobs.contains(&Job::Lock("not-installed".to_string())));
    }

    #[test]
    fn flags_follow_intent() {
        let pool = Pool::new();
        let config = Config {
            clean_requirements_on_remove: true,
            ..Default::default()
        };
        let policy = policy_fixture(&config);
        let options = GoalOptions {
            best: true,
            ..Default::default()
        };

        let task = task_for_intent(
            &Intent::Erase {
                specs: vec!["x".to_string()],
            },
            &pool,
            &[],
            &policy,
            &options,
        )
        .unwrap();
        assert!(task.flags.allow_uninstall);
        assert!(task.flags.clean_deps);
        assert!(task.flags.force_best);
        assert!(!task.flags.allow_downgrade);

        let task = task_for_intent(&Intent::DistroSync, &pool, &[], &policy, &options).unwrap();
        assert!(task.flags.allow_downgrade);
    }

    #[test]
    fn disk_space_guard_passes_for_empty_plans() {
        let dir = tempfile::tempdir().unwrap();
        let plan = SolvedPlan::default();
        check_disk_space(&plan, dir.path()).unwrap();
    }

    #[test]
    fn disk_space_guard_rejects_absurd_plans() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = SolvedPlan::default();
        plan.to_install.push(tundra_solve::PlanPackage {
            nevra: Nevra::new("huge", tundra_types::Evr::new(0, "1", "1"), "x86_64"),
            repo_id: "r1".to_string(),
            location: "rpms/huge.rpm".to_string(),
            checksum: None,
            download_size: u64::MAX,
            install_size: 0,
        });
        let err = check_disk_space(&plan, dir.path()).unwrap_err();
        assert_matches!(err, Error::CacheDirOutOfDiskSpace);
    }
}
