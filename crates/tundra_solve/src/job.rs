//! Solver jobs: what the driver asks the backend to do.

use tundra_types::Nevra;

use crate::pool::SolvableId;

/// How a job names its target packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// An exact package name.
    Name(String),
    /// A shell glob over package names.
    Glob(String),
    /// A specific solvable, e.g. a command-line rpm file.
    Id(SolvableId),
    /// An exact NEVRA, e.g. a history replay target.
    Nevra(Nevra),
}

impl Selector {
    /// Parse a user argument: globs stay globs, everything else is a
    /// plain name.
    pub fn from_spec(spec: &str) -> Selector {
        if spec.contains(['*', '?', '[']) {
            Selector::Glob(spec.to_string())
        } else {
            Selector::Name(spec.to_string())
        }
    }

    /// The textual form used in problem messages and `not_resolved`.
    pub fn display(&self) -> String {
        match self {
            Selector::Name(name) | Selector::Glob(name) => name.clone(),
            Selector::Id(id) => format!("#{id}"),
            Selector::Nevra(nevra) => nevra.to_string(),
        }
    }
}

/// One unit of work for the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Install the best candidate of the selector.
    Install(Selector),
    /// Erase installed packages matching the selector.
    Erase(Selector),
    /// Upgrade installed packages matching the selector.
    Upgrade(Selector),
    /// Upgrade everything.
    UpgradeAll,
    /// Install the highest available EVR strictly below the installed one.
    Downgrade(Selector),
    /// Re-install the identical NEVRA from an available repo.
    Reinstall(Selector),
    /// Make the installed set match the repos exactly (up or down).
    DistroSync,
    /// Pin an installed package to its installed version.
    Lock(String),
}

/// Switches applied to every solve.
#[derive(Debug, Clone, Default)]
pub struct SolverFlags {
    /// Permit removing installed packages to satisfy the jobs.
    pub allow_uninstall: bool,
    /// Fail rather than settle for anything but the best candidate.
    pub force_best: bool,
    /// Drop no-longer-needed dependencies of erased packages.
    pub clean_deps: bool,
    /// Permit implicit downgrades (distro-sync).
    pub allow_downgrade: bool,
    /// Follow obsoletes during upgrade-all.
    pub obey_obsoletes: bool,
    /// Keep orphaned dependencies rather than reporting them unneeded.
    pub keep_orphans: bool,
    /// Suppress conflict problems, dropping the offending candidate.
    pub skip_conflicts: bool,
    /// Suppress obsoletes problems, dropping the offending candidate.
    pub skip_obsoletes: bool,
    /// Suppress broken-dependency problems, dropping the offending
    /// candidate.
    pub skip_broken: bool,
}

/// A complete request for one resolve.
#[derive(Debug, Clone, Default)]
pub struct SolverTask {
    /// The work items.
    pub jobs: Vec<Job>,
    /// Global switches.
    pub flags: SolverFlags,
    /// Names recorded in history as auto-installed; candidates for
    /// orphan cleanup.
    pub auto_installed: Vec<String>,
    /// Names that must never be removed.
    pub protected: Vec<String>,
}
