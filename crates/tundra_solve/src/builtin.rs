//! The built-in deterministic resolver.
//!
//! This is not a backtracking SAT solver: candidates are chosen greedily
//! (best repo priority, then highest EVR) and the dependency closure is
//! walked once. Whatever cannot be satisfied that way becomes a
//! [`Problem`]; the rpm test transaction remains the final authority on
//! installability. The driver and everything above it depend only on the
//! [`crate::SolverBackend`] trait, so a libsolv-backed engine can slot in
//! without changes elsewhere.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, trace};

use tundra_repodata::Dependency;

use crate::backend::SolverBackend;
use crate::job::{Job, Selector, SolverTask};
use crate::plan::{PlanPackage, SolvedPlan};
use crate::pool::{Pool, Solvable, SolvableId};
use crate::problem::{Problem, ProblemKind};
use crate::SolveError;

/// The shipped [`SolverBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSolver;

impl SolverBackend for BuiltinSolver {
    fn solve(&self, pool: &Pool, task: &SolverTask) -> Result<SolvedPlan, SolveError> {
        Resolution::new(pool, task).run()
    }
}

/// How a chosen available solvable enters the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Install,
    DepInstall,
    Upgrade,
    Downgrade,
    Reinstall,
}

/// Why an installed solvable leaves the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Displaced {
    Upgrade,
    Downgrade,
    Obsoleted,
}

/// Mutable choice state, snapshotted around each top-level job so a
/// masked problem can unwind the partial closure it caused.
#[derive(Debug, Default, Clone)]
struct Choices {
    chosen: BTreeMap<SolvableId, ChangeKind>,
    removed: BTreeSet<SolvableId>,
    displaced: BTreeMap<SolvableId, Displaced>,
}

impl Choices {
    /// Whether an installed solvable is still part of the target state.
    fn still_installed(&self, id: SolvableId) -> bool {
        !self.removed.contains(&id) && !self.displaced.contains_key(&id)
    }
}

/// Outcome of trying to choose a candidate.
enum ChooseFail {
    /// A problem was recorded; the job is doomed.
    Hard,
    /// The problem was masked; the candidate silently drops out.
    Masked,
}

struct Resolution<'p> {
    pool: &'p Pool,
    task: &'p SolverTask,
    locked: HashSet<String>,
    choices: Choices,
    problems: Vec<Problem>,
    masked_problems: Vec<Problem>,
    not_resolved: Vec<String>,
    user_installed: Vec<String>,
}

impl<'p> Resolution<'p> {
    fn new(pool: &'p Pool, task: &'p SolverTask) -> Self {
        let locked = task
            .jobs
            .iter()
            .filter_map(|job| match job {
                Job::Lock(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        Self {
            pool,
            task,
            locked,
            choices: Choices::default(),
            problems: Vec::new(),
            masked_problems: Vec::new(),
            not_resolved: Vec::new(),
            user_installed: Vec::new(),
        }
    }

    fn run(mut self) -> Result<SolvedPlan, SolveError> {
        for job in &self.task.jobs {
            match job {
                Job::Install(sel) => self.job_install(sel),
                Job::Erase(sel) => self.job_erase(sel),
                Job::Upgrade(sel) => self.job_upgrade(sel),
                Job::UpgradeAll => self.job_upgrade_all(),
                Job::Downgrade(sel) => self.job_downgrade(sel),
                Job::Reinstall(sel) => self.job_reinstall(sel),
                Job::DistroSync => self.job_distro_sync(),
                Job::Lock(_) => {}
            }
        }
        if !self.problems.is_empty() {
            return Err(SolveError::Problems(self.problems));
        }
        Ok(self.into_plan())
    }

    // ---- job handlers ----------------------------------------------------

    fn job_install(&mut self, selector: &Selector) {
        match selector {
            Selector::Id(id) => {
                self.user_installed.push(self.pool.solvable(*id).name.clone());
                self.try_top_level(*id, ChangeKind::Install, selector);
            }
            Selector::Nevra(nevra) => {
                let found = self.pool.by_name(&nevra.name).iter().copied().find(|&id| {
                    let s = self.pool.solvable(id);
                    !s.installed && s.selectable() && s.evr == nevra.evr && s.arch == nevra.arch
                });
                match found {
                    Some(id) => {
                        self.try_top_level(id, ChangeKind::Install, selector);
                    }
                    None => self.not_resolved.push(nevra.to_string()),
                }
            }
            Selector::Name(_) | Selector::Glob(_) => {
                for name in self.expand_names(selector, false) {
                    self.install_by_name(&name);
                }
            }
        }
    }

    fn install_by_name(&mut self, name: &str) {
        self.user_installed.push(name.to_string());
        let installed = self.pool.installed_by_name(name);
        let Some(best) = self.pool.best_candidate(name) else {
            if installed.is_none() {
                self.not_resolved.push(name.to_string());
            }
            // Installed but gone from the repos: nothing to do.
            return;
        };
        if let Some(installed) = installed {
            if installed.evr >= best.evr {
                debug!(name, "already installed at best available version");
                return;
            }
            if self.locked.contains(name) {
                self.problems.push(Problem::new(
                    ProblemKind::Locked,
                    format!("{} is locked at {}", name, installed.evr),
                ));
                return;
            }
            let (best_id, installed_id) = (best.id, installed.id);
            if self.try_top_level(best_id, ChangeKind::Upgrade, &Selector::Name(name.into())) {
                self.choices.displaced.insert(installed_id, Displaced::Upgrade);
            }
            return;
        }
        let best_id = best.id;
        self.try_top_level(best_id, ChangeKind::Install, &Selector::Name(name.into()));
    }

    fn job_erase(&mut self, selector: &Selector) {
        let names = match selector {
            Selector::Nevra(nevra) => {
                match self.pool.installed_by_name(&nevra.name) {
                    Some(s) if s.evr == nevra.evr && s.arch == nevra.arch => {
                        vec![s.name.clone()]
                    }
                    _ => {
                        self.not_resolved.push(nevra.to_string());
                        return;
                    }
                }
            }
            _ => self.expand_names(selector, true),
        };
        for name in names {
            let Some(installed) = self.pool.installed_by_name(&name) else {
                self.not_resolved.push(name.clone());
                continue;
            };
            if self.is_protected(&name) {
                self.problems.push(Problem::new(
                    ProblemKind::Protected,
                    format!("{name} is protected"),
                ));
                continue;
            }
            if self.locked.contains(&name) {
                self.problems.push(Problem::new(
                    ProblemKind::Locked,
                    format!("{name} is locked"),
                ));
                continue;
            }
            let id = installed.id;
            self.remove_with_dependents(id);
        }
    }

    /// Erase an installed solvable and cascade to installed packages whose
    /// requirements it alone satisfied.
    fn remove_with_dependents(&mut self, id: SolvableId) {
        let mut worklist = vec![id];
        while let Some(id) = worklist.pop() {
            if !self.choices.removed.insert(id) {
                continue;
            }
            let removed = self.pool.solvable(id);
            trace!(package = %removed.nevra(), "erasing");
            for dependent in self.pool.installed() {
                if !self.choices.still_installed(dependent.id) {
                    continue;
                }
                for req in &dependent.requires {
                    if is_rpmlib(req) {
                        continue;
                    }
                    let provided_by_removed = removed
                        .provides
                        .iter()
                        .any(|p| p.name == req.name && crate::pool::deps_overlap(p, req));
                    if !provided_by_removed {
                        continue;
                    }
                    if !self.requirement_satisfied(req) {
                        if self.is_protected(&dependent.name) {
                            self.problems.push(Problem::new(
                                ProblemKind::Protected,
                                format!(
                                    "removing {} would break protected package {}",
                                    removed.name, dependent.name
                                ),
                            ));
                        } else {
                            worklist.push(dependent.id);
                        }
                    }
                }
            }
        }
    }

    fn job_upgrade(&mut self, selector: &Selector) {
        for name in self.expand_names(selector, true) {
            let Some(installed) = self.pool.installed_by_name(&name) else {
                self.not_resolved.push(name.clone());
                continue;
            };
            if self.locked.contains(&name) {
                continue;
            }
            let Some(best) = self.pool.best_candidate(&name) else {
                continue;
            };
            if best.evr > installed.evr {
                let (best_id, installed_id) = (best.id, installed.id);
                if self.try_top_level(best_id, ChangeKind::Upgrade, selector) {
                    self.choices.displaced.insert(installed_id, Displaced::Upgrade);
                }
            }
        }
    }

    fn job_upgrade_all(&mut self) {
        let names: Vec<String> = {
            let mut names: Vec<String> =
                self.pool.installed().map(|s| s.name.clone()).collect();
            names.sort_unstable();
            names.dedup();
            names
        };
        for name in &names {
            if self.locked.contains(name) {
                continue;
            }
            self.job_upgrade(&Selector::Name(name.clone()));
        }
        if self.task.flags.obey_obsoletes {
            self.apply_obsoletes_sweep();
        }
    }

    /// During upgrade-all, install available packages that obsolete
    /// installed ones and retire the obsoleted packages.
    fn apply_obsoletes_sweep(&mut self) {
        let installed: Vec<SolvableId> = self.pool.installed().map(|s| s.id).collect();
        for inst_id in installed {
            if !self.choices.still_installed(inst_id) {
                continue;
            }
            let inst = self.pool.solvable(inst_id);
            let mut successor: Option<SolvableId> = None;
            for avail in self.pool.available() {
                if !avail.selectable() || self.locked.contains(&avail.name) {
                    continue;
                }
                let obsoletes_inst = avail.obsoletes.iter().any(|o| {
                    o.name == inst.name && o.satisfied_by(Some(&inst.evr))
                });
                if obsoletes_inst {
                    let better = match successor {
                        Some(cur) => {
                            let cur = self.pool.solvable(cur);
                            avail.repo_priority < cur.repo_priority
                                || (avail.repo_priority == cur.repo_priority
                                    && avail.evr > cur.evr)
                        }
                        None => true,
                    };
                    if better {
                        successor = Some(avail.id);
                    }
                }
            }
            if let Some(succ) = successor {
                if self.try_top_level(succ, ChangeKind::DepInstall, &Selector::Id(succ)) {
                    self.choices.displaced.insert(inst_id, Displaced::Obsoleted);
                }
            }
        }
    }

    fn job_downgrade(&mut self, selector: &Selector) {
        for name in self.expand_names(selector, true) {
            let Some(installed) = self.pool.installed_by_name(&name) else {
                self.not_resolved.push(name.clone());
                continue;
            };
            if self.locked.contains(&name) {
                self.problems.push(Problem::new(
                    ProblemKind::Locked,
                    format!("{name} is locked"),
                ));
                continue;
            }
            let target = self
                .pool
                .candidates_by_name(&name)
                .into_iter()
                .filter(|c| c.evr < installed.evr)
                .max_by(|a, b| a.evr.cmp(&b.evr))
                .map(|c| c.id);
            match target {
                Some(target_id) => {
                    let installed_id = installed.id;
                    if self.try_top_level(target_id, ChangeKind::Downgrade, selector) {
                        self.choices
                            .displaced
                            .insert(installed_id, Displaced::Downgrade);
                    }
                }
                None => {
                    self.problems.push(Problem::new(
                        ProblemKind::NoDowngradePath,
                        format!("no version of {} below {}", name, installed.evr),
                    ));
                }
            }
        }
    }

    fn job_reinstall(&mut self, selector: &Selector) {
        for name in self.expand_names(selector, true) {
            let Some(installed) = self.pool.installed_by_name(&name) else {
                self.not_resolved.push(name.clone());
                continue;
            };
            let same = self.pool.by_name(&name).iter().copied().find(|&id| {
                let s = self.pool.solvable(id);
                !s.installed && s.selectable() && s.evr == installed.evr && s.arch == installed.arch
            });
            match same {
                Some(id) => {
                    self.try_top_level(id, ChangeKind::Reinstall, selector);
                }
                None => self.not_resolved.push(name.clone()),
            }
        }
    }

    fn job_distro_sync(&mut self) {
        let names: Vec<String> = {
            let mut names: Vec<String> =
                self.pool.installed().map(|s| s.name.clone()).collect();
            names.sort_unstable();
            names.dedup();
            names
        };
        for name in names {
            if self.locked.contains(&name) {
                continue;
            }
            let Some(installed) = self.pool.installed_by_name(&name) else {
                continue;
            };
            let Some(best) = self.pool.best_candidate(&name) else {
                // Not in any repo; distro-sync leaves extras alone.
                continue;
            };
            let (best_id, installed_id) = (best.id, installed.id);
            match best.evr.cmp(&installed.evr) {
                std::cmp::Ordering::Greater => {
                    if self.try_top_level(best_id, ChangeKind::Upgrade, &Selector::Name(name)) {
                        self.choices.displaced.insert(installed_id, Displaced::Upgrade);
                    }
                }
                std::cmp::Ordering::Less if self.task.flags.allow_downgrade => {
                    if self.try_top_level(best_id, ChangeKind::Downgrade, &Selector::Name(name)) {
                        self.choices
                            .displaced
                            .insert(installed_id, Displaced::Downgrade);
                    }
                }
                _ => {}
            }
        }
    }

    // ---- the closure -----------------------------------------------------

    /// Choose a candidate at the top level, snapshotting so a masked
    /// problem unwinds the partial closure. Returns whether the candidate
    /// went in.
    fn try_top_level(&mut self, id: SolvableId, kind: ChangeKind, origin: &Selector) -> bool {
        let snapshot = self.choices.clone();
        let mut in_progress = HashSet::new();
        match self.choose(id, kind, &mut in_progress) {
            Ok(()) => true,
            Err(ChooseFail::Masked) => {
                self.choices = snapshot;
                self.not_resolved.push(origin.display());
                false
            }
            Err(ChooseFail::Hard) => {
                self.choices = snapshot;
                false
            }
        }
    }

    fn choose(
        &mut self,
        id: SolvableId,
        kind: ChangeKind,
        in_progress: &mut HashSet<SolvableId>,
    ) -> Result<(), ChooseFail> {
        if self.choices.chosen.contains_key(&id) || !in_progress.insert(id) {
            return Ok(());
        }
        let candidate = self.pool.solvable(id);
        trace!(package = %candidate.nevra(), ?kind, "considering");

        self.check_conflicts(candidate)?;
        self.check_obsoleted_by_others(candidate)?;
        self.choices.chosen.insert(id, kind);

        // Displace whatever the candidate obsoletes.
        for inst in self.pool.installed() {
            if !self.choices.still_installed(inst.id) {
                continue;
            }
            let obsoleted = candidate
                .obsoletes
                .iter()
                .any(|o| o.name == inst.name && o.satisfied_by(Some(&inst.evr)));
            if obsoleted {
                self.choices.displaced.insert(inst.id, Displaced::Obsoleted);
            }
        }

        for req in candidate.requires.clone() {
            if is_rpmlib(&req) {
                continue;
            }
            if self.requirement_satisfied(&req) {
                continue;
            }
            let provider = self
                .pool
                .providers_of(&req)
                .into_iter()
                .find(|p| !p.installed)
                .map(|p| p.id);
            match provider {
                Some(provider) => {
                    self.choose(provider, ChangeKind::DepInstall, in_progress)?;
                }
                None => {
                    let problem = Problem::new(
                        ProblemKind::BrokenDependency,
                        format!(
                            "nothing provides {} needed by {}",
                            req.name,
                            candidate.nevra()
                        ),
                    );
                    return Err(self.report(problem, self.task.flags.skip_broken));
                }
            }
        }
        Ok(())
    }

    /// A requirement is satisfied when a still-installed package or an
    /// already-chosen candidate provides it.
    fn requirement_satisfied(&self, req: &Dependency) -> bool {
        self.pool.providers_of(req).iter().any(|p| {
            if p.installed {
                self.choices.still_installed(p.id)
            } else {
                self.choices.chosen.contains_key(&p.id)
            }
        })
    }

    fn check_conflicts(&mut self, candidate: &Solvable) -> Result<(), ChooseFail> {
        let masked = self.task.flags.skip_conflicts;
        // Candidate conflicts with present packages.
        for conflict in &candidate.conflicts {
            let hit = self.present_solvables().find(|other| {
                other.name != candidate.name
                    && other
                        .provides
                        .iter()
                        .any(|p| p.name == conflict.name && crate::pool::deps_overlap(p, conflict))
            });
            if let Some(other) = hit {
                let problem = Problem::new(
                    ProblemKind::Conflict,
                    format!("{} conflicts with {}", candidate.nevra(), other.nevra()),
                );
                return Err(self.report(problem, masked));
            }
        }
        // Present packages conflict with the candidate.
        let reverse_hit = self
            .present_solvables()
            .filter(|other| other.name != candidate.name)
            .find(|other| {
                other.conflicts.iter().any(|c| {
                    candidate
                        .provides
                        .iter()
                        .any(|p| p.name == c.name && crate::pool::deps_overlap(p, c))
                })
            });
        if let Some(other) = reverse_hit {
            let problem = Problem::new(
                ProblemKind::Conflict,
                format!("{} conflicts with {}", other.nevra(), candidate.nevra()),
            );
            return Err(self.report(problem, masked));
        }
        Ok(())
    }

    /// An installed or chosen package obsoleting the candidate blocks it.
    fn check_obsoleted_by_others(&mut self, candidate: &Solvable) -> Result<(), ChooseFail> {
        let masked = self.task.flags.skip_obsoletes;
        let hit = self
            .present_solvables()
            .filter(|other| other.name != candidate.name)
            .find(|other| {
                other
                    .obsoletes
                    .iter()
                    .any(|o| o.name == candidate.name && o.satisfied_by(Some(&candidate.evr)))
            });
        if let Some(other) = hit {
            let problem = Problem::new(
                ProblemKind::Obsoletes,
                format!("{} is obsoleted by {}", candidate.nevra(), other.nevra()),
            );
            return Err(self.report(problem, masked));
        }
        Ok(())
    }

    /// Installed-and-kept packages plus chosen candidates.
    fn present_solvables(&self) -> impl Iterator<Item = &Solvable> {
        let chosen = &self.choices.chosen;
        let choices = &self.choices;
        self.pool
            .solvables()
            .filter(move |s| {
                if s.installed {
                    choices.still_installed(s.id)
                } else {
                    chosen.contains_key(&s.id)
                }
            })
    }

    fn report(&mut self, problem: Problem, masked: bool) -> ChooseFail {
        if masked {
            debug!(problem = %problem, "problem masked by skip flags");
            self.masked_problems.push(problem);
            ChooseFail::Masked
        } else {
            self.problems.push(problem);
            ChooseFail::Hard
        }
    }

    // ---- helpers ---------------------------------------------------------

    fn is_protected(&self, name: &str) -> bool {
        self.task.protected.iter().any(|p| p == name)
    }

    /// Expand a name/glob selector to concrete names. With
    /// `installed_only`, globs match the installed set, otherwise the
    /// whole pool.
    fn expand_names(&mut self, selector: &Selector, installed_only: bool) -> Vec<String> {
        match selector {
            Selector::Name(name) => vec![name.clone()],
            Selector::Glob(pattern) => match glob::Pattern::new(pattern) {
                Ok(glob) => {
                    let names: Vec<String> = self
                        .pool
                        .names_matching(&glob)
                        .into_iter()
                        .filter(|name| {
                            !installed_only || self.pool.installed_by_name(name).is_some()
                        })
                        .map(str::to_string)
                        .collect();
                    if names.is_empty() {
                        self.not_resolved.push(pattern.clone());
                    }
                    names
                }
                Err(_) => {
                    self.not_resolved.push(pattern.clone());
                    Vec::new()
                }
            },
            Selector::Id(id) => vec![self.pool.solvable(*id).name.clone()],
            Selector::Nevra(nevra) => vec![nevra.name.clone()],
        }
    }

    // ---- plan assembly ---------------------------------------------------

    fn into_plan(mut self) -> SolvedPlan {
        let mut plan = SolvedPlan::default();

        let chosen = std::mem::take(&mut self.choices.chosen);
        for (&id, &kind) in &chosen {
            let pkg = PlanPackage::from(self.pool.solvable(id));
            match kind {
                ChangeKind::Install | ChangeKind::DepInstall => plan.to_install.push(pkg),
                ChangeKind::Upgrade => plan.to_upgrade.push(pkg),
                ChangeKind::Downgrade => plan.to_downgrade.push(pkg),
                ChangeKind::Reinstall => plan.to_reinstall.push(pkg),
            }
        }
        for (&id, &why) in &self.choices.displaced {
            let pkg = PlanPackage::from(self.pool.solvable(id));
            match why {
                Displaced::Obsoleted => plan.obsoleted.push(pkg),
                Displaced::Downgrade => plan.removed_by_downgrade.push(pkg),
                Displaced::Upgrade => {}
            }
        }
        for &id in &self.choices.removed {
            plan.to_remove.push(PlanPackage::from(self.pool.solvable(id)));
        }

        if self.task.flags.clean_deps && !self.task.flags.keep_orphans {
            plan.unneeded = self.compute_unneeded(&chosen);
        }

        for list in [
            &mut plan.to_install,
            &mut plan.to_upgrade,
            &mut plan.to_downgrade,
            &mut plan.to_remove,
            &mut plan.to_reinstall,
            &mut plan.obsoleted,
            &mut plan.unneeded,
            &mut plan.removed_by_downgrade,
        ] {
            list.sort_by(|a, b| a.nevra.cmp(&b.nevra));
        }

        self.user_installed.sort_unstable();
        self.user_installed.dedup();
        plan.user_installed = self.user_installed;
        plan.not_resolved = self.not_resolved;
        plan.masked_problems = self.masked_problems;
        plan
    }

    /// Fixed-point sweep: an auto-installed package is unneeded when no
    /// remaining package requires anything it provides.
    fn compute_unneeded(&self, chosen: &BTreeMap<SolvableId, ChangeKind>) -> Vec<PlanPackage> {
        let auto: HashSet<&str> = self.task.auto_installed.iter().map(String::as_str).collect();
        let mut unneeded: BTreeSet<SolvableId> = BTreeSet::new();

        loop {
            let mut changed = false;
            for candidate in self.pool.installed() {
                if unneeded.contains(&candidate.id)
                    || !self.choices.still_installed(candidate.id)
                    || !auto.contains(candidate.name.as_str())
                    || self.is_protected(&candidate.name)
                {
                    continue;
                }
                let required = self
                    .pool
                    .solvables()
                    .filter(|other| other.id != candidate.id)
                    .filter(|other| {
                        if other.installed {
                            self.choices.still_installed(other.id)
                                && !unneeded.contains(&other.id)
                        } else {
                            chosen.contains_key(&other.id)
                        }
                    })
                    .any(|other| {
                        other.requires.iter().any(|req| {
                            candidate.provides.iter().any(|p| {
                                p.name == req.name && crate::pool::deps_overlap(p, req)
                            })
                        })
                    });
                if !required {
                    unneeded.insert(candidate.id);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        unneeded
            .into_iter()
            .map(|id| PlanPackage::from(self.pool.solvable(id)))
            .collect()
    }
}

fn is_rpmlib(dep: &Dependency) -> bool {
    dep.name.starts_with("rpmlib(")
}
