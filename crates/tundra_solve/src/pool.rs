//! The solvable pool: the universe the solver reasons over.

use std::cmp::Ordering;
use std::collections::HashMap;

use tundra_repodata::{DepFlags, Dependency, PrimaryMetadata, PrimaryPackage};
use tundra_types::{Checksum, Evr, Nevra, VersionPin, SYSTEM_REPO_ID};

/// Index of a solvable within its pool, valid for one resolver session.
pub type SolvableId = usize;

/// One unit the solver can choose: an available package record or an
/// installed package.
#[derive(Debug, Clone)]
pub struct Solvable {
    /// Pool-assigned id.
    pub id: SolvableId,
    /// Owning repo id; `@system` for installed packages.
    pub repo_id: String,
    /// Refresh priority of the owning repo; lower is preferred.
    pub repo_priority: u32,
    /// Package name.
    pub name: String,
    /// Epoch, version, release.
    pub evr: Evr,
    /// Architecture.
    pub arch: String,
    /// Location relative to the repo root; empty for installed packages.
    pub location: String,
    /// Declared file digest, when known.
    pub checksum: Option<Checksum>,
    /// Declared file size.
    pub download_size: u64,
    /// Installed payload size.
    pub install_size: u64,
    /// One-line summary.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Upstream URL.
    pub url: String,
    /// License.
    pub license: String,
    /// Source rpm file name.
    pub source_rpm: String,
    /// Provided capabilities (always includes the self-provide).
    pub provides: Vec<Dependency>,
    /// Required capabilities.
    pub requires: Vec<Dependency>,
    /// Conflicting capabilities.
    pub conflicts: Vec<Dependency>,
    /// Obsoleted capabilities.
    pub obsoletes: Vec<Dependency>,
    /// Files listed in primary metadata.
    pub files: Vec<String>,
    /// Whether this solvable represents an installed package.
    pub installed: bool,
    /// Excluded by config or command line; never chosen, never a job
    /// target.
    pub excluded: bool,
    /// Masked by a minimum-version pin; never chosen.
    pub considered: bool,
}

impl Solvable {
    /// The package identity.
    pub fn nevra(&self) -> Nevra {
        Nevra::new(self.name.clone(), self.evr.clone(), self.arch.clone())
    }

    /// Whether this solvable may be picked by the solver.
    pub fn selectable(&self) -> bool {
        self.considered && !self.excluded
    }

    /// Whether this is a source package.
    pub fn is_source(&self) -> bool {
        self.arch == "src" || self.arch == "nosrc"
    }
}

/// An installed package as reported by the rpm database.
///
/// The production backend fills in only the self-provide; tests populate
/// full dependency data. The authoritative dependency check is the rpm
/// test transaction either way.
#[derive(Debug, Clone, Default)]
pub struct InstalledRecord {
    /// Package name.
    pub name: String,
    /// Epoch, version, release.
    pub evr: Evr,
    /// Architecture.
    pub arch: String,
    /// Installed payload size.
    pub install_size: u64,
    /// Provided capabilities.
    pub provides: Vec<Dependency>,
    /// Required capabilities.
    pub requires: Vec<Dependency>,
    /// Summary, when the backend reports one.
    pub summary: String,
}

/// The in-memory universe of solvables.
#[derive(Debug, Default)]
pub struct Pool {
    solvables: Vec<Solvable>,
    by_name: HashMap<String, Vec<SolvableId>>,
    providers: HashMap<String, Vec<SolvableId>>,
    file_providers: HashMap<String, Vec<SolvableId>>,
}

impl Pool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of solvables.
    pub fn len(&self) -> usize {
        self.solvables.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.solvables.is_empty()
    }

    /// Access a solvable by id.
    pub fn solvable(&self, id: SolvableId) -> &Solvable {
        &self.solvables[id]
    }

    /// Iterate over all solvables.
    pub fn solvables(&self) -> impl Iterator<Item = &Solvable> {
        self.solvables.iter()
    }

    /// Iterate over installed solvables.
    pub fn installed(&self) -> impl Iterator<Item = &Solvable> {
        self.solvables.iter().filter(|s| s.installed)
    }

    /// Iterate over available (non-installed) solvables.
    pub fn available(&self) -> impl Iterator<Item = &Solvable> {
        self.solvables.iter().filter(|s| !s.installed)
    }

    /// Load the installed set.
    pub fn add_installed(&mut self, record: InstalledRecord) -> SolvableId {
        let mut provides = record.provides;
        ensure_self_provide(&mut provides, &record.name, &record.evr);
        self.push(Solvable {
            id: 0,
            repo_id: SYSTEM_REPO_ID.to_string(),
            repo_priority: 0,
            name: record.name,
            evr: record.evr,
            arch: record.arch,
            location: String::new(),
            checksum: None,
            download_size: 0,
            install_size: record.install_size,
            summary: record.summary,
            description: String::new(),
            url: String::new(),
            license: String::new(),
            source_rpm: String::new(),
            provides,
            requires: record.requires,
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
            files: Vec::new(),
            installed: true,
            excluded: false,
            considered: true,
        })
    }

    /// Load every package record of one repo.
    pub fn add_repo(
        &mut self,
        repo_id: &str,
        priority: u32,
        metadata: &PrimaryMetadata,
    ) -> Vec<SolvableId> {
        metadata
            .packages
            .iter()
            .map(|pkg| self.add_available(repo_id, priority, pkg))
            .collect()
    }

    /// Load a single available package record.
    pub fn add_available(
        &mut self,
        repo_id: &str,
        priority: u32,
        pkg: &PrimaryPackage,
    ) -> SolvableId {
        let mut provides = pkg.provides.clone();
        ensure_self_provide(&mut provides, &pkg.name, &pkg.evr);
        self.push(Solvable {
            id: 0,
            repo_id: repo_id.to_string(),
            repo_priority: priority,
            name: pkg.name.clone(),
            evr: pkg.evr.clone(),
            arch: pkg.arch.clone(),
            location: pkg.location.clone(),
            checksum: Some(pkg.checksum.clone()),
            download_size: pkg.download_size,
            install_size: pkg.install_size,
            summary: pkg.summary.clone(),
            description: pkg.description.clone(),
            url: pkg.url.clone(),
            license: pkg.license.clone(),
            source_rpm: pkg.source_rpm.clone(),
            provides,
            requires: pkg.requires.clone(),
            conflicts: pkg.conflicts.clone(),
            obsoletes: pkg.obsoletes.clone(),
            files: pkg.files.clone(),
            installed: false,
            excluded: false,
            considered: true,
        })
    }

    fn push(&mut self, mut solvable: Solvable) -> SolvableId {
        let id = self.solvables.len();
        solvable.id = id;
        self.by_name
            .entry(solvable.name.clone())
            .or_default()
            .push(id);
        for dep in &solvable.provides {
            self.providers.entry(dep.name.clone()).or_default().push(id);
        }
        for file in &solvable.files {
            self.file_providers
                .entry(file.clone())
                .or_default()
                .push(id);
        }
        self.solvables.push(solvable);
        id
    }

    /// Mark solvables matching any exclude pattern. Both installed and
    /// available records are marked; excluded names cannot be job
    /// targets.
    pub fn apply_excludes(&mut self, patterns: &[glob::Pattern]) {
        if patterns.is_empty() {
            return;
        }
        for solvable in &mut self.solvables {
            if patterns.iter().any(|p| p.matches(&solvable.name)) {
                solvable.excluded = true;
            }
        }
    }

    /// Mask every available solvable below its name's minimum-version
    /// pin.
    pub fn apply_min_versions(&mut self, pins: &[VersionPin]) {
        if pins.is_empty() {
            return;
        }
        let by_name: HashMap<&str, &Evr> =
            pins.iter().map(|p| (p.name.as_str(), &p.evr)).collect();
        for solvable in &mut self.solvables {
            if solvable.installed {
                continue;
            }
            if let Some(floor) = by_name.get(solvable.name.as_str()) {
                if solvable.evr < **floor {
                    solvable.considered = false;
                }
            }
        }
    }

    /// All solvables with the given package name.
    pub fn by_name(&self, name: &str) -> &[SolvableId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names matching a glob pattern, installed or available.
    pub fn names_matching(&self, pattern: &glob::Pattern) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_name
            .keys()
            .filter(|name| pattern.matches(name))
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// The installed solvable of a name, if any.
    pub fn installed_by_name(&self, name: &str) -> Option<&Solvable> {
        self.by_name(name)
            .iter()
            .map(|&id| &self.solvables[id])
            .find(|s| s.installed)
    }

    /// Selectable available candidates of a name, best first.
    ///
    /// "Best" is lowest repo priority value, then highest EVR, matching
    /// the refresh preference order.
    pub fn candidates_by_name(&self, name: &str) -> Vec<&Solvable> {
        let mut candidates: Vec<&Solvable> = self
            .by_name(name)
            .iter()
            .map(|&id| &self.solvables[id])
            .filter(|s| !s.installed && s.selectable())
            .collect();
        candidates.sort_by(|a, b| {
            a.repo_priority
                .cmp(&b.repo_priority)
                .then_with(|| b.evr.cmp(&a.evr))
                .then_with(|| a.repo_id.cmp(&b.repo_id))
        });
        candidates
    }

    /// The best selectable available candidate of a name.
    pub fn best_candidate(&self, name: &str) -> Option<&Solvable> {
        self.candidates_by_name(name).into_iter().next()
    }

    /// Selectable solvables that satisfy a requirement, capability
    /// providers and file providers alike. Installed providers sort
    /// first, then best-first as in [`Pool::candidates_by_name`].
    pub fn providers_of(&self, dep: &Dependency) -> Vec<&Solvable> {
        let mut ids: Vec<SolvableId> = self
            .providers
            .get(&dep.name)
            .into_iter()
            .flatten()
            .copied()
            .collect();
        if dep.name.starts_with('/') {
            ids.extend(self.file_providers.get(&dep.name).into_iter().flatten());
        }
        ids.sort_unstable();
        ids.dedup();

        let mut found: Vec<&Solvable> = ids
            .into_iter()
            .map(|id| &self.solvables[id])
            .filter(|s| s.selectable())
            .filter(|s| {
                if dep.name.starts_with('/') && s.files.contains(&dep.name) {
                    return true;
                }
                s.provides
                    .iter()
                    .filter(|p| p.name == dep.name)
                    .any(|p| deps_overlap(p, dep))
            })
            .collect();
        found.sort_by(|a, b| {
            b.installed
                .cmp(&a.installed)
                .then_with(|| a.repo_priority.cmp(&b.repo_priority))
                .then_with(|| b.evr.cmp(&a.evr))
                .then_with(|| a.repo_id.cmp(&b.repo_id))
        });
        found
    }
}

fn ensure_self_provide(provides: &mut Vec<Dependency>, name: &str, evr: &Evr) {
    let has_self = provides
        .iter()
        .any(|p| p.name == name && p.flags == DepFlags::Eq);
    if !has_self {
        provides.push(Dependency::versioned(name, DepFlags::Eq, evr.clone()));
    }
}

/// Whether a provide constraint and a require constraint can be satisfied
/// by one version: interval intersection over EVRs.
pub fn deps_overlap(provide: &Dependency, require: &Dependency) -> bool {
    let (Some(p_evr), Some(r_evr)) = (&provide.evr, &require.evr) else {
        // Either side unversioned: names already matched.
        return true;
    };
    match (provide.flags, require.flags) {
        (DepFlags::Any, _) | (_, DepFlags::Any) => true,
        (DepFlags::Eq, _) => require.flags.matches(p_evr, r_evr),
        (_, DepFlags::Eq) => provide.flags.matches(r_evr, p_evr),
        // Both ranges: only same-direction ranges can be disjoint.
        (DepFlags::Gt | DepFlags::Ge, DepFlags::Gt | DepFlags::Ge) => true,
        (DepFlags::Lt | DepFlags::Le, DepFlags::Lt | DepFlags::Le) => true,
        (DepFlags::Gt | DepFlags::Ge, DepFlags::Lt | DepFlags::Le) => {
            let cmp = p_evr.cmp(r_evr);
            cmp == Ordering::Less
                || (cmp == Ordering::Equal
                    && provide.flags == DepFlags::Ge
                    && require.flags == DepFlags::Le)
        }
        (DepFlags::Lt | DepFlags::Le, DepFlags::Gt | DepFlags::Ge) => {
            let cmp = r_evr.cmp(p_evr);
            cmp == Ordering::Less
                || (cmp == Ordering::Equal
                    && provide.flags == DepFlags::Le
                    && require.flags == DepFlags::Ge)
        }
    }
}
