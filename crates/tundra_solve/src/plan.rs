//! The solved plan: the resolver's output contract.

use serde::Serialize;

use tundra_types::{Checksum, Nevra};

use crate::pool::Solvable;

/// Everything downstream layers need to know about one planned package:
/// enough to download, verify and feed the rpm transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanPackage {
    /// Package identity.
    pub nevra: Nevra,
    /// Repo the package comes from (`@system` for installed entries).
    pub repo_id: String,
    /// Location relative to the repo root; empty for installed entries.
    pub location: String,
    /// Declared digest of the package file.
    pub checksum: Option<Checksum>,
    /// Declared size of the package file.
    pub download_size: u64,
    /// Installed payload size.
    pub install_size: u64,
}

impl From<&Solvable> for PlanPackage {
    fn from(s: &Solvable) -> Self {
        Self {
            nevra: s.nevra(),
            repo_id: s.repo_id.clone(),
            location: s.location.clone(),
            checksum: s.checksum.clone(),
            download_size: s.download_size,
            install_size: s.install_size,
        }
    }
}

/// Output of a resolve. The mutation lists are pairwise disjoint by
/// NEVRA.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SolvedPlan {
    /// Packages to newly install.
    pub to_install: Vec<PlanPackage>,
    /// Packages to install over an older installed version.
    pub to_upgrade: Vec<PlanPackage>,
    /// Packages to install below the installed version.
    pub to_downgrade: Vec<PlanPackage>,
    /// Installed packages to erase.
    pub to_remove: Vec<PlanPackage>,
    /// Packages to reinstall at the identical NEVRA.
    pub to_reinstall: Vec<PlanPackage>,
    /// Installed packages displaced by an obsoleting install.
    pub obsoleted: Vec<PlanPackage>,
    /// Installed packages the plan leaves without a reverse dependency;
    /// erased as well when autoremove semantics are on.
    pub unneeded: Vec<PlanPackage>,
    /// Installed versions displaced by entries in `to_downgrade`.
    pub removed_by_downgrade: Vec<PlanPackage>,
    /// User arguments the solver could not satisfy.
    pub not_resolved: Vec<String>,
    /// Names the user explicitly asked to install; used for the
    /// auto-installed flags.
    pub user_installed: Vec<String>,
    /// Problems suppressed by the caller's skip mask, reported
    /// informationally.
    #[serde(skip)]
    pub masked_problems: Vec<crate::Problem>,
}

impl SolvedPlan {
    /// Whether any mutation list is non-empty.
    pub fn need_action(&self) -> bool {
        !(self.to_install.is_empty()
            && self.to_upgrade.is_empty()
            && self.to_downgrade.is_empty()
            && self.to_remove.is_empty()
            && self.to_reinstall.is_empty()
            && self.obsoleted.is_empty()
            && self.unneeded.is_empty())
    }

    /// Bytes that must be fetched for this plan.
    pub fn download_size(&self) -> u64 {
        self.to_install
            .iter()
            .chain(&self.to_upgrade)
            .chain(&self.to_downgrade)
            .chain(&self.to_reinstall)
            .map(|p| p.download_size)
            .sum()
    }

    /// All packages that need their rpm file present.
    pub fn downloads(&self) -> impl Iterator<Item = &PlanPackage> {
        self.to_install
            .iter()
            .chain(&self.to_upgrade)
            .chain(&self.to_downgrade)
            .chain(&self.to_reinstall)
    }

    /// Verify the pairwise-disjointness invariant over the mutation
    /// lists. Exposed so integration tests can assert it on every plan.
    pub fn lists_disjoint(&self) -> bool {
        let lists = [
            &self.to_install,
            &self.to_upgrade,
            &self.to_downgrade,
            &self.to_remove,
            &self.to_reinstall,
        ];
        let mut seen = std::collections::HashSet::new();
        for list in lists {
            for pkg in list {
                if !seen.insert(pkg.nevra.clone()) {
                    return false;
                }
            }
        }
        true
    }
}
