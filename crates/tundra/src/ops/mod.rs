//! The command surface: one module per user-facing operation family.

pub mod alter;
pub mod check_local;
pub mod check_update;
pub mod clean;
pub mod history_cmd;
pub mod list;
pub mod mark;
pub mod provides;
pub mod repolist_cmd;
pub mod repoquery;
pub mod reposync;
pub mod search;
pub mod updateinfo_cmd;

use console::style;
use humansize::{format_size, BINARY};
use serde::Serialize;

use tundra_solve::{PlanPackage, SolvedPlan};

/// One row of a package listing, shared by several commands.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PackageRow {
    /// Package name.
    pub name: String,
    /// Architecture.
    pub arch: String,
    /// `[epoch:]version-release`.
    pub evr: String,
    /// Owning repo id.
    pub repo: String,
    /// Installed size in bytes.
    pub install_size: u64,
    /// One-line summary.
    pub summary: String,
}

impl PackageRow {
    /// Row from a pool solvable.
    pub fn from_solvable(s: &tundra_solve::Solvable) -> Self {
        Self {
            name: s.name.clone(),
            arch: s.arch.clone(),
            evr: s.evr.to_string(),
            repo: s.repo_id.clone(),
            install_size: s.install_size,
            summary: s.summary.clone(),
        }
    }

    /// Print in the classic four-column layout.
    pub fn print(&self) {
        println!(
            "{:<30} {:<10} {:<25} {}",
            self.name, self.arch, self.evr, self.repo
        );
    }
}

/// The serializable shape of a resolved plan plus its sizes, used for
/// both the confirmation display and JSON output.
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    /// The plan itself.
    #[serde(flatten)]
    pub plan: &'a SolvedPlan,
    /// Total bytes to download.
    pub download_size: u64,
}

/// Print the would-be transaction the way the C client does, one
/// section per change kind.
pub fn print_plan(plan: &SolvedPlan) {
    let sections: [(&str, &Vec<PlanPackage>); 8] = [
        ("Installing", &plan.to_install),
        ("Upgrading", &plan.to_upgrade),
        ("Downgrading", &plan.to_downgrade),
        ("Removing", &plan.to_remove),
        ("Reinstalling", &plan.to_reinstall),
        ("Obsoleting", &plan.obsoleted),
        ("Removing unneeded", &plan.unneeded),
        ("Removed by downgrade", &plan.removed_by_downgrade),
    ];
    for (title, packages) in sections {
        if packages.is_empty() {
            continue;
        }
        println!("{}:", style(title).bold());
        for pkg in packages {
            println!(
                "  {:<50} {:>12}",
                pkg.nevra,
                format_size(pkg.download_size, BINARY)
            );
        }
    }
    let total = plan.download_size();
    if total > 0 {
        println!("\nTotal download size: {}", format_size(total, BINARY));
    }
}

/// Report the specs the resolver could not satisfy.
pub fn print_not_resolved(plan: &SolvedPlan) {
    for spec in &plan.not_resolved {
        eprintln!("{} package {spec} not found", style("Warning:").yellow());
    }
    for problem in &plan.masked_problems {
        eprintln!("{} {problem}", style("Ignored:").yellow());
    }
}
