//! `list` and `info`.

use serde::Serialize;

use tundra_solve::{Pool, Solvable};

use crate::error::Result;
use crate::output::emit;
use crate::session::Session;

use super::PackageRow;

/// Which packages a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListScope {
    /// Installed and available.
    #[default]
    All,
    /// Only the installed set.
    Installed,
    /// Only available, not-installed packages.
    Available,
    /// Installed packages with a newer candidate.
    Updates,
    /// Installed packages with an older candidate.
    Downgrades,
    /// Installed packages absent from every repo.
    Extras,
    /// Available packages obsoleting something installed.
    Obsoletes,
}

impl ListScope {
    /// Parse the scope word of `list`/`info`/`updateinfo`.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "all" => Some(Self::All),
            "installed" => Some(Self::Installed),
            "available" => Some(Self::Available),
            "updates" | "upgrades" => Some(Self::Updates),
            "downgrades" => Some(Self::Downgrades),
            "extras" => Some(Self::Extras),
            "obsoletes" => Some(Self::Obsoletes),
            _ => None,
        }
    }
}

/// Long-form row for `info`.
#[derive(Debug, Serialize)]
pub struct InfoRow {
    #[serde(flatten)]
    row: PackageRow,
    url: String,
    license: String,
    description: String,
}

/// Collect the rows of a scope, optionally filtered by specs (globs
/// allowed). A query that matches nothing yields an empty set, not an
/// error.
pub fn rows(pool: &Pool, scope: ListScope, specs: &[String]) -> Vec<PackageRow> {
    let patterns: Vec<glob::Pattern> = specs
        .iter()
        .filter_map(|s| glob::Pattern::new(s).ok())
        .collect();
    let matches = |s: &Solvable| {
        patterns.is_empty() || patterns.iter().any(|p| p.matches(&s.name))
    };

    let mut rows: Vec<PackageRow> = scoped(pool, scope)
        .into_iter()
        .filter(|s| matches(s))
        .map(PackageRow::from_solvable)
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.evr.cmp(&b.evr)));
    rows.dedup();
    rows
}

fn scoped<'a>(pool: &'a Pool, scope: ListScope) -> Vec<&'a Solvable> {
    match scope {
        ListScope::All => pool.solvables().collect(),
        ListScope::Installed => pool.installed().collect(),
        ListScope::Available => pool.available().collect(),
        ListScope::Updates => pool
            .installed()
            .filter_map(|inst| {
                pool.best_candidate(&inst.name)
                    .filter(|best| best.evr > inst.evr)
            })
            .collect(),
        ListScope::Downgrades => pool
            .installed()
            .filter_map(|inst| {
                pool.candidates_by_name(&inst.name)
                    .into_iter()
                    .filter(|c| c.evr < inst.evr)
                    .max_by(|a, b| a.evr.cmp(&b.evr))
            })
            .collect(),
        ListScope::Extras => pool
            .installed()
            .filter(|inst| pool.best_candidate(&inst.name).is_none())
            .collect(),
        ListScope::Obsoletes => pool
            .available()
            .filter(|avail| {
                avail.selectable()
                    && avail.obsoletes.iter().any(|o| {
                        pool.installed_by_name(&o.name)
                            .map(|inst| o.satisfied_by(Some(&inst.evr)))
                            .unwrap_or(false)
                    })
            })
            .collect(),
    }
}

/// The `list` command.
pub fn list(session: &mut Session, scope: ListScope, specs: &[String]) -> Result<()> {
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let rows = rows(&pool, scope, specs);
    emit(session.output_mode(), &rows, |rows| {
        for row in rows {
            row.print();
        }
    });
    Ok(())
}

/// The `info` command.
pub fn info(session: &mut Session, scope: ListScope, specs: &[String]) -> Result<()> {
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let patterns: Vec<glob::Pattern> = specs
        .iter()
        .filter_map(|s| glob::Pattern::new(s).ok())
        .collect();

    let mut rows: Vec<InfoRow> = scoped(&pool, scope)
        .into_iter()
        .filter(|s| patterns.is_empty() || patterns.iter().any(|p| p.matches(&s.name)))
        .map(|s| InfoRow {
            row: PackageRow::from_solvable(s),
            url: s.url.clone(),
            license: s.license.clone(),
            description: s.description.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.row.name.cmp(&b.row.name));
    emit(session.output_mode(), &rows, |rows| {
        for info in rows {
            println!("Name        : {}", info.row.name);
            println!("Arch        : {}", info.row.arch);
            println!("Version     : {}", info.row.evr);
            println!("Repo        : {}", info.row.repo);
            println!("Summary     : {}", info.row.summary);
            if !info.url.is_empty() {
                println!("URL         : {}", info.url);
            }
            if !info.license.is_empty() {
                println!("License     : {}", info.license);
            }
            if !info.description.is_empty() {
                println!("Description : {}", info.description);
            }
            println!();
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_repodata::PrimaryPackage;
    use tundra_solve::InstalledRecord;
    use tundra_types::{Checksum, ChecksumKind, Evr};

    fn installed(name: &str, version: &str) -> InstalledRecord {
        InstalledRecord {
            name: name.to_string(),
            evr: Evr::new(0, version, "1"),
            arch: "x86_64".to_string(),
            install_size: 100,
            provides: Vec::new(),
            requires: Vec::new(),
            summary: format!("{name} summary"),
        }
    }

    fn available(name: &str, version: &str) -> PrimaryPackage {
        PrimaryPackage {
            name: name.to_string(),
            arch: "x86_64".to_string(),
            evr: Evr::new(0, version, "1"),
            checksum: Checksum::new(ChecksumKind::Sha256, "ab".repeat(32)),
            summary: format!("{name} summary"),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            location: format!("rpms/{name}.rpm"),
            download_size: 10,
            install_size: 30,
            source_rpm: String::new(),
            header_range: Default::default(),
            provides: Vec::new(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
            files: Vec::new(),
        }
    }

    fn pool() -> Pool {
        let mut pool = Pool::new();
        pool.add_installed(installed("current", "2.0"));
        pool.add_installed(installed("orphaned", "1.0"));
        pool.add_available("r1", 50, &available("current", "3.0"));
        pool.add_available("r1", 50, &available("current", "1.0"));
        pool.add_available("r1", 50, &available("fresh", "1.0"));
        pool
    }

    #[test]
    fn scopes() {
        let pool = pool();
        let names = |scope| {
            rows(&pool, scope, &[])
                .into_iter()
                .map(|r| format!("{}-{}", r.name, r.evr))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(ListScope::Installed),
            vec!["current-2.0-1", "orphaned-1.0-1"]
        );
        assert_eq!(names(ListScope::Updates), vec!["current-3.0-1"]);
        assert_eq!(names(ListScope::Downgrades), vec!["current-1.0-1"]);
        assert_eq!(names(ListScope::Extras), vec!["orphaned-1.0-1"]);
        assert_eq!(
            names(ListScope::Available),
            vec!["current-1.0-1", "current-3.0-1", "fresh-1.0-1"]
        );
    }

    #[test]
    fn spec_filter_and_no_match() {
        let pool = pool();
        let rows_ok = rows(&pool, ListScope::All, &["curr*".to_string()]);
        assert!(rows_ok.iter().all(|r| r.name == "current"));
        // a query that matches nothing is an empty set, not an error
        let none = rows(&pool, ListScope::All, &["nosuch".to_string()]);
        assert!(none.is_empty());
        let empty = rows(&Pool::new(), ListScope::Installed, &[]);
        assert!(empty.is_empty());
    }

    #[test]
    fn scope_words() {
        assert_eq!(ListScope::parse("updates"), Some(ListScope::Updates));
        assert_eq!(ListScope::parse("upgrades"), Some(ListScope::Updates));
        assert_eq!(ListScope::parse("bogus"), None);
    }
}
