//! `updateinfo`: advisory summary, listing and details.

use std::collections::BTreeMap;

use serde::Serialize;

use tundra_repodata::{Advisory, AdvisoryKind};
use tundra_solve::Pool;

use crate::error::{Error, Result};
use crate::output::emit;
use crate::session::Session;

/// Output detail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateinfoMode {
    /// Counts by advisory type.
    #[default]
    Summary,
    /// One line per advisory.
    List,
    /// Full advisory text.
    Info,
}

impl UpdateinfoMode {
    /// Parse the mode word.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "summary" => Some(Self::Summary),
            "list" => Some(Self::List),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// An advisory that applies to this system.
#[derive(Debug, Serialize)]
pub struct ApplicableAdvisory {
    /// Advisory id.
    pub id: String,
    /// Type string.
    pub kind: String,
    /// Severity as published.
    pub severity: Option<String>,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// The updated packages.
    pub packages: Vec<String>,
    /// Whether a reboot is suggested.
    pub reboot_suggested: bool,
}

/// Advisory counts by type.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct UpdateinfoSummary {
    /// Security advisories.
    pub security: usize,
    /// Bugfix advisories.
    pub bugfix: usize,
    /// Enhancement advisories.
    pub enhancement: usize,
    /// Anything else.
    pub unknown: usize,
}

/// An advisory applies iff it ships a newer EVR of an installed package.
pub fn applicable<'a>(
    advisories: impl Iterator<Item = &'a Advisory>,
    pool: &Pool,
    specs: &[String],
) -> Vec<ApplicableAdvisory> {
    let patterns: Vec<glob::Pattern> = specs
        .iter()
        .filter_map(|s| glob::Pattern::new(s).ok())
        .collect();

    // Dedup by id across repos.
    let mut by_id: BTreeMap<String, ApplicableAdvisory> = BTreeMap::new();
    for advisory in advisories {
        let mut packages = Vec::new();
        let mut reboot = false;
        for pkg in &advisory.packages {
            if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&pkg.nevra.name)) {
                continue;
            }
            let Some(installed) = pool.installed_by_name(&pkg.nevra.name) else {
                continue;
            };
            if pkg.nevra.evr > installed.evr {
                packages.push(pkg.nevra.to_string());
                reboot |= pkg.reboot_suggested;
            }
        }
        if packages.is_empty() {
            continue;
        }
        by_id.insert(
            advisory.id.clone(),
            ApplicableAdvisory {
                id: advisory.id.clone(),
                kind: advisory.kind.to_string(),
                severity: advisory.severity.clone(),
                title: advisory.title.clone(),
                description: advisory.description.clone(),
                packages,
                reboot_suggested: reboot,
            },
        );
    }
    by_id.into_values().collect()
}

/// Count applicable advisories by kind.
pub fn summarize<'a>(
    advisories: impl Iterator<Item = &'a Advisory>,
    pool: &Pool,
) -> UpdateinfoSummary {
    let mut summary = UpdateinfoSummary::default();
    let applicable = applicable(advisories, pool, &[]);
    let kinds: BTreeMap<&str, AdvisoryKind> = [
        ("Security", AdvisoryKind::Security),
        ("Bugfix", AdvisoryKind::Bugfix),
        ("Enhancement", AdvisoryKind::Enhancement),
        ("Unknown", AdvisoryKind::Unknown),
    ]
    .into_iter()
    .collect();
    for advisory in &applicable {
        match kinds.get(advisory.kind.as_str()) {
            Some(AdvisoryKind::Security) => summary.security += 1,
            Some(AdvisoryKind::Bugfix) => summary.bugfix += 1,
            Some(AdvisoryKind::Enhancement) => summary.enhancement += 1,
            _ => summary.unknown += 1,
        }
    }
    summary
}

/// The `updateinfo` command.
pub fn updateinfo(session: &mut Session, mode: UpdateinfoMode, specs: &[String]) -> Result<()> {
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let advisories: Vec<&Advisory> = session
        .metadata()
        .iter()
        .filter_map(|m| m.updateinfo.as_ref())
        .flat_map(|u| u.advisories.iter())
        .collect();

    match mode {
        UpdateinfoMode::Summary => {
            let summary = summarize(advisories.iter().copied(), &pool);
            emit(session.output_mode(), &summary, |s| {
                if s.security + s.bugfix + s.enhancement + s.unknown == 0 {
                    println!("0 updates.");
                    return;
                }
                if s.security > 0 {
                    println!("{:>6} Security notice(s)", s.security);
                }
                if s.bugfix > 0 {
                    println!("{:>6} Bugfix notice(s)", s.bugfix);
                }
                if s.enhancement > 0 {
                    println!("{:>6} Enhancement notice(s)", s.enhancement);
                }
                if s.unknown > 0 {
                    println!("{:>6} Unknown notice(s)", s.unknown);
                }
            });
            Ok(())
        }
        UpdateinfoMode::List | UpdateinfoMode::Info => {
            let applicable = applicable(advisories.iter().copied(), &pool, specs);
            if applicable.is_empty() && !specs.is_empty() {
                return Err(Error::NoMatch);
            }
            emit(session.output_mode(), &applicable, |advisories| {
                for advisory in advisories {
                    if mode == UpdateinfoMode::List {
                        for pkg in &advisory.packages {
                            println!("{} {} {}", advisory.id, advisory.kind, pkg);
                        }
                    } else {
                        println!("Update ID : {}", advisory.id);
                        println!("Type      : {}", advisory.kind);
                        if let Some(severity) = &advisory.severity {
                            println!("Severity  : {severity}");
                        }
                        println!("Title     : {}", advisory.title);
                        println!("Reboot    : {}", advisory.reboot_suggested);
                        println!("Description:\n{}\n", advisory.description);
                    }
                }
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_repodata::AdvisoryPackage;
    use tundra_solve::InstalledRecord;
    use tundra_types::{Evr, Nevra};

    fn advisory(id: &str, kind: AdvisoryKind, pkg_version: &str) -> Advisory {
        Advisory {
            id: id.to_string(),
            kind,
            title: format!("{id} title"),
            severity: Some("Important".to_string()),
            description: String::new(),
            issued: None,
            references: Vec::new(),
            packages: vec![AdvisoryPackage {
                nevra: Nevra::new("openssl", Evr::new(0, pkg_version, "1"), "x86_64"),
                filename: String::new(),
                reboot_suggested: false,
            }],
        }
    }

    fn pool_with_openssl(version: &str) -> Pool {
        let mut pool = Pool::new();
        pool.add_installed(InstalledRecord {
            name: "openssl".to_string(),
            evr: Evr::new(0, version, "1"),
            arch: "x86_64".to_string(),
            install_size: 0,
            provides: Vec::new(),
            requires: Vec::new(),
            summary: String::new(),
        });
        pool
    }

    #[test]
    fn applicability_needs_newer_evr_of_installed() {
        let advisories = vec![
            advisory("TSA-1", AdvisoryKind::Security, "3.1"),
            advisory("TSA-2", AdvisoryKind::Bugfix, "2.0"),
        ];
        let pool = pool_with_openssl("3.0");

        let hits = applicable(advisories.iter(), &pool, &[]);
        // only the 3.1 advisory applies over installed 3.0
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "TSA-1");

        let summary = summarize(advisories.iter(), &pool);
        assert_eq!(
            summary,
            UpdateinfoSummary {
                security: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn uninstalled_packages_never_apply() {
        let advisories = vec![advisory("TSA-1", AdvisoryKind::Security, "9.9")];
        let pool = Pool::new();
        assert!(applicable(advisories.iter(), &pool, &[]).is_empty());
    }
}
