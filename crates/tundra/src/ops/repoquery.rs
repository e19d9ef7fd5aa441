//! `repoquery`.

use serde::Serialize;

use tundra_repodata::Dependency;
use tundra_solve::{Pool, Solvable};

use crate::error::{Error, Result};
use crate::output::emit;
use crate::refresh::RepoMetadata;
use crate::session::Session;

/// What to print for each matched package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryKind {
    /// Just the NEVRAs.
    #[default]
    Nevra,
    /// Owned files, from the filelists part.
    Files,
    /// Required capabilities.
    Requires,
    /// Provided capabilities.
    Provides,
    /// Obsoleted capabilities.
    Obsoletes,
    /// Conflicting capabilities.
    Conflicts,
}

/// A `--whatrequires`/`--whatprovides` reverse query.
#[derive(Debug, Clone)]
pub enum ReverseQuery {
    /// Packages requiring the capability.
    WhatRequires(String),
    /// Packages providing the capability.
    WhatProvides(String),
}

/// One repoquery result.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Full NEVRA.
    pub nevra: String,
    /// The requested detail lines (files, capabilities, ...).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Run a forward query over packages matching `spec` (glob allowed; no
/// spec means everything).
pub fn query(
    pool: &Pool,
    metadata: &[RepoMetadata],
    spec: Option<&str>,
    kind: QueryKind,
) -> Result<Vec<QueryResult>> {
    let pattern = spec.map(glob::Pattern::new).transpose().ok().flatten();
    let matches = |s: &Solvable| match (&pattern, spec) {
        (Some(p), _) => p.matches(&s.name),
        (None, Some(name)) => s.name == name,
        (None, None) => true,
    };

    let mut results = Vec::new();
    for solvable in pool.solvables().filter(|s| matches(s)) {
        let details = match kind {
            QueryKind::Nevra => Vec::new(),
            QueryKind::Files => files_of(solvable, metadata),
            QueryKind::Requires => dep_lines(&solvable.requires),
            QueryKind::Provides => dep_lines(&solvable.provides),
            QueryKind::Obsoletes => dep_lines(&solvable.obsoletes),
            QueryKind::Conflicts => dep_lines(&solvable.conflicts),
        };
        results.push(QueryResult {
            nevra: solvable.nevra().to_string(),
            details,
        });
    }
    results.sort_by(|a, b| a.nevra.cmp(&b.nevra));
    results.dedup_by(|a, b| a.nevra == b.nevra);
    if results.is_empty() {
        return Err(Error::NoMatch);
    }
    Ok(results)
}

/// Run a reverse query.
pub fn reverse_query(pool: &Pool, query: &ReverseQuery) -> Result<Vec<QueryResult>> {
    let results: Vec<QueryResult> = match query {
        ReverseQuery::WhatProvides(cap) => pool
            .providers_of(&Dependency::unversioned(cap))
            .into_iter()
            .map(|s| QueryResult {
                nevra: s.nevra().to_string(),
                details: Vec::new(),
            })
            .collect(),
        ReverseQuery::WhatRequires(cap) => pool
            .solvables()
            .filter(|s| s.requires.iter().any(|r| r.name == *cap))
            .map(|s| QueryResult {
                nevra: s.nevra().to_string(),
                details: Vec::new(),
            })
            .collect(),
    };
    let mut results = results;
    results.sort_by(|a, b| a.nevra.cmp(&b.nevra));
    results.dedup_by(|a, b| a.nevra == b.nevra);
    if results.is_empty() {
        return Err(Error::NoMatch);
    }
    Ok(results)
}

fn dep_lines(deps: &[Dependency]) -> Vec<String> {
    let mut lines: Vec<String> = deps
        .iter()
        .map(|d| match &d.evr {
            Some(evr) => format!(
                "{} {} {}",
                d.name,
                match d.flags {
                    tundra_repodata::DepFlags::Eq => "=",
                    tundra_repodata::DepFlags::Lt => "<",
                    tundra_repodata::DepFlags::Le => "<=",
                    tundra_repodata::DepFlags::Gt => ">",
                    tundra_repodata::DepFlags::Ge => ">=",
                    tundra_repodata::DepFlags::Any => "",
                },
                evr
            ),
            None => d.name.clone(),
        })
        .collect();
    lines.sort();
    lines.dedup();
    lines
}

/// Files of a package: primary's partial list plus the filelists part.
fn files_of(solvable: &Solvable, metadata: &[RepoMetadata]) -> Vec<String> {
    let mut files = solvable.files.clone();
    for meta in metadata {
        if meta.repo_id != solvable.repo_id {
            continue;
        }
        if let Some(filelists) = &meta.filelists {
            for pkg in &filelists.packages {
                if pkg.name == solvable.name
                    && pkg.evr == solvable.evr
                    && pkg.arch == solvable.arch
                {
                    files.extend(pkg.files.iter().map(|f| f.path.clone()));
                }
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

/// The `repoquery` command.
pub fn repoquery(
    session: &mut Session,
    spec: Option<&str>,
    kind: QueryKind,
    reverse: Option<ReverseQuery>,
) -> Result<()> {
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let results = match reverse {
        Some(reverse) => reverse_query(&pool, &reverse)?,
        None => query(&pool, session.metadata(), spec, kind)?,
    };
    emit(session.output_mode(), &results, |results| {
        for result in results {
            println!("{}", result.nevra);
            for line in &result.details {
                println!("  {line}");
            }
        }
    });
    Ok(())
}
