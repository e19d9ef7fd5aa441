//! `search`: name/summary scoring over every known package.

use std::collections::HashMap;

use serde::Serialize;

use tundra_solve::Pool;

use crate::error::{Error, Result};
use crate::output::emit;
use crate::session::Session;

/// One search hit.
#[derive(Debug, Serialize, PartialEq)]
pub struct SearchHit {
    /// Package name.
    pub name: String,
    /// One-line summary.
    pub summary: String,
    /// Relevance, higher first.
    #[serde(skip)]
    pub score: u32,
}

/// Score every package against the search terms: exact name match wins
/// over a name substring, which wins over a summary substring.
pub fn search_pool(pool: &Pool, terms: &[String]) -> Result<Vec<SearchHit>> {
    let mut by_name: HashMap<&str, SearchHit> = HashMap::new();
    for solvable in pool.solvables() {
        let mut score = 0;
        for term in terms {
            let term = term.to_lowercase();
            let name = solvable.name.to_lowercase();
            if name == term {
                score = score.max(3);
            } else if name.contains(&term) {
                score = score.max(2);
            } else if solvable.summary.to_lowercase().contains(&term) {
                score = score.max(1);
            }
        }
        if score == 0 {
            continue;
        }
        let entry = by_name
            .entry(solvable.name.as_str())
            .or_insert_with(|| SearchHit {
                name: solvable.name.clone(),
                summary: solvable.summary.clone(),
                score,
            });
        entry.score = entry.score.max(score);
        if entry.summary.is_empty() {
            entry.summary = solvable.summary.clone();
        }
    }

    let mut hits: Vec<SearchHit> = by_name.into_values().collect();
    if hits.is_empty() {
        return Err(Error::NoSearchResults);
    }
    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    Ok(hits)
}

/// The `search` command.
pub fn search(session: &mut Session, terms: &[String]) -> Result<()> {
    if terms.is_empty() {
        return Err(Error::PackageRequired);
    }
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let hits = search_pool(&pool, terms)?;
    emit(session.output_mode(), &hits, |hits| {
        for hit in hits {
            println!("{} : {}", hit.name, hit.summary);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_repodata::PrimaryPackage;
    use tundra_types::{Checksum, ChecksumKind, Evr};

    fn pkg(name: &str, summary: &str) -> PrimaryPackage {
        PrimaryPackage {
            name: name.to_string(),
            arch: "noarch".to_string(),
            evr: Evr::new(0, "1", "1"),
            checksum: Checksum::new(ChecksumKind::Sha256, "ab".repeat(32)),
            summary: summary.to_string(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            location: format!("rpms/{name}.rpm"),
            download_size: 1,
            install_size: 1,
            source_rpm: String::new(),
            header_range: Default::default(),
            provides: Vec::new(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
            files: Vec::new(),
        }
    }

    #[test]
    fn scoring_order() {
        let mut pool = Pool::new();
        pool.add_available("r", 50, &pkg("editor", "a text tool"));
        pool.add_available("r", 50, &pkg("vim-editor", "modal editing"));
        pool.add_available("r", 50, &pkg("hexdump", "editor of bytes"));
        pool.add_available("r", 50, &pkg("unrelated", "nothing"));

        let hits = search_pool(&pool, &["editor".to_string()]).unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["editor", "vim-editor", "hexdump"]);
    }

    #[test]
    fn empty_results_error() {
        let pool = Pool::new();
        assert!(matches!(
            search_pool(&pool, &["anything".to_string()]),
            Err(Error::NoSearchResults)
        ));
    }
}
