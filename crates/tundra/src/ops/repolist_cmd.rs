//! `repolist`.

use serde::Serialize;

use crate::error::Result;
use crate::output::emit;
use crate::session::Session;

/// Which repos to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepolistFilter {
    /// Enabled repos only.
    #[default]
    Enabled,
    /// Disabled repos only.
    Disabled,
    /// Everything.
    All,
}

impl RepolistFilter {
    /// Parse the filter word.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "enabled" => Some(Self::Enabled),
            "disabled" => Some(Self::Disabled),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// One repolist row.
#[derive(Debug, Serialize, PartialEq)]
pub struct RepoRow {
    /// Repo id.
    pub id: String,
    /// Human name.
    pub name: String,
    /// Enabled state.
    pub enabled: bool,
}

/// Collect rows for the filter.
pub fn rows(session: &Session, filter: RepolistFilter) -> Vec<RepoRow> {
    session
        .registry
        .all()
        .filter(|repo| !repo.is_synthetic())
        .filter(|repo| match filter {
            RepolistFilter::Enabled => repo.enabled,
            RepolistFilter::Disabled => !repo.enabled,
            RepolistFilter::All => true,
        })
        .map(|repo| RepoRow {
            id: repo.id.clone(),
            name: repo.name.clone(),
            enabled: repo.enabled,
        })
        .collect()
}

/// The `repolist` command.
pub fn repolist(session: &Session, filter: RepolistFilter) -> Result<()> {
    let rows = rows(session, filter);
    emit(session.output_mode(), &rows, |rows| {
        println!("{:<20} {:<40} {}", "repo id", "repo name", "status");
        for row in rows {
            println!(
                "{:<20} {:<40} {}",
                row.id,
                row.name,
                if row.enabled { "enabled" } else { "disabled" }
            );
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_words() {
        assert_eq!(RepolistFilter::parse("all"), Some(RepolistFilter::All));
        assert_eq!(
            RepolistFilter::parse("disabled"),
            Some(RepolistFilter::Disabled)
        );
        assert_eq!(RepolistFilter::parse("x"), None);
    }
}
