//! `provides`: which packages provide a capability or file.

use serde::Serialize;

use tundra_repodata::Dependency;
use tundra_solve::Pool;

use crate::error::{Error, Result};
use crate::output::emit;
use crate::session::Session;

/// One provider of the queried capability.
#[derive(Debug, Serialize)]
pub struct Provider {
    /// Full NEVRA.
    pub nevra: String,
    /// Owning repo.
    pub repo: String,
    /// One-line summary.
    pub summary: String,
}

/// Resolve a spec (capability name, `name = version` form, or absolute
/// file path) to its providers.
pub fn providers(pool: &Pool, spec: &str) -> Result<Vec<Provider>> {
    // "cap = 1.0" / "cap >= 1.0" forms narrow by version.
    let dep = parse_dep_spec(spec);
    let mut found: Vec<Provider> = pool
        .providers_of(&dep)
        .into_iter()
        .map(|s| Provider {
            nevra: s.nevra().to_string(),
            repo: s.repo_id.clone(),
            summary: s.summary.clone(),
        })
        .collect();
    found.sort_by(|a, b| a.nevra.cmp(&b.nevra));
    found.dedup_by(|a, b| a.nevra == b.nevra && a.repo == b.repo);
    if found.is_empty() {
        return Err(Error::NoMatch);
    }
    Ok(found)
}

fn parse_dep_spec(spec: &str) -> Dependency {
    use tundra_repodata::DepFlags;
    for (token, flags) in [
        (">=", DepFlags::Ge),
        ("<=", DepFlags::Le),
        ("=", DepFlags::Eq),
        (">", DepFlags::Gt),
        ("<", DepFlags::Lt),
    ] {
        if let Some((name, version)) = spec.split_once(token) {
            if let Ok(evr) = tundra_types::Evr::parse(version.trim()) {
                return Dependency::versioned(name.trim(), flags, evr);
            }
        }
    }
    Dependency::unversioned(spec.trim())
}

/// The `provides` command.
pub fn provides(session: &mut Session, spec: &str) -> Result<()> {
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let found = providers(&pool, spec)?;
    emit(session.output_mode(), &found, |found| {
        for provider in found {
            println!("{} : {}", provider.nevra, provider.summary);
            println!("Repo\t : {}", provider.repo);
        }
    });
    Ok(())
}
