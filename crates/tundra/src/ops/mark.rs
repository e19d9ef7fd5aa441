//! `mark`: flip the auto-installed flag of installed packages.

use crate::error::{Error, Result};
use crate::session::Session;

/// `mark install` clears the auto flag (user-installed), `mark remove`
/// sets it (eligible for autoremove).
pub fn mark(session: &mut Session, auto: bool, names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(Error::PackageRequired);
    }
    session.require_root()?;
    session.acquire_instance_lock()?;
    session.ensure_history_initialized()?;

    let installed = session.backend().list_installed()?;
    let trans_id = session.history.latest_id()?;
    for name in names {
        if !installed.iter().any(|r| &r.name == name) {
            return Err(Error::NoMatch);
        }
        session.history.set_flag(trans_id, name, auto)?;
        println!(
            "{name} marked as {}",
            if auto { "auto-installed" } else { "user-installed" }
        );
    }
    Ok(())
}
