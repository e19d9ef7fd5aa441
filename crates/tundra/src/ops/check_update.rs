//! `check-update`: report pending upgrades without changing anything.

use crate::error::Result;
use crate::output::emit;
use crate::session::Session;

use super::list::{rows, ListScope};

/// Exit code signalled when updates exist and
/// `dnf_check_update_compat` is on.
pub const UPDATES_AVAILABLE_EXIT_CODE: i32 = 100;

/// The `check-update` command. Returns whether updates are pending so
/// the binary can map that onto the dnf-compatible exit code.
pub fn check_update(session: &mut Session, specs: &[String]) -> Result<bool> {
    session.refresh_metadata()?;
    let (pool, _) = session.build_pool(&[])?;
    let rows = rows(&pool, ListScope::Updates, specs);
    let pending = !rows.is_empty();
    emit(session.output_mode(), &rows, |rows| {
        for row in rows {
            row.print();
        }
    });
    Ok(pending)
}
