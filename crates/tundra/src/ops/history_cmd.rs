//! `history`: list, init, rollback, undo, redo.

use serde::Serialize;

use tundra_types::Nevra;

use crate::error::{Error, Result};
use crate::goal::Intent;
use crate::output::emit;
use crate::session::Session;

use super::alter::alter_with;

/// One row of `history list`.
#[derive(Debug, Serialize)]
pub struct HistoryRow {
    /// Transaction id.
    pub id: i64,
    /// `base` or `delta`.
    pub kind: &'static str,
    /// Command line that caused it.
    pub cmdline: String,
    /// Unix timestamp.
    pub timestamp: i64,
    /// Packages added.
    pub added: usize,
    /// Packages removed.
    pub removed: usize,
}

/// `history list`.
pub fn list(session: &Session) -> Result<()> {
    let rows: Vec<HistoryRow> = session
        .history
        .list()?
        .into_iter()
        .map(|t| HistoryRow {
            id: t.id,
            kind: match t.kind {
                tundra_history::TransactionKind::Base => "base",
                tundra_history::TransactionKind::Delta => "delta",
            },
            cmdline: t.cmdline,
            timestamp: t.timestamp,
            added: t.added.len(),
            removed: t.removed.len(),
        })
        .collect();
    emit(session.output_mode(), &rows, |rows| {
        println!(
            "{:>4} {:<6} {:>7} {:>7}  {}",
            "id", "type", "added", "removed", "command line"
        );
        for row in rows {
            println!(
                "{:>4} {:<6} {:>7} {:>7}  {}",
                row.id, row.kind, row.added, row.removed, row.cmdline
            );
        }
    });
    Ok(())
}

/// `history init`: record the baseline if there is none yet.
pub fn init(session: &mut Session) -> Result<()> {
    session.require_root()?;
    session.acquire_instance_lock()?;
    session.ensure_history_initialized()?;
    println!("History database initialized.");
    Ok(())
}

/// `history rollback <id>`: plan the delta from the current state back
/// to the state at `target`, and restore auto-flags.
pub fn rollback(session: &mut Session, target: i64) -> Result<()> {
    if target < 1 {
        return Err(Error::InvalidInput(format!(
            "invalid transaction id {target}"
        )));
    }
    let delta = session.history.delta_to(target)?;
    let intent = replay_intent(session, &delta)?;
    alter_with(session, intent, Some(target))
}

/// `history undo <from> [<to>]`: revert the changes of the range.
pub fn undo(session: &mut Session, from: i64, to: i64) -> Result<()> {
    validate_range(session, from, to)?;
    if from == 1 {
        return Err(Error::InvalidInput(
            "cannot undo the baseline transaction".to_string(),
        ));
    }
    // Reverting [from..to] means moving from state(to) to state(from-1)
    // for exactly the packages the range touched.
    let delta = session.history.delta_between(to, from - 1)?;
    let intent = replay_intent(session, &delta)?;
    alter_with(session, intent, Some(from - 1))
}

/// `history redo <from> [<to>]`: re-apply the changes of the range.
pub fn redo(session: &mut Session, from: i64, to: i64) -> Result<()> {
    validate_range(session, from, to)?;
    if from == 1 {
        return Err(Error::InvalidInput(
            "cannot redo the baseline transaction".to_string(),
        ));
    }
    let delta = session.history.delta_between(from - 1, to)?;
    let intent = replay_intent(session, &delta)?;
    alter_with(session, intent, Some(to))
}

fn validate_range(session: &Session, from: i64, to: i64) -> Result<()> {
    if from < 1 || to < from {
        return Err(Error::InvalidInput(format!(
            "invalid transaction range {from}..{to}"
        )));
    }
    // both ends must exist
    session.history.transaction(from)?;
    session.history.transaction(to)?;
    Ok(())
}

/// Turn a history delta into install/erase jobs by NEVRA.
fn replay_intent(session: &Session, delta: &tundra_history::Delta) -> Result<Intent> {
    let install = session
        .history
        .nevras_for(&delta.added)?
        .iter()
        .map(|s| Nevra::parse(s).map_err(|_| Error::InvalidInput(format!("bad nevra {s}"))))
        .collect::<Result<Vec<_>>>()?;
    let erase = session
        .history
        .nevras_for(&delta.removed)?
        .iter()
        .map(|s| Nevra::parse(s).map_err(|_| Error::InvalidInput(format!("bad nevra {s}"))))
        .collect::<Result<Vec<_>>>()?;
    Ok(Intent::Replay { install, erase })
}
