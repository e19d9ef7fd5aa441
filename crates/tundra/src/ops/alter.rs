//! The mutating commands: install, erase, upgrade, downgrade,
//! reinstall, distro-sync, autoremove, check and history replay.

use tracing::info;

use crate::error::{Error, Result};
use crate::goal::Intent;
use crate::output::{emit, OutputMode};
use crate::session::Session;

use super::{print_not_resolved, print_plan, PlanReport};

/// Run one mutating intent end to end: refresh, resolve, show the plan,
/// execute, report.
pub fn alter(session: &mut Session, intent: Intent) -> Result<()> {
    alter_with(session, intent, None)
}

/// As [`alter`], additionally restoring auto-flags to their values at a
/// history transaction (rollback/undo/redo).
pub fn alter_with(
    session: &mut Session,
    intent: Intent,
    restore_flags_to: Option<i64>,
) -> Result<()> {
    session.refresh_metadata()?;
    let erase_unneeded = matches!(intent, Intent::AutoErase { .. })
        || session.config.clean_requirements_on_remove;

    let plan = session.resolve(&intent)?;
    print_not_resolved(&plan);

    if !plan.need_action() {
        if !plan.not_resolved.is_empty() {
            return Err(Error::NoMatch);
        }
        info!("nothing to do");
        if session.output_mode() == OutputMode::Text {
            println!("Nothing to do.");
        }
        return Ok(());
    }

    let report = PlanReport {
        download_size: plan.download_size(),
        plan: &plan,
    };
    emit(session.output_mode(), &report, |r| print_plan(r.plan));

    session.execute(&plan, erase_unneeded, restore_flags_to)?;
    if session.output_mode() == OutputMode::Text {
        println!("Complete!");
    }
    Ok(())
}

/// `check`: resolve an install of every available package and report
/// problems without ever executing.
pub fn check(session: &mut Session) -> Result<()> {
    session.refresh_metadata()?;
    let plan = session.resolve(&Intent::Check)?;
    print_not_resolved(&plan);
    if session.output_mode() == OutputMode::Text {
        println!("Check completed without problems");
    }
    Ok(())
}
