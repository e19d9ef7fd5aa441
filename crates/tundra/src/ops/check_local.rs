//! `check-local`: dependency-check a directory of rpm files without
//! installing anything.

use std::path::Path;

use tundra_solve::{BuiltinSolver, Job, Selector, SolverBackend, SolverTask};

use crate::error::{Error, Result};
use crate::goal::add_cmdline_rpm;
use crate::session::Session;

/// Add every `*.rpm` under `dir` to the command-line repo and resolve
/// an install of all of them against the installed set only.
pub fn check_local(session: &mut Session, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::FileNotFound(dir.display().to_string()));
    }
    let mut rpm_files = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("rpm") {
            rpm_files.push(path);
        }
    }
    rpm_files.sort();
    if rpm_files.is_empty() {
        return Err(Error::PackageRequired);
    }

    // Only the installed set and the local files participate; no repo
    // metadata is loaded.
    let mut pool = tundra_solve::Pool::new();
    for record in session.backend().list_installed()? {
        pool.add_installed(record);
    }
    let mut jobs = Vec::new();
    for file in &rpm_files {
        let id = add_cmdline_rpm(&mut pool, file)?;
        jobs.push(Job::Install(Selector::Id(id)));
    }

    let task = SolverTask {
        jobs,
        ..Default::default()
    };
    BuiltinSolver.solve(&pool, &task)?;
    println!("Check completed without problems");
    Ok(())
}
