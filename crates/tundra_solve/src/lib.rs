#![deny(missing_docs)]

//! Dependency resolution for tundra.
//!
//! The crate separates the *contract* from the *engine*: [`Pool`] holds
//! the universe of solvables (installed packages plus every enabled
//! repo's records), [`Job`]s describe what the user wants, and a
//! [`SolverBackend`] turns both into a [`SolvedPlan`]. The shipped
//! [`BuiltinSolver`] is a deterministic dependency-closure resolver; a
//! libsolv-backed implementation can replace it behind the same trait.

mod backend;
mod builtin;
mod job;
mod plan;
mod pool;
mod problem;

pub use backend::SolverBackend;
pub use builtin::BuiltinSolver;
pub use job::{Job, Selector, SolverFlags, SolverTask};
pub use plan::{PlanPackage, SolvedPlan};
pub use pool::{InstalledRecord, Pool, Solvable, SolvableId};
pub use problem::{Problem, ProblemKind};

use thiserror::Error;

/// Errors from a resolve.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The solver found problems that the caller's skip mask does not
    /// cover.
    #[error("found {} problem(s) while resolving", .0.len())]
    Problems(Vec<Problem>),
}
