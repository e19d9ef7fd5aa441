//! The solver contract.

use crate::{Pool, SolveError, SolvedPlan, SolverTask};

/// A dependency-resolution engine.
///
/// The driver builds the [`Pool`] and the [`SolverTask`] and interprets
/// the resulting [`SolvedPlan`]; everything in between is the backend's
/// business.
pub trait SolverBackend {
    /// Resolve the task against the pool.
    fn solve(&self, pool: &Pool, task: &SolverTask) -> Result<SolvedPlan, SolveError>;
}
