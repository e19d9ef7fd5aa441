//! Resolution problems.

use std::fmt;

/// The class of a resolution problem, used by the skip masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    /// Two packages conflict.
    Conflict,
    /// An obsoletes relation blocks the operation.
    Obsoletes,
    /// A requirement has no remaining provider.
    BrokenDependency,
    /// A job target matched nothing.
    NotFound,
    /// The plan would remove a protected package.
    Protected,
    /// A locked package would change.
    Locked,
    /// No downgrade path exists below the installed version.
    NoDowngradePath,
}

impl ProblemKind {
    /// Whether `skip_conflicts`/`skip_obsoletes`/`skip_broken` cover this
    /// class.
    pub fn maskable(self) -> bool {
        matches!(
            self,
            ProblemKind::Conflict | ProblemKind::Obsoletes | ProblemKind::BrokenDependency
        )
    }
}

/// One problem the solver encountered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Problem class.
    pub kind: ProblemKind,
    /// Human-readable description naming the packages involved.
    pub message: String,
}

impl Problem {
    /// Construct a problem.
    pub fn new(kind: ProblemKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", problem_prefix(self.kind), self.message)
    }
}

fn problem_prefix(kind: ProblemKind) -> &'static str {
    match kind {
        ProblemKind::Conflict => "package conflict",
        ProblemKind::Obsoletes => "package is obsoleted",
        ProblemKind::BrokenDependency => "nothing provides requirement",
        ProblemKind::NotFound => "no package matches",
        ProblemKind::Protected => "operation would remove a protected package",
        ProblemKind::Locked => "package version is locked",
        ProblemKind::NoDowngradePath => "no downgrade path",
    }
}
