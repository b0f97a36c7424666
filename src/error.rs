//! Error type shared by the solver, the domains and the checkers.

use thiserror::Error;

/// Failures that can abort a solver query, a refinement or a whole `check`.
///
/// Precondition violations (mismatched trace lengths, covering a node by its own
/// descendant, expanding an excluded node) are programming errors and panic instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A term the solver cannot translate, e.g. non-linear arithmetic.
    #[error("unsupported term: {0}")]
    Unsupported(String),

    /// The solver could not decide the query.
    #[error("solver returned unknown: {0}")]
    Unknown(String),

    /// The cancellation flag was raised.
    #[error("cancelled")]
    Cancelled,

    /// Refinement could not establish its contract.
    #[error("refinement failed: {0}")]
    Refinement(String),

    /// Rejected by a model builder.
    #[error("malformed model: {0}")]
    Model(String),

    /// An expression whose operands have the wrong sort.
    #[error("ill-sorted expression: {0}")]
    Sort(String),

    /// Syntax error in a model file.
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
