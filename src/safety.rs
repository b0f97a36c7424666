use std::error::Error as StdError;
use std::fmt;

use crate::arg::{Arg, NodeId};
use crate::error::{Error, Result};
use crate::trace::{ArgTrace, Trace};

/// Outcome of a safety check.
#[derive(Debug)]
pub enum SafetyStatus<S, A> {
    /// No target is reachable; the ARG is complete and serves as a certificate.
    Safe { arg: Arg<S, A> },
    /// A target is reachable along `trace`.
    Unsafe { trace: Trace<S, A>, arg: Arg<S, A> },
    /// The check was cancelled.
    Aborted,
}

impl<S, A> SafetyStatus<S, A> {
    pub fn is_safe(&self) -> bool {
        matches!(self, SafetyStatus::Safe { .. })
    }

    pub fn is_unsafe(&self) -> bool {
        matches!(self, SafetyStatus::Unsafe { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, SafetyStatus::Aborted)
    }

    pub fn arg(&self) -> Option<&Arg<S, A>> {
        match self {
            SafetyStatus::Safe { arg } | SafetyStatus::Unsafe { arg, .. } => Some(arg),
            SafetyStatus::Aborted => None,
        }
    }

    pub fn trace(&self) -> Option<&Trace<S, A>> {
        match self {
            SafetyStatus::Unsafe { trace, .. } => Some(trace),
            _ => None,
        }
    }
}

impl<S, A> fmt::Display for SafetyStatus<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyStatus::Safe { .. } => write!(f, "SAFE"),
            SafetyStatus::Unsafe { .. } => write!(f, "UNSAFE"),
            SafetyStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A check that failed, with the ARG as far as it was built.
#[derive(Debug)]
pub struct CheckFailure<S, A> {
    pub error: Error,
    pub arg: Arg<S, A>,
}

impl<S, A> fmt::Display for CheckFailure<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check failed after {} nodes: {}", self.arg.len(), self.error)
    }
}

impl<S: fmt::Debug, A: fmt::Debug> StdError for CheckFailure<S, A> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

pub type CheckResult<S, A> = Result<SafetyStatus<S, A>, CheckFailure<S, A>>;

/// Turns the outcome of a search over `arg` into a [`CheckResult`]: a node is a
/// counterexample, cancellation becomes [`SafetyStatus::Aborted`] and any other error a
/// [`CheckFailure`].
pub(crate) fn finish<S: Clone, A: Clone>(arg: Arg<S, A>, outcome: Result<Option<NodeId>>) -> CheckResult<S, A> {
    match outcome {
        Ok(None) => Ok(SafetyStatus::Safe { arg }),
        Ok(Some(n)) => {
            let trace = ArgTrace::to(&arg, n).to_trace(&arg);
            Ok(SafetyStatus::Unsafe { trace, arg })
        }
        Err(Error::Cancelled) => Ok(SafetyStatus::Aborted),
        Err(error) => Err(CheckFailure { error, arg }),
    }
}

pub trait SafetyChecker<S, A, P> {
    fn check(&self, prec: &P) -> CheckResult<S, A>;
}
