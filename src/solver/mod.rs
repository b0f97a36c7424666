//! Satisfiability checking.
//!
//! The domains and the refiner talk to a [`Solver`] through a small incremental
//! interface: assertions are added on a stack of scopes, checked, and the scope is
//! popped again. [`SolverScope`] ties a push to its pop, so every query leaves the solver
//! stack exactly as it found it, whichever way the query exits.
//!
//! [`BuiltinSolver`] decides quantifier-free linear integer arithmetic with booleans.
//! [`project`] eliminates variables from a formula with the same machinery.

use std::collections::BTreeMap;
use std::fmt;

use log::trace;

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::valuation::Value;

mod builtin;
mod formula;
mod linear;
mod project;

pub use builtin::BuiltinSolver;
pub use project::project;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SolverStatus {
    Sat,
    Unsat,
}

impl SolverStatus {
    pub fn is_sat(self) -> bool {
        self == SolverStatus::Sat
    }
}

/// An incremental satisfiability checker.
///
/// Methods take `&self` so that one solver can be shared between the domains and the
/// refiner of a single `check`.
pub trait Solver {
    /// Adds an assertion to the innermost scope.
    fn add(&self, assertion: Expr);

    /// Opens a new scope.
    fn push(&self);

    /// Discards the innermost scope and its assertions.
    fn pop(&self);

    /// Decides the conjunction of all assertions in all open scopes.
    fn check(&self) -> Result<SolverStatus>;

    /// The model found by the last `check` that returned [`SolverStatus::Sat`].
    fn model(&self) -> Option<Model>;
}

/// Pushes a solver scope and pops it when dropped.
pub struct SolverScope<'a> {
    solver: &'a dyn Solver,
}

impl<'a> SolverScope<'a> {
    pub fn new(solver: &'a dyn Solver) -> Self {
        solver.push();
        Self { solver }
    }
}

impl Drop for SolverScope<'_> {
    fn drop(&mut self) {
        self.solver.pop();
    }
}

/// Checks the conjunction of `assertions` in a fresh scope.
pub fn is_sat(solver: &dyn Solver, assertions: impl IntoIterator<Item = Expr>) -> Result<bool> {
    Ok(check_model(solver, assertions)?.is_some())
}

/// Checks the conjunction of `assertions` in a fresh scope and returns a model if it is
/// satisfiable.
pub fn check_model(solver: &dyn Solver, assertions: impl IntoIterator<Item = Expr>) -> Result<Option<Model>> {
    let _scope = SolverScope::new(solver);
    for assertion in assertions {
        trace!("assert {assertion}");
        solver.add(assertion);
    }
    match solver.check()? {
        SolverStatus::Sat => solver
            .model()
            .map(Some)
            .ok_or_else(|| Error::Unknown("satisfiable without a model".into())),
        SolverStatus::Unsat => Ok(None),
    }
}

/// Values of the variable references a solver saw in its assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: BTreeMap<Expr, Value>,
}

impl Model {
    pub(crate) fn insert(&mut self, leaf: Expr, value: Value) {
        debug_assert!(leaf.is_leaf());
        self.values.insert(leaf, value);
    }

    /// The value of a variable reference, if the solver assigned one.
    pub fn get(&self, leaf: &Expr) -> Option<Value> {
        self.values.get(leaf).copied()
    }

    /// Evaluates `expr`; references the model does not mention make the result unknown.
    pub fn eval(&self, expr: &Expr) -> Option<Value> {
        expr.eval(&|leaf| self.get(leaf))
    }

    /// Evaluates `expr`, reading references the model does not mention as the default
    /// value of their sort.
    pub fn eval_complete(&self, expr: &Expr) -> Option<Value> {
        expr.eval(&|leaf| Some(self.get(leaf).unwrap_or_else(|| Value::default_of(leaf.sort()))))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (leaf, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{leaf} = {value}")?;
        }
        write!(f, "}}")
    }
}
