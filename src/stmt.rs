//! Statements labelling control-flow edges.

use std::fmt;

use crate::expr::{Expr, Var};
use crate::indexing::VarIndexing;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// Blocks unless the condition holds.
    Assume(Expr),
    /// `var := expr`.
    Assign(Var, Expr),
    /// Gives `var` an arbitrary value.
    Havoc(Var),
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assume(cond) => write!(f, "assume {cond}"),
            Stmt::Assign(var, expr) => write!(f, "{var} := {expr}"),
            Stmt::Havoc(var) => write!(f, "havoc {var}"),
        }
    }
}

/// Unfolds a statement sequence in SSA form, starting from `from`.
///
/// Every assignment or havoc moves its variable to a fresh copy. Variables that are
/// not written keep their copy, so the formula does not constrain them.
pub fn unfold_stmts(stmts: &[Stmt], from: &VarIndexing) -> (Expr, VarIndexing) {
    let mut indexing = from.clone();
    let mut conjuncts = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Assume(cond) => conjuncts.push(indexing.unfold(cond)),
            Stmt::Assign(var, expr) => {
                let value = indexing.unfold(expr);
                indexing.inc(var);
                conjuncts.push(Expr::eq(var.at(indexing.get(var)), value));
            }
            Stmt::Havoc(var) => indexing.inc(var),
        }
    }
    (Expr::and(conjuncts), indexing)
}
