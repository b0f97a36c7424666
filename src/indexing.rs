//! Variable indexings for unfolding formulas along a path.
//!
//! A path formula mentions one copy `x@k` of each variable per step. An indexing maps
//! every variable to the copy that denotes its current value.

use std::collections::BTreeMap;
use std::fmt;

use crate::expr::{Expr, Var};

/// Maps variables to copy indices; unmapped variables are at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarIndexing {
    indices: BTreeMap<Var, usize>,
}

impl VarIndexing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &Var) -> usize {
        self.indices.get(var).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, var: &Var) {
        *self.indices.entry(var.clone()).or_insert(0) += 1;
    }

    /// Rewrites `x` to `x@i` and `x'` to `x@(i+1)`, with `i` this indexing's index of `x`.
    pub fn unfold(&self, expr: &Expr) -> Expr {
        expr.map(&mut |e| match e {
            Expr::Var(v) => Some(v.at(self.get(v))),
            Expr::Prime(v) => Some(v.at(self.get(v) + 1)),
            _ => None,
        })
    }

    /// Rewrites `x@i` back to `x` where `i` is this indexing's index of `x`; other copies
    /// are kept.
    pub fn foldin(&self, expr: &Expr) -> Expr {
        expr.map(&mut |e| match e {
            Expr::Indexed(v, k) if *k == self.get(v) => Some(v.expr()),
            _ => None,
        })
    }
}

impl fmt::Display for VarIndexing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (var, index)) in self.indices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var}@{index}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_unfold_foldin() {
        let x = Var::int("x");
        let y = Var::int("y");
        let mut indexing = VarIndexing::new();
        indexing.inc(&x);
        indexing.inc(&x);
        let e = Expr::eq(x.prime(), Expr::add([x.expr(), y.expr()]));
        let unfolded = indexing.unfold(&e);
        assert_eq!(unfolded, Expr::eq(x.at(3), Expr::add([x.at(2), y.at(0)])));
        assert_eq!(indexing.foldin(&unfolded), Expr::eq(x.at(3), Expr::add([x.expr(), y.expr()])));
    }
}
