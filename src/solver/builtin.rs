use std::cell::RefCell;
use std::collections::HashMap;

use log::trace;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::formula::{to_formula, Atom, Formula, Symbols};
use super::linear::{Outcome, System};
use super::{Model, Solver, SolverStatus};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::expr::{Expr, Sort};
use crate::valuation::Value;

/// Decision procedure for quantifier-free linear integer arithmetic with booleans.
///
/// Assertions are put into negation normal form and searched by case splitting on
/// disjunctions. The smallest disjunction is split first, and every partial branch is
/// pruned as soon as its literals become infeasible. Each branch is a conjunction of
/// linear constraints, decided by [`System`]. A model found this way is validated against
/// the original assertions before it is reported.
///
/// The procedure is sound for `Unsat` and `Sat`. It answers [`Error::Unknown`] when a
/// branch has rational but no discovered integer solutions and no other branch is
/// satisfiable.
#[derive(Debug)]
pub struct BuiltinSolver {
    frames: RefCell<Vec<Vec<Expr>>>,
    model: RefCell<Option<Model>>,
    cancel: CancelToken,
}

impl Default for BuiltinSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinSolver {
    pub fn new() -> Self {
        Self::with_cancel(CancelToken::new())
    }

    /// A solver whose queries fail with [`Error::Cancelled`] once `cancel` is raised.
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            frames: RefCell::new(vec![Vec::new()]),
            model: RefCell::new(None),
            cancel,
        }
    }

    /// Number of open scopes above the base scope.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len() - 1
    }

    fn assignment_to_model(&self, syms: &Symbols, assignment: &Assignment) -> Result<Model> {
        let mut model = Model::default();
        for id in 0..syms.len() {
            let leaf = syms.leaf(id);
            let value = match leaf.sort() {
                Sort::Bool => Value::Bool(assignment.bools.iter().any(|(s, v)| *s == id && *v)),
                Sort::Int => match assignment.ints.get(&id) {
                    Some(n) => Value::Int(
                        n.to_i64()
                            .ok_or_else(|| Error::Unknown(format!("value of `{leaf}` does not fit in 64 bits")))?,
                    ),
                    None => Value::Int(0),
                },
            };
            model.insert(leaf.clone(), value);
        }
        Ok(model)
    }
}

impl Solver for BuiltinSolver {
    fn add(&self, assertion: Expr) {
        debug_assert_eq!(assertion.sort(), Sort::Bool, "assertion `{assertion}` is not a formula");
        *self.model.borrow_mut() = None;
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.push(assertion);
        }
    }

    fn push(&self) {
        self.frames.borrow_mut().push(Vec::new());
    }

    fn pop(&self) {
        let mut frames = self.frames.borrow_mut();
        assert!(frames.len() > 1, "pop without matching push");
        frames.pop();
        *self.model.borrow_mut() = None;
    }

    fn check(&self) -> Result<SolverStatus> {
        self.cancel.check()?;
        *self.model.borrow_mut() = None;
        let assertions: Vec<Expr> = self.frames.borrow().iter().flatten().cloned().collect();

        let mut syms = Symbols::default();
        let parts = assertions
            .iter()
            .map(|a| to_formula(a, true, &mut syms))
            .collect::<Result<Vec<_>>>()?;
        let root = Formula::And(parts);

        let mut search = Search {
            cancel: &self.cancel,
            unknown: None,
            branches: 0,
        };
        let outcome = search.run(vec![&root], Vec::new(), Vec::new())?;
        trace!("searched {} branches", search.branches);
        match outcome {
            Some(assignment) => {
                let model = self.assignment_to_model(&syms, &assignment)?;
                for assertion in &assertions {
                    if model.eval_complete(assertion) != Some(Value::Bool(true)) {
                        return Err(Error::Unknown(format!("model {model} violates `{assertion}`")));
                    }
                }
                *self.model.borrow_mut() = Some(model);
                Ok(SolverStatus::Sat)
            }
            None => match search.unknown {
                Some(reason) => Err(Error::Unknown(reason)),
                None => Ok(SolverStatus::Unsat),
            },
        }
    }

    fn model(&self) -> Option<Model> {
        self.model.borrow().clone()
    }
}

#[derive(Debug)]
struct Assignment {
    bools: Vec<(usize, bool)>,
    ints: HashMap<usize, BigInt>,
}

struct Search<'a> {
    cancel: &'a CancelToken,
    unknown: Option<String>,
    branches: usize,
}

impl Search<'_> {
    /// Depth-first search for a satisfiable branch.
    ///
    /// `todo` holds formulas not yet decomposed, `atoms` the literals of the current
    /// branch and `ors` the disjunctions still to be split.
    fn run<'f>(
        &mut self,
        mut todo: Vec<&'f Formula>,
        mut atoms: Vec<&'f Atom>,
        mut ors: Vec<&'f [Formula]>,
    ) -> Result<Option<Assignment>> {
        while let Some(formula) = todo.pop() {
            match formula {
                Formula::True => {}
                Formula::False => return Ok(None),
                Formula::Atom(atom) => atoms.push(atom),
                Formula::And(parts) => todo.extend(parts.iter()),
                Formula::Or(parts) if parts.is_empty() => return Ok(None),
                Formula::Or(parts) => ors.push(parts),
            }
        }

        self.branches += 1;
        match decide(&atoms) {
            Outcome::Unsat => return Ok(None),
            Outcome::Sat(assignment) if ors.is_empty() => return Ok(Some(assignment)),
            Outcome::Unknown(reason) if ors.is_empty() => {
                self.unknown = Some(reason);
                return Ok(None);
            }
            _ => {}
        }
        self.cancel.check()?;

        let pick = (0..ors.len()).min_by_key(|&i| ors[i].len()).unwrap_or(0);
        let branches = ors.swap_remove(pick);
        for branch in branches {
            if let Some(assignment) = self.run(vec![branch], atoms.clone(), ors.clone())? {
                return Ok(Some(assignment));
            }
        }
        Ok(None)
    }
}

/// Decides a conjunction of literals.
fn decide(atoms: &[&Atom]) -> Outcome<Assignment> {
    let mut bools: Vec<(usize, bool)> = Vec::new();
    let mut system = System::new();
    for atom in atoms {
        match atom {
            Atom::Bool(id, polarity) => {
                if bools.iter().any(|(s, p)| s == id && p != polarity) {
                    return Outcome::Unsat;
                }
                bools.push((*id, *polarity));
            }
            Atom::Le(lin) => system.add_le(lin.clone()),
            Atom::Eq(lin) => system.add_eq(lin.clone()),
        }
    }
    match system.solve() {
        Outcome::Sat(ints) => Outcome::Sat(Assignment { bools, ints }),
        Outcome::Unsat => Outcome::Unsat,
        Outcome::Unknown(reason) => Outcome::Unknown(reason),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::Var;
    use crate::solver::{check_model, is_sat, SolverScope};

    #[test]
    fn test_sat_with_model() {
        let solver = BuiltinSolver::new();
        let x = Var::int("x");
        let y = Var::int("y");
        let b = Var::bool("b");
        let formula = Expr::and([
            Expr::eq(x.expr(), Expr::add([y.expr(), Expr::int(2)])),
            Expr::gt(y.expr(), Expr::int(5)),
            Expr::imply(b.expr(), Expr::lt(x.expr(), Expr::int(0))),
        ]);
        let model = check_model(&solver, [formula.clone()]).unwrap().unwrap();
        assert_eq!(model.eval(&formula), Some(Value::Bool(true)));
        assert_eq!(model.get(&b.expr()), Some(Value::Bool(false)));
        assert_eq!(model.get(&y.expr()), Some(Value::Int(6)));
    }

    #[test]
    fn test_unsat_disjunction() {
        let solver = BuiltinSolver::new();
        let x = Var::int("x");
        let formula = Expr::and([
            Expr::or([Expr::eq(x.expr(), Expr::int(1)), Expr::eq(x.expr(), Expr::int(2))]),
            Expr::not(Expr::eq(x.expr(), Expr::int(1))),
            Expr::neq(x.expr(), Expr::int(2)),
        ]);
        assert!(!is_sat(&solver, [formula]).unwrap());
    }

    #[test]
    fn test_boolean_equality() {
        let solver = BuiltinSolver::new();
        let a = Var::bool("a");
        let b = Var::bool("b");
        let formula = Expr::and([Expr::eq(a.expr(), b.expr()), a.expr(), Expr::not(b.expr())]);
        assert!(!is_sat(&solver, [formula]).unwrap());
    }

    #[test]
    fn test_push_pop_restores_stack() {
        let solver = BuiltinSolver::new();
        let x = Var::int("x");
        solver.add(Expr::eq(x.expr(), Expr::int(0)));
        {
            let _scope = SolverScope::new(&solver);
            solver.add(Expr::eq(x.expr(), Expr::int(1)));
            assert_eq!(solver.check().unwrap(), SolverStatus::Unsat);
            assert_eq!(solver.depth(), 1);
        }
        assert_eq!(solver.depth(), 0);
        assert_eq!(solver.check().unwrap(), SolverStatus::Sat);
    }

    #[test]
    fn test_scope_pops_on_error() {
        let solver = BuiltinSolver::new();
        let x = Var::int("x");
        let nonlinear = Expr::eq(Expr::mul([x.expr(), x.expr()]), Expr::int(4));
        assert!(matches!(is_sat(&solver, [nonlinear]), Err(Error::Unsupported(_))));
        assert_eq!(solver.depth(), 0);
    }

    #[test]
    #[should_panic(expected = "pop without matching push")]
    fn test_unbalanced_pop() {
        BuiltinSolver::new().pop();
    }

    #[test]
    fn test_cancelled_query() {
        let cancel = CancelToken::new();
        let solver = BuiltinSolver::with_cancel(cancel.clone());
        cancel.cancel();
        assert!(matches!(is_sat(&solver, [Expr::bool(true)]), Err(Error::Cancelled)));
        assert_eq!(solver.depth(), 0);
    }

    #[test]
    fn test_indexed_copies_are_distinct() {
        let solver = BuiltinSolver::new();
        let x = Var::int("x");
        let formula = Expr::and([
            Expr::eq(x.at(0), Expr::int(0)),
            Expr::eq(x.at(1), Expr::add([x.at(0), Expr::int(1)])),
            Expr::eq(x.at(2), Expr::add([x.at(1), Expr::int(1)])),
        ]);
        let model = check_model(&solver, [formula]).unwrap().unwrap();
        assert_eq!(model.get(&x.at(2)), Some(Value::Int(2)));
        assert_eq!(model.get(&x.expr()), None);
    }
}
