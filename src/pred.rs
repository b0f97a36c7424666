//! The predicate abstraction domain.
//!
//! A state is a conjunction of predicates. Under the boolean predicate abstraction
//! used here, the post image of a state is the set of truth assignments to the tracked
//! predicates that are consistent with the state and the transition: one successor per
//! satisfiable cube.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::domain::{Domain, ExprAction, ExprState, ExprStrengthen, Prec};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::indexing::VarIndexing;
use crate::solver::{is_sat, Solver, SolverScope};
use crate::valuation::Value;

/// A conjunction of predicates. The empty conjunction is top; a state containing `false`
/// is bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PredState {
    preds: BTreeSet<Expr>,
}

impl PredState {
    pub fn top() -> Self {
        Self::default()
    }

    pub fn bottom() -> Self {
        Self::of([Expr::bool(false)])
    }

    /// The conjunction of `preds`; trivially true predicates are dropped and any false one
    /// collapses the state to bottom.
    pub fn of(preds: impl IntoIterator<Item = Expr>) -> Self {
        let mut set = BTreeSet::new();
        for pred in preds {
            if pred.is_false() {
                return Self {
                    preds: BTreeSet::from([pred]),
                };
            }
            if !pred.is_true() {
                set.insert(pred);
            }
        }
        Self { preds: set }
    }

    pub fn preds(&self) -> &BTreeSet<Expr> {
        &self.preds
    }

    pub fn is_bottom(&self) -> bool {
        self.preds.iter().any(Expr::is_false)
    }
}

impl ExprState for PredState {
    fn to_expr(&self) -> Expr {
        Expr::and(self.preds.iter().cloned())
    }
}

impl ExprStrengthen for PredState {
    /// A conjunctive label adds each conjunct as a predicate of its own.
    fn strengthen(&self, label: &Expr) -> Self {
        let conjuncts = match label {
            Expr::And(ops) => ops.clone(),
            label => vec![label.clone()],
        };
        Self::of(self.preds.iter().cloned().chain(conjuncts))
    }

    fn bottom(&self) -> Self {
        PredState::bottom()
    }
}

impl fmt::Display for PredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.preds.is_empty() {
            return write!(f, "true");
        }
        for (i, pred) in self.preds.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{pred}")?;
        }
        Ok(())
    }
}

/// The set of tracked predicates, over current-state variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PredPrec {
    preds: BTreeSet<Expr>,
}

impl PredPrec {
    pub fn new(preds: impl IntoIterator<Item = Expr>) -> Self {
        Self {
            preds: preds.into_iter().filter(|p| !p.is_true() && !p.is_false()).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn preds(&self) -> &BTreeSet<Expr> {
        &self.preds
    }
}

impl Prec for PredPrec {
    fn join(&self, other: &Self) -> Self {
        Self {
            preds: self.preds.union(&other.preds).cloned().collect(),
        }
    }
}

impl fmt::Display for PredPrec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, pred) in self.preds.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{pred}")?;
        }
        write!(f, "}}")
    }
}

pub struct PredDomain {
    solver: Rc<dyn Solver>,
    init: Expr,
    target: Expr,
}

impl PredDomain {
    pub fn new(solver: Rc<dyn Solver>, init: Expr, target: Expr) -> Self {
        Self { solver, init, target }
    }

    /// One state per satisfiable truth assignment of the predicates, where `preds` pairs
    /// each tracked predicate with its unfolding in `formula`.
    fn cubes(&self, formula: Expr, preds: &[(&Expr, Expr)]) -> Result<Vec<PredState>> {
        let solver = &*self.solver;
        let _scope = SolverScope::new(solver);
        solver.add(formula);
        let mut states = Vec::new();
        while solver.check()?.is_sat() {
            let model = solver
                .model()
                .ok_or_else(|| Error::Unknown("satisfiable without a model".into()))?;
            let mut literals = Vec::with_capacity(preds.len());
            let mut blocking = Vec::with_capacity(preds.len());
            for (pred, unfolded) in preds {
                let holds = model
                    .eval_complete(unfolded)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| Error::Unknown(format!("cannot evaluate `{unfolded}` in {model}")))?;
                if holds {
                    literals.push((*pred).clone());
                    blocking.push(unfolded.clone());
                } else {
                    literals.push(Expr::not((*pred).clone()));
                    blocking.push(Expr::not(unfolded.clone()));
                }
            }
            states.push(PredState::of(literals));
            if preds.is_empty() {
                break;
            }
            solver.add(Expr::not(Expr::and(blocking)));
        }
        Ok(states)
    }
}

impl<A: ExprAction> Domain<A> for PredDomain {
    type State = PredState;
    type Prec = PredPrec;

    fn init_states(&self, prec: &PredPrec) -> Result<Vec<PredState>> {
        let preds: Vec<(&Expr, Expr)> = prec.preds.iter().map(|p| (p, p.clone())).collect();
        self.cubes(self.init.clone(), &preds)
    }

    fn transfer(&self, state: &PredState, action: &A, prec: &PredPrec) -> Result<Vec<PredState>> {
        if state.is_bottom() {
            return Ok(Vec::new());
        }
        let from = VarIndexing::new();
        let (trans, to) = action.unfold(&from);
        let formula = Expr::and([from.unfold(&state.to_expr()), trans]);
        let preds: Vec<(&Expr, Expr)> = prec.preds.iter().map(|p| (p, to.unfold(p))).collect();
        self.cubes(formula, &preds)
    }

    fn may_be_target(&self, state: &PredState) -> Result<bool> {
        if state.is_bottom() {
            return Ok(false);
        }
        is_sat(&*self.solver, [state.to_expr(), self.target.clone()])
    }

    fn is_bottom(&self, state: &PredState) -> bool {
        state.is_bottom()
    }

    fn is_leq(&self, state1: &PredState, state2: &PredState) -> Result<bool> {
        if state1.is_bottom() || state2.preds.is_subset(&state1.preds) {
            return Ok(true);
        }
        Ok(!is_sat(&*self.solver, [state1.to_expr(), Expr::not(state2.to_expr())])?)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::Var;
    use crate::solver::BuiltinSolver;
    use crate::stmt::{unfold_stmts, Stmt};

    struct Stmts(Vec<Stmt>);

    impl ExprAction for Stmts {
        fn unfold(&self, from: &VarIndexing) -> (Expr, VarIndexing) {
            unfold_stmts(&self.0, from)
        }
    }

    fn domain(init: Expr, target: Expr) -> PredDomain {
        PredDomain::new(Rc::new(BuiltinSolver::new()), init, target)
    }

    #[test]
    fn test_state_normalization() {
        let x = Var::int("x");
        let p = Expr::gt(x.expr(), Expr::int(0));
        assert_eq!(PredState::of([Expr::bool(true), p.clone()]), PredState::of([p.clone()]));
        assert!(PredState::of([p.clone(), Expr::bool(false)]).is_bottom());
        assert_eq!(PredState::top().to_expr(), Expr::bool(true));
        assert_eq!(PredState::top().strengthen(&p), PredState::of([p.clone()]));
        assert!(PredState::of([p]).bottom().is_bottom());
    }

    #[test]
    fn test_strengthen_splits_conjunctions() {
        let x = Var::int("x");
        let y = Var::int("y");
        let p = Expr::gt(x.expr(), Expr::int(0));
        let q = Expr::eq(y.expr(), Expr::int(5));
        let state = PredState::top().strengthen(&Expr::and([p.clone(), q.clone()]));
        assert_eq!(state, PredState::of([p.clone(), q.clone()]));
        // A disjunction stays one predicate.
        let either = Expr::or([p.clone(), q.clone()]);
        assert_eq!(state.strengthen(&either).preds().len(), 3);
        let d = domain(Expr::bool(true), Expr::bool(false));
        assert!(Domain::<Stmts>::is_leq(&d, &state, &PredState::of([q])).unwrap());
    }

    #[test]
    fn test_init_cubes() {
        let x = Var::int("x");
        let d = domain(Expr::eq(x.expr(), Expr::int(0)), Expr::bool(false));
        let p = Expr::eq(x.expr(), Expr::int(0));
        let q = Expr::gt(x.expr(), Expr::int(5));
        let prec = PredPrec::new([p.clone(), q.clone()]);
        let init = Domain::<Stmts>::init_states(&d, &prec).unwrap();
        assert_eq!(init, vec![PredState::of([p, Expr::not(q)])]);
        assert_eq!(Domain::<Stmts>::init_states(&d, &PredPrec::empty()).unwrap(), vec![PredState::top()]);
    }

    #[test]
    fn test_transfer_splits_on_predicates() {
        let x = Var::int("x");
        let d = domain(Expr::bool(true), Expr::bool(false));
        let p = Expr::gt(x.expr(), Expr::int(0));
        let prec = PredPrec::new([p.clone()]);
        let havoc = Stmts(vec![Stmt::Havoc(x.clone())]);
        let mut succs = d.transfer(&PredState::top(), &havoc, &prec).unwrap();
        succs.sort();
        let mut expected = vec![PredState::of([p.clone()]), PredState::of([Expr::not(p.clone())])];
        expected.sort();
        assert_eq!(succs, expected);

        let inc = Stmts(vec![Stmt::Assign(x.clone(), Expr::add([x.expr(), Expr::int(1)]))]);
        let succs = d.transfer(&PredState::of([p.clone()]), &inc, &prec).unwrap();
        assert_eq!(succs, vec![PredState::of([p])]);
    }

    #[test]
    fn test_transfer_of_infeasible_action() {
        let x = Var::int("x");
        let d = domain(Expr::bool(true), Expr::bool(false));
        let state = PredState::of([Expr::eq(x.expr(), Expr::int(0))]);
        let guard = Stmts(vec![Stmt::Assume(Expr::gt(x.expr(), Expr::int(0)))]);
        assert!(d.transfer(&state, &guard, &PredPrec::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_is_leq_semantic() {
        let x = Var::int("x");
        let d = domain(Expr::bool(true), Expr::bool(false));
        let eq1 = PredState::of([Expr::eq(x.expr(), Expr::int(1))]);
        let pos = PredState::of([Expr::gt(x.expr(), Expr::int(0))]);
        assert!(Domain::<Stmts>::is_leq(&d, &eq1, &pos).unwrap());
        assert!(!Domain::<Stmts>::is_leq(&d, &pos, &eq1).unwrap());
        assert!(Domain::<Stmts>::is_leq(&d, &PredState::bottom(), &eq1).unwrap());
        assert!(Domain::<Stmts>::is_leq(&d, &eq1, &PredState::top()).unwrap());
    }

    #[test]
    fn test_may_be_target() {
        let x = Var::int("x");
        let d = domain(Expr::bool(true), Expr::eq(x.expr(), Expr::int(2)));
        assert!(Domain::<Stmts>::may_be_target(&d, &PredState::top()).unwrap());
        let s = PredState::of([Expr::lt(x.expr(), Expr::int(2))]);
        assert!(!Domain::<Stmts>::may_be_target(&d, &s).unwrap());
        assert!(!Domain::<Stmts>::may_be_target(&d, &PredState::bottom()).unwrap());
    }
}
