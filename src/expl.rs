//! The explicit-value domain.
//!
//! A state is a partial valuation over the tracked variables: every tracked variable is
//! either bound to a single value or left unknown. A state covers another when it binds
//! a subset of the other's bindings identically.
//!
//! The post image of an action is computed by enumerating the solver's models of
//! `state /\ transition` and reading off the tracked variables in the post state. An
//! unknown variable that the transition constrains to several values therefore yields
//! several successors.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::domain::{Domain, ExprAction, ExprState, Prec};
use crate::error::{Error, Result};
use crate::expr::{Expr, Var};
use crate::indexing::VarIndexing;
use crate::solver::{is_sat, Solver, SolverScope};
use crate::valuation::Valuation;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExplState {
    Bottom,
    Valuation(Valuation),
}

impl ExplState {
    /// The state with no bindings.
    pub fn top() -> Self {
        ExplState::Valuation(Valuation::new())
    }

    pub fn of(valuation: Valuation) -> Self {
        ExplState::Valuation(valuation)
    }

    pub fn valuation(&self) -> Option<&Valuation> {
        match self {
            ExplState::Bottom => None,
            ExplState::Valuation(val) => Some(val),
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, ExplState::Bottom)
    }

    /// Whether `self` binds everything `other` binds, to the same values.
    pub fn is_leq(&self, other: &ExplState) -> bool {
        match (self, other) {
            (ExplState::Bottom, _) => true,
            (_, ExplState::Bottom) => false,
            (ExplState::Valuation(val), ExplState::Valuation(other)) => {
                other.iter().all(|(var, value)| val.get(var) == Some(*value))
            }
        }
    }
}

impl ExprState for ExplState {
    fn to_expr(&self) -> Expr {
        match self {
            ExplState::Bottom => Expr::bool(false),
            ExplState::Valuation(val) => val.to_expr(),
        }
    }
}

impl fmt::Display for ExplState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplState::Bottom => write!(f, "⊥"),
            ExplState::Valuation(val) => write!(f, "{val}"),
        }
    }
}

/// The set of tracked variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExplPrec {
    vars: BTreeSet<Var>,
}

impl ExplPrec {
    pub fn new(vars: impl IntoIterator<Item = Var>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn vars(&self) -> &BTreeSet<Var> {
        &self.vars
    }

    /// The abstraction of a (partial) valuation: its bindings of tracked variables.
    pub fn create_state(&self, valuation: &Valuation) -> ExplState {
        ExplState::Valuation(valuation.project(&self.vars))
    }
}

impl Prec for ExplPrec {
    fn join(&self, other: &Self) -> Self {
        Self {
            vars: self.vars.union(&other.vars).cloned().collect(),
        }
    }
}

impl fmt::Display for ExplPrec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, var) in self.vars.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var}")?;
        }
        write!(f, "}}")
    }
}

/// Default bound on the number of successors enumerated per image.
pub const DEFAULT_MAX_SUCCESSORS: usize = 16;

pub struct ExplDomain {
    solver: Rc<dyn Solver>,
    init: Expr,
    target: Expr,
    max_successors: usize,
}

impl ExplDomain {
    /// An explicit domain for a model with initial condition `init` and target
    /// condition `target`, both over current-state variables.
    pub fn new(solver: Rc<dyn Solver>, init: Expr, target: Expr) -> Self {
        Self {
            solver,
            init,
            target,
            max_successors: DEFAULT_MAX_SUCCESSORS,
        }
    }

    /// Bounds model enumeration. Once an image has more than `max` successors, it is
    /// replaced by a single state that keeps only the bindings shared by all of them.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    pub fn with_max_successors(mut self, max: usize) -> Self {
        assert!(max > 0, "at least one successor must be enumerable");
        self.max_successors = max;
        self
    }

    /// Enumerates the abstract states of the models of `formula`, where `vars` pairs
    /// each tracked variable with the reference denoting its value in `formula`.
    fn enumerate(&self, formula: &Expr, vars: &[(Var, Expr)]) -> Result<Vec<ExplState>> {
        let solver = &*self.solver;
        let mut states = Vec::new();
        {
            let _scope = SolverScope::new(solver);
            solver.add(formula.clone());
            while solver.check()?.is_sat() {
                let model = solver
                    .model()
                    .ok_or_else(|| Error::Unknown("satisfiable without a model".into()))?;
                let mut valuation = Valuation::new();
                let mut blocking = Vec::new();
                for (var, leaf) in vars {
                    if let Some(value) = model.get(leaf) {
                        valuation.put(var.clone(), value);
                        blocking.push(Expr::eq(leaf.clone(), value.to_expr()));
                    }
                }
                states.push(ExplState::Valuation(valuation));
                if states.len() > self.max_successors {
                    break;
                }
                solver.add(Expr::not(Expr::and(blocking)));
            }
        }
        if states.len() > self.max_successors {
            debug!("more than {} successors, keeping common bindings", self.max_successors);
            return Ok(vec![self.common_bindings(formula, vars, &states[0])?]);
        }
        Ok(states)
    }

    /// The bindings of `reference` that hold in every model of `formula`.
    fn common_bindings(&self, formula: &Expr, vars: &[(Var, Expr)], reference: &ExplState) -> Result<ExplState> {
        let mut valuation = Valuation::new();
        if let ExplState::Valuation(reference) = reference {
            for (var, leaf) in vars {
                if let Some(value) = reference.get(var) {
                    let differs = Expr::neq(leaf.clone(), value.to_expr());
                    if !is_sat(&*self.solver, [formula.clone(), differs])? {
                        valuation.put(var.clone(), value);
                    }
                }
            }
        }
        Ok(ExplState::Valuation(valuation))
    }
}

impl<A: ExprAction> Domain<A> for ExplDomain {
    type State = ExplState;
    type Prec = ExplPrec;

    fn init_states(&self, prec: &ExplPrec) -> Result<Vec<ExplState>> {
        let vars: Vec<(Var, Expr)> = prec.vars.iter().map(|v| (v.clone(), v.expr())).collect();
        self.enumerate(&self.init, &vars)
    }

    fn transfer(&self, state: &ExplState, action: &A, prec: &ExplPrec) -> Result<Vec<ExplState>> {
        if state.is_bottom() {
            return Ok(Vec::new());
        }
        let from = VarIndexing::new();
        let (trans, to) = action.unfold(&from);
        let formula = Expr::and([from.unfold(&state.to_expr()), trans]);
        let vars: Vec<(Var, Expr)> = prec.vars.iter().map(|v| (v.clone(), v.at(to.get(v)))).collect();
        self.enumerate(&formula, &vars)
    }

    fn may_be_target(&self, state: &ExplState) -> Result<bool> {
        match state {
            ExplState::Bottom => Ok(false),
            ExplState::Valuation(val) => match val.eval(&self.target).and_then(|v| v.as_bool()) {
                Some(result) => Ok(result),
                None => is_sat(&*self.solver, [val.to_expr(), self.target.clone()]),
            },
        }
    }

    fn is_bottom(&self, state: &ExplState) -> bool {
        state.is_bottom()
    }

    fn is_leq(&self, state1: &ExplState, state2: &ExplState) -> Result<bool> {
        Ok(state1.is_leq(state2))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::solver::BuiltinSolver;
    use crate::stmt::{unfold_stmts, Stmt};
    use crate::valuation::Value;

    struct Stmts(Vec<Stmt>);

    impl ExprAction for Stmts {
        fn unfold(&self, from: &VarIndexing) -> (Expr, VarIndexing) {
            unfold_stmts(&self.0, from)
        }
    }

    fn val(bindings: &[(&Var, i64)]) -> ExplState {
        ExplState::of(bindings.iter().map(|(v, n)| ((*v).clone(), Value::Int(*n))).collect())
    }

    #[test]
    fn test_prec_join() {
        let x = Var::int("x");
        let y = Var::int("y");
        let px = ExplPrec::new([x.clone()]);
        let pxy = ExplPrec::new([x.clone(), y.clone()]);
        assert_eq!(px.join(&px), px);
        assert_eq!(px.join(&pxy), pxy);
        assert_eq!(pxy.join(&px), pxy);
    }

    #[test]
    fn test_create_state_projects() {
        let x = Var::int("x");
        let y = Var::int("y");
        let prec = ExplPrec::new([x.clone()]);
        let full: Valuation = [(x.clone(), Value::Int(1)), (y.clone(), Value::Int(2))].into_iter().collect();
        assert_eq!(prec.create_state(&full), val(&[(&x, 1)]));
        assert_eq!(ExplPrec::empty().create_state(&full), ExplState::top());
    }

    #[test]
    fn test_is_leq() {
        let x = Var::int("x");
        let y = Var::int("y");
        let s_xy = val(&[(&x, 1), (&y, 2)]);
        let s_x = val(&[(&x, 1)]);
        assert!(s_xy.is_leq(&s_x));
        assert!(!s_x.is_leq(&s_xy));
        assert!(s_x.is_leq(&ExplState::top()));
        assert!(ExplState::Bottom.is_leq(&s_x));
        assert!(!s_x.is_leq(&ExplState::Bottom));
        assert!(!val(&[(&x, 2)]).is_leq(&s_x));
    }

    #[test]
    fn test_init_and_transfer() {
        let x = Var::int("x");
        let y = Var::int("y");
        let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
        let init = Expr::and([Expr::eq(x.expr(), Expr::int(0)), Expr::eq(y.expr(), Expr::int(0))]);
        let domain = ExplDomain::new(solver, init, Expr::eq(x.expr(), Expr::int(5)));
        let prec = ExplPrec::new([x.clone()]);

        let init = Domain::<Stmts>::init_states(&domain, &prec).unwrap();
        assert_eq!(init, vec![val(&[(&x, 0)])]);

        let inc = Stmts(vec![Stmt::Assign(x.clone(), Expr::add([x.expr(), Expr::int(1)]))]);
        let succs = domain.transfer(&init[0], &inc, &prec).unwrap();
        assert_eq!(succs, vec![val(&[(&x, 1)])]);
        assert!(!Domain::<Stmts>::may_be_target(&domain, &succs[0]).unwrap());
        assert!(Domain::<Stmts>::may_be_target(&domain, &val(&[(&x, 5)])).unwrap());
        // Unknown x: decided by the solver.
        assert!(Domain::<Stmts>::may_be_target(&domain, &ExplState::top()).unwrap());
    }

    #[test]
    fn test_transfer_enumerates_branches() {
        let x = Var::int("x");
        let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
        let domain = ExplDomain::new(solver, Expr::bool(true), Expr::bool(false));
        let prec = ExplPrec::new([x.clone()]);
        let choice = Stmts(vec![
            Stmt::Havoc(x.clone()),
            Stmt::Assume(Expr::and([Expr::geq(x.expr(), Expr::int(0)), Expr::leq(x.expr(), Expr::int(2))])),
        ]);
        let mut succs = domain.transfer(&ExplState::top(), &choice, &prec).unwrap();
        succs.sort();
        assert_eq!(succs, vec![val(&[(&x, 0)]), val(&[(&x, 1)]), val(&[(&x, 2)])]);

        let blocked = Stmts(vec![Stmt::Assume(Expr::bool(false))]);
        assert!(domain.transfer(&ExplState::top(), &blocked, &prec).unwrap().is_empty());
    }

    #[test]
    fn test_enumeration_bound_keeps_common_bindings() {
        let x = Var::int("x");
        let y = Var::int("y");
        let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
        let domain = ExplDomain::new(solver, Expr::bool(true), Expr::bool(false)).with_max_successors(2);
        let prec = ExplPrec::new([x.clone(), y.clone()]);
        let action = Stmts(vec![
            Stmt::Havoc(x.clone()),
            Stmt::Assume(Expr::and([Expr::geq(x.expr(), Expr::int(0)), Expr::leq(x.expr(), Expr::int(5))])),
            Stmt::Assign(y.clone(), Expr::int(7)),
        ]);
        let succs = domain.transfer(&ExplState::top(), &action, &prec).unwrap();
        assert_eq!(succs, vec![val(&[(&y, 7)])]);
    }
}
