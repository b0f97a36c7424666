//! Products of two domains.
//!
//! A composite state is a pair of component states. Successors are the pairs of
//! component successors, passed through a [`Strengthener`] that may refine or discard
//! pairs using information from the other component.

use std::fmt;
use std::rc::Rc;

use crate::cfa::Loc;
use crate::domain::{Domain, ExprState, ExprStrengthen, Prec};
use crate::error::Result;
use crate::expr::Expr;
use crate::loc::LocAware;
use crate::solver::{is_sat, Solver};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeState<S1, S2>(pub S1, pub S2);

impl<S1: ExprState, S2: ExprState> ExprState for CompositeState<S1, S2> {
    fn to_expr(&self) -> Expr {
        Expr::and([self.0.to_expr(), self.1.to_expr()])
    }
}

/// Refinement labels go to the second component, the first is kept as is.
impl<S1: ExprState + Clone, S2: ExprStrengthen> ExprStrengthen for CompositeState<S1, S2> {
    fn strengthen(&self, label: &Expr) -> Self {
        CompositeState(self.0.clone(), self.1.strengthen(label))
    }

    fn bottom(&self) -> Self {
        CompositeState(self.0.clone(), self.1.bottom())
    }
}

impl<S1: LocAware, S2> LocAware for CompositeState<S1, S2> {
    fn loc(&self) -> &Loc {
        self.0.loc()
    }
}

impl<S1: fmt::Display, S2: fmt::Display> fmt::Display for CompositeState<S1, S2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompositePrec<P1, P2>(pub P1, pub P2);

impl<P1: Prec, P2: Prec> Prec for CompositePrec<P1, P2> {
    fn join(&self, other: &Self) -> Self {
        CompositePrec(self.0.join(&other.0), self.1.join(&other.1))
    }
}

impl<P1: fmt::Display, P2: fmt::Display> fmt::Display for CompositePrec<P1, P2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

/// Post-processing of component products.
pub trait Strengthener<S1, S2, P1, P2> {
    fn strengthen(
        &self,
        states: Vec<CompositeState<S1, S2>>,
        prec: &CompositePrec<P1, P2>,
    ) -> Result<Vec<CompositeState<S1, S2>>>;
}

/// Keeps every pair.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityStrengthener;

impl<S1, S2, P1, P2> Strengthener<S1, S2, P1, P2> for IdentityStrengthener {
    fn strengthen(
        &self,
        states: Vec<CompositeState<S1, S2>>,
        _prec: &CompositePrec<P1, P2>,
    ) -> Result<Vec<CompositeState<S1, S2>>> {
        Ok(states)
    }
}

/// Drops the pairs whose components contradict each other.
pub struct SolverStrengthener {
    solver: Rc<dyn Solver>,
}

impl SolverStrengthener {
    pub fn new(solver: Rc<dyn Solver>) -> Self {
        Self { solver }
    }
}

impl<S1: ExprState, S2: ExprState, P1, P2> Strengthener<S1, S2, P1, P2> for SolverStrengthener {
    fn strengthen(
        &self,
        states: Vec<CompositeState<S1, S2>>,
        _prec: &CompositePrec<P1, P2>,
    ) -> Result<Vec<CompositeState<S1, S2>>> {
        let mut kept = Vec::with_capacity(states.len());
        for state in states {
            if is_sat(&*self.solver, [state.0.to_expr(), state.1.to_expr()])? {
                kept.push(state);
            }
        }
        Ok(kept)
    }
}

pub struct CompositeDomain<D1, D2, St = IdentityStrengthener> {
    first: D1,
    second: D2,
    strengthener: St,
}

impl<D1, D2> CompositeDomain<D1, D2> {
    pub fn new(first: D1, second: D2) -> Self {
        Self {
            first,
            second,
            strengthener: IdentityStrengthener,
        }
    }
}

impl<D1, D2, St> CompositeDomain<D1, D2, St> {
    pub fn with_strengthener<T>(self, strengthener: T) -> CompositeDomain<D1, D2, T> {
        CompositeDomain {
            first: self.first,
            second: self.second,
            strengthener,
        }
    }

    pub fn first(&self) -> &D1 {
        &self.first
    }

    pub fn second(&self) -> &D2 {
        &self.second
    }
}

impl<A, D1, D2, St> Domain<A> for CompositeDomain<D1, D2, St>
where
    D1: Domain<A>,
    D2: Domain<A>,
    St: Strengthener<D1::State, D2::State, D1::Prec, D2::Prec>,
{
    type State = CompositeState<D1::State, D2::State>;
    type Prec = CompositePrec<D1::Prec, D2::Prec>;

    fn init_states(&self, prec: &Self::Prec) -> Result<Vec<Self::State>> {
        let firsts = self.first.init_states(&prec.0)?;
        let seconds = self.second.init_states(&prec.1)?;
        self.strengthener.strengthen(product(&firsts, &seconds), prec)
    }

    fn transfer(&self, state: &Self::State, action: &A, prec: &Self::Prec) -> Result<Vec<Self::State>> {
        let firsts = self.first.transfer(&state.0, action, &prec.0)?;
        if firsts.is_empty() {
            return Ok(Vec::new());
        }
        let seconds = self.second.transfer(&state.1, action, &prec.1)?;
        if seconds.is_empty() {
            return Ok(Vec::new());
        }
        self.strengthener.strengthen(product(&firsts, &seconds), prec)
    }

    fn may_be_target(&self, state: &Self::State) -> Result<bool> {
        if self.is_bottom(state) {
            return Ok(false);
        }
        // The pair denotes the intersection of its components.
        Ok(self.first.may_be_target(&state.0)? && self.second.may_be_target(&state.1)?)
    }

    fn is_bottom(&self, state: &Self::State) -> bool {
        self.first.is_bottom(&state.0) || self.second.is_bottom(&state.1)
    }

    fn is_leq(&self, state1: &Self::State, state2: &Self::State) -> Result<bool> {
        Ok(self.first.is_leq(&state1.0, &state2.0)? && self.second.is_leq(&state1.1, &state2.1)?)
    }
}

fn product<S1: Clone, S2: Clone>(firsts: &[S1], seconds: &[S2]) -> Vec<CompositeState<S1, S2>> {
    let mut states = Vec::with_capacity(firsts.len() * seconds.len());
    for s1 in firsts {
        for s2 in seconds {
            states.push(CompositeState(s1.clone(), s2.clone()));
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::domain::ExprAction;
    use crate::expl::{ExplDomain, ExplPrec, ExplState};
    use crate::expr::Var;
    use crate::indexing::VarIndexing;
    use crate::null::{NullDomain, NullPrec, NullState};
    use crate::pred::{PredDomain, PredPrec, PredState};
    use crate::solver::BuiltinSolver;
    use crate::stmt::{unfold_stmts, Stmt};
    use crate::valuation::Value;

    struct Stmts(Vec<Stmt>);

    impl ExprAction for Stmts {
        fn unfold(&self, from: &VarIndexing) -> (Expr, VarIndexing) {
            unfold_stmts(&self.0, from)
        }
    }

    #[test]
    fn test_componentwise() {
        let x = Var::int("x");
        let y = Var::int("y");
        let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
        let init = Expr::and([Expr::eq(x.expr(), Expr::int(0)), Expr::eq(y.expr(), Expr::int(0))]);
        let target = Expr::eq(y.expr(), Expr::int(3));
        let expl = ExplDomain::new(solver.clone(), init.clone(), target.clone());
        let pred = PredDomain::new(solver.clone(), init, target);
        let domain = CompositeDomain::new(expl, pred);
        let prec = CompositePrec(ExplPrec::new([x.clone()]), PredPrec::new([Expr::geq(y.expr(), Expr::int(0))]));

        let init = Domain::<Stmts>::init_states(&domain, &prec).unwrap();
        assert_eq!(init.len(), 1);
        let x0 = ExplState::of([(x.clone(), Value::Int(0))].into_iter().collect());
        assert_eq!(init[0], CompositeState(x0.clone(), PredState::of([Expr::geq(y.expr(), Expr::int(0))])));
        // y = 3 is not excluded by either component.
        assert!(Domain::<Stmts>::may_be_target(&domain, &init[0]).unwrap());
        // The predicate component alone rules it out.
        let below = CompositeState(x0.clone(), PredState::of([Expr::lt(y.expr(), Expr::int(3))]));
        assert!(!Domain::<Stmts>::may_be_target(&domain, &below).unwrap());

        let blocked = Stmts(vec![Stmt::Assume(Expr::bool(false))]);
        assert!(domain.transfer(&init[0], &blocked, &prec).unwrap().is_empty());

        let bottom = CompositeState(x0.clone(), PredState::bottom());
        assert!(Domain::<Stmts>::is_bottom(&domain, &bottom));
        assert!(!Domain::<Stmts>::may_be_target(&domain, &bottom).unwrap());
        assert!(Domain::<Stmts>::is_leq(&domain, &bottom, &init[0]).unwrap());
        let wider = CompositeState(ExplState::top(), PredState::top());
        assert!(Domain::<Stmts>::is_leq(&domain, &init[0], &wider).unwrap());
        assert!(!Domain::<Stmts>::is_leq(&domain, &wider, &init[0]).unwrap());
    }

    #[test]
    fn test_solver_strengthener_drops_contradictions() {
        let x = Var::int("x");
        let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
        let expl = ExplDomain::new(solver.clone(), Expr::bool(true), Expr::bool(false));
        let pred = PredDomain::new(solver.clone(), Expr::bool(true), Expr::bool(false));
        let domain = CompositeDomain::new(expl, pred).with_strengthener(SolverStrengthener::new(solver));
        let p = Expr::gt(x.expr(), Expr::int(0));
        let prec = CompositePrec(ExplPrec::new([x.clone()]), PredPrec::new([p.clone()]));
        let set_one = Stmts(vec![Stmt::Assign(x.clone(), Expr::int(1))]);
        let start = CompositeState(ExplState::top(), PredState::top());
        let succs = domain.transfer(&start, &set_one, &prec).unwrap();
        let x1 = ExplState::of([(x.clone(), Value::Int(1))].into_iter().collect());
        assert_eq!(succs, vec![CompositeState(x1, PredState::of([p]))]);
    }

    #[test]
    fn test_strengthen_second_component() {
        let x = Var::int("x");
        let label = Expr::lt(x.expr(), Expr::int(2));
        let state = CompositeState(NullState, PredState::top());
        assert_eq!(state.strengthen(&label), CompositeState(NullState, PredState::of([label])));
        assert!(state.bottom().1.is_bottom());
        let domain = CompositeDomain::new(NullDomain, NullDomain);
        let prec = CompositePrec(NullPrec, NullPrec);
        assert_eq!(Domain::<()>::init_states(&domain, &prec).unwrap(), vec![CompositeState(NullState, NullState)]);
    }
}
