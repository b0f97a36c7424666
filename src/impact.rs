//! Lazy abstraction with refinement on target nodes.
//!
//! The checker unwinds the ARG depth-first. When it pops a target node it asks the
//! refiner about the path to that node: a feasible path is a counterexample, otherwise
//! the states along the path are strengthened in place and the search goes on. Nodes are
//! covered whenever a same-partition node subsumes them, and strengthening a node
//! uncovers whatever it covered.

use std::hash::Hash;
use std::rc::Rc;

use log::{debug, info};

use crate::arg::{Arg, NodeId};
use crate::builder::ArgBuilder;
use crate::cancel::CancelToken;
use crate::domain::{Domain, Lts};
use crate::error::{Error, Result};
use crate::reached::{single_partition, Partitioning, ReachedSet};
use crate::refiner::{RefinementResult, Refiner};
use crate::safety::{finish, CheckResult, SafetyChecker};
use crate::trace::ArgTrace;
use crate::waitlist::{LifoWaitlist, Waitlist};

pub struct ImpactChecker<L, D, A, R, K = ()>
where
    D: Domain<A>,
{
    builder: ArgBuilder<L, D, A>,
    refiner: R,
    partitioning: Partitioning<D::State, K>,
    cancel: CancelToken,
}

impl<L, D, A, R> ImpactChecker<L, D, A, R>
where
    D: Domain<A>,
    D::State: 'static,
{
    pub fn new(builder: ArgBuilder<L, D, A>, refiner: R) -> Self {
        Self {
            builder,
            refiner,
            partitioning: single_partition(),
            cancel: CancelToken::new(),
        }
    }
}

impl<L, D, A, R, K> ImpactChecker<L, D, A, R, K>
where
    D: Domain<A>,
    L: Lts<D::State, A>,
    A: Clone,
    R: Refiner<D::State, A>,
    K: Hash + Eq,
{
    /// Covers nodes only against nodes of the same partition. The key of a state must
    /// survive strengthening: it is computed once, when the node is created.
    pub fn with_partitioning<K2>(self, partitioning: Partitioning<D::State, K2>) -> ImpactChecker<L, D, A, R, K2> {
        ImpactChecker {
            builder: self.builder,
            refiner: self.refiner,
            partitioning,
            cancel: self.cancel,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn builder(&self) -> &ArgBuilder<L, D, A> {
        &self.builder
    }

    fn unwind(&self, arg: &mut Arg<D::State, A>, prec: &D::Prec) -> Result<Option<NodeId>> {
        let mut reached = ReachedSet::new(Rc::clone(&self.partitioning));
        let roots = self.builder.init(arg, prec)?;
        reached.add_all(arg, roots);

        loop {
            let next = arg.incomplete_nodes().next();
            let Some(v) = next else { break };
            self.cancel.check()?;
            debug_assert!(arg.is_leaf(v));
            self.close_proper_ancestors(arg, &reached, v)?;
            if let Some(n) = self.dfs(arg, &mut reached, v, prec)? {
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    fn dfs(
        &self,
        arg: &mut Arg<D::State, A>,
        reached: &mut ReachedSet<D::State, K>,
        v: NodeId,
        prec: &D::Prec,
    ) -> Result<Option<NodeId>> {
        debug!("dfs({})", v);
        let mut waitlist = LifoWaitlist::default();
        waitlist.add(v);
        while let Some(w) = waitlist.remove() {
            self.cancel.check()?;
            self.close(arg, reached, w)?;
            if arg.is_excluded(w) {
                continue;
            }
            if arg.is_target(w) {
                if !self.refine(arg, w)? {
                    return Ok(Some(w));
                }
                self.close_proper_ancestors(arg, reached, w)?;
                self.close(arg, reached, w)?;
                if arg.is_excluded(w) {
                    continue;
                }
                if arg.is_target(w) {
                    return Err(Error::Refinement(format!("{w} is still a target after refinement")));
                }
            }
            let succs = self.builder.expand(arg, w, prec)?;
            reached.add_all(arg, succs.iter().copied());
            waitlist.add_all(succs);
        }
        Ok(None)
    }

    fn close(&self, arg: &mut Arg<D::State, A>, reached: &ReachedSet<D::State, K>, v: NodeId) -> Result<()> {
        reached.try_to_cover(arg, self.builder.domain(), v)?;
        Ok(())
    }

    fn close_proper_ancestors(
        &self,
        arg: &mut Arg<D::State, A>,
        reached: &ReachedSet<D::State, K>,
        v: NodeId,
    ) -> Result<()> {
        for w in arg.proper_ancestors(v) {
            self.close(arg, reached, w)?;
        }
        Ok(())
    }

    /// Refines the path to `v`. Returns false if the path is feasible.
    fn refine(&self, arg: &mut Arg<D::State, A>, v: NodeId) -> Result<bool> {
        debug!("refine({})", v);
        let path = ArgTrace::to(arg, v);
        let trace = path.to_trace(arg);
        match self.refiner.refine(&trace)? {
            RefinementResult::Unsuccessful { .. } => Ok(false),
            RefinementResult::Successful(refined) => {
                let (states, _) = refined.into_parts();
                for (&n, state) in path.nodes().iter().zip(states) {
                    if &state != arg.state(n) {
                        self.builder.set_state(arg, n, state)?;
                    }
                }
                Ok(true)
            }
        }
    }
}

impl<L, D, A, R, K> SafetyChecker<D::State, A, D::Prec> for ImpactChecker<L, D, A, R, K>
where
    D: Domain<A>,
    L: Lts<D::State, A>,
    A: Clone,
    R: Refiner<D::State, A>,
    K: Hash + Eq,
{
    fn check(&self, prec: &D::Prec) -> CheckResult<D::State, A> {
        info!("impact with precision {:?}", prec);
        let mut arg = self.builder.create_arg();
        let outcome = self.unwind(&mut arg, prec);
        let result = finish(arg, outcome);
        match &result {
            Ok(status) => info!("impact finished: {} ({} nodes)", status, status.arg().map_or(0, Arg::len)),
            Err(failure) => info!("impact failed: {}", failure),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::{Expr, Var};
    use crate::pred::{PredDomain, PredPrec, PredState};
    use crate::refiner::ExprRefiner;
    use crate::safety::SafetyStatus;
    use crate::solver::BuiltinSolver;
    use crate::sts::{Sts, StsAction, StsLts};

    fn counter(bound: i64, limit: i64) -> Sts {
        let x = Var::int("x");
        Sts::builder()
            .var(x.clone())
            .init(Expr::eq(x.expr(), Expr::int(0)))
            .trans(Expr::and([
                Expr::lt(x.expr(), Expr::int(bound)),
                Expr::eq(x.prime(), Expr::add([x.expr(), Expr::int(1)])),
            ]))
            .prop(Expr::lt(x.expr(), Expr::int(limit)))
            .build()
            .unwrap()
    }

    fn checker(sts: &Sts) -> ImpactChecker<StsLts, PredDomain, StsAction, ExprRefiner<PredState>> {
        let solver = Rc::new(BuiltinSolver::new());
        let domain = PredDomain::new(solver.clone(), sts.init_formula(), sts.target());
        let target = sts.target();
        let refiner = ExprRefiner::new(solver, sts.init_formula(), move |_: &PredState| target.clone());
        ImpactChecker::new(ArgBuilder::new(sts.lts(), domain), refiner)
    }

    #[test]
    fn test_safe_counter() {
        let sts = counter(2, 3);
        let status = checker(&sts).check(&PredPrec::empty()).unwrap();
        let SafetyStatus::Safe { arg } = status else {
            panic!("expected SAFE");
        };
        assert!(arg.is_complete());
        assert_eq!(arg.len(), 2);
        let n1 = arg.succs(arg.init_nodes()[0])[0];
        assert_eq!(arg.node(n1).covering(), Some(arg.init_nodes()[0]));
    }

    #[test]
    fn test_unsafe_counter() {
        let sts = counter(10, 2);
        let status = checker(&sts).check(&PredPrec::empty()).unwrap();
        assert!(status.is_unsafe());
        assert_eq!(status.trace().map(|t| t.len()), Some(3));
    }

    #[test]
    fn test_initial_target() {
        let sts = counter(10, 0);
        let status = checker(&sts).check(&PredPrec::empty()).unwrap();
        assert_eq!(status.trace().map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_counter_bounded_by_other_variable() {
        // Only `y = 5` makes the bound on `x` inductive.
        let sts: Sts = "var x : int
                        var y : int
                        init x = 0 && y = 5
                        trans x < y && x' = x + 1 && y' = y || x >= y && x' = x && y' = y
                        prop x <= 5"
            .parse()
            .unwrap();
        let checker = checker(&sts);
        let SafetyStatus::Safe { arg } = checker.check(&PredPrec::empty()).unwrap() else {
            panic!("expected SAFE");
        };
        assert!(arg.is_complete());
        assert!(arg.len() <= 16, "{} nodes", arg.len());
        assert!(arg.coverings().count() > 0);
        for (n, m) in arg.coverings() {
            assert!(Domain::<StsAction>::is_leq(checker.builder().domain(), arg.state(n), arg.state(m)).unwrap());
        }
    }

    #[test]
    fn test_unsupported_transition_fails_with_partial_arg() {
        let sts: Sts = "var x : int
                        var y : int
                        init x = 0 && y = 1
                        trans x' = x * y && y' = y
                        prop x >= 0"
            .parse()
            .unwrap();
        let Err(failure) = checker(&sts).check(&PredPrec::empty()) else {
            panic!("expected the check to fail");
        };
        assert!(matches!(failure.error, Error::Unsupported(_)), "{}", failure.error);
        assert_eq!(failure.arg.len(), 1);
        // The root was refined before its expansion failed.
        let root = failure.arg.init_nodes()[0];
        assert!(!failure.arg.state(root).preds().is_empty());
        assert!(!failure.arg.is_expanded(root));
    }

    #[test]
    fn test_cancelled() {
        let sts = counter(10, 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        let status = checker(&sts).with_cancel(cancel).check(&PredPrec::empty()).unwrap();
        assert!(status.is_aborted());
    }
}
