//! Plain reachability over a fixed precision.
//!
//! The abstractor unwinds the ARG in waitlist order until a target node is popped or no
//! node is left to expand. It never refines; the CEGAR loop in [`crate::cegar`] wraps it
//! for that.

use std::hash::Hash;

use log::{debug, info};

use crate::arg::{Arg, NodeId};
use crate::builder::ArgBuilder;
use crate::cancel::CancelToken;
use crate::domain::{Domain, Lts};
use crate::error::Result;
use crate::reached::{single_partition, Partitioning, ReachedSet};
use crate::safety::{finish, CheckResult, SafetyChecker};
use crate::waitlist::{FifoWaitlist, WaitlistSupplier};

/// Which nodes count as targets.
pub enum Target<S> {
    /// The domain's `may_be_target`, as cached on the nodes.
    Domain,
    Predicate(Box<dyn Fn(&S) -> bool>),
}

pub struct WaitlistBasedAbstractor<L, D, A, K = ()>
where
    D: Domain<A>,
{
    builder: ArgBuilder<L, D, A>,
    target: Target<D::State>,
    waitlist: WaitlistSupplier<NodeId>,
    partitioning: Option<Partitioning<D::State, K>>,
    cancel: CancelToken,
}

impl<L, D, A> WaitlistBasedAbstractor<L, D, A>
where
    D: Domain<A>,
    D::State: 'static,
    L: Lts<D::State, A>,
{
    /// An abstractor with FIFO order that expands every reachable node.
    pub fn new(builder: ArgBuilder<L, D, A>) -> Self {
        Self {
            builder,
            target: Target::Domain,
            waitlist: FifoWaitlist::supplier(),
            partitioning: None,
            cancel: CancelToken::new(),
        }
    }

    /// Covers nodes against any earlier node.
    pub fn with_covering(mut self) -> Self {
        self.partitioning = Some(single_partition());
        self
    }
}

impl<L, D, A, K> WaitlistBasedAbstractor<L, D, A, K>
where
    D: Domain<A>,
    L: Lts<D::State, A>,
    A: Clone,
    K: Hash + Eq,
{
    pub fn with_target(mut self, target: Target<D::State>) -> Self {
        self.target = target;
        self
    }

    pub fn with_waitlist(mut self, waitlist: WaitlistSupplier<NodeId>) -> Self {
        self.waitlist = waitlist;
        self
    }

    /// Covers nodes against earlier nodes of the same partition.
    pub fn with_partitioning<K2>(self, partitioning: Partitioning<D::State, K2>) -> WaitlistBasedAbstractor<L, D, A, K2> {
        WaitlistBasedAbstractor {
            builder: self.builder,
            target: self.target,
            waitlist: self.waitlist,
            partitioning: Some(partitioning),
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

    fn is_target(&self, arg: &Arg<D::State, A>, n: NodeId) -> bool {
        match &self.target {
            Target::Domain => arg.is_target(n),
            Target::Predicate(pred) => pred(arg.state(n)),
        }
    }

    fn search(&self, arg: &mut Arg<D::State, A>, prec: &D::Prec) -> Result<Option<NodeId>> {
        let mut reached = self.partitioning.clone().map(ReachedSet::new);
        let mut waitlist = (self.waitlist)();
        let roots = self.builder.init(arg, prec)?;
        if let Some(reached) = &mut reached {
            reached.add_all(arg, roots.iter().copied());
        }
        waitlist.add_all(roots);

        while let Some(n) = waitlist.remove() {
            self.cancel.check()?;
            if arg.is_excluded(n) {
                continue;
            }
            if self.is_target(arg, n) {
                debug!("target {} reached", n);
                return Ok(Some(n));
            }
            if let Some(reached) = &reached {
                if reached.try_to_cover(arg, self.builder.domain(), n)? {
                    continue;
                }
            }
            let succs = self.builder.expand(arg, n, prec)?;
            if let Some(reached) = &mut reached {
                reached.add_all(arg, succs.iter().copied());
            }
            waitlist.add_all(succs.into_iter().filter(|&s| !arg.is_excluded(s)).collect());
        }
        Ok(None)
    }
}

impl<L, D, A, K> SafetyChecker<D::State, A, D::Prec> for WaitlistBasedAbstractor<L, D, A, K>
where
    D: Domain<A>,
    L: Lts<D::State, A>,
    A: Clone,
    K: Hash + Eq,
{
    fn check(&self, prec: &D::Prec) -> CheckResult<D::State, A> {
        info!("abstraction with precision {:?}", prec);
        let mut arg = self.builder.create_arg();
        let outcome = self.search(&mut arg, prec);
        let result = finish(arg, outcome);
        match &result {
            Ok(status) => info!("abstraction finished: {} ({} nodes)", status, status.arg().map_or(0, Arg::len)),
            Err(failure) => info!("abstraction failed: {}", failure),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::Error;
    use crate::expl::{ExplDomain, ExplPrec};
    use crate::expr::{Expr, Var};
    use crate::safety::SafetyStatus;
    use crate::solver::BuiltinSolver;
    use crate::sts::{Sts, StsAction, StsLts};
    use crate::waitlist::LifoWaitlist;
    use std::rc::Rc;

    fn counter(bound: i64) -> Sts {
        let x = Var::int("x");
        Sts::builder()
            .var(x.clone())
            .init(Expr::eq(x.expr(), Expr::int(0)))
            .trans(Expr::and([
                Expr::lt(x.expr(), Expr::int(bound)),
                Expr::eq(x.prime(), Expr::add([x.expr(), Expr::int(1)])),
            ]))
            .prop(Expr::lt(x.expr(), Expr::int(3)))
            .build()
            .unwrap()
    }

    fn abstractor(sts: &Sts) -> WaitlistBasedAbstractor<StsLts, ExplDomain, StsAction> {
        let solver = Rc::new(BuiltinSolver::new());
        let domain = ExplDomain::new(solver, sts.init_formula(), sts.target());
        WaitlistBasedAbstractor::new(ArgBuilder::new(sts.lts(), domain))
    }

    #[test]
    fn test_unsafe_counter() {
        let sts = counter(10);
        let prec = ExplPrec::new(sts.vars().iter().cloned());
        let status = abstractor(&sts).check(&prec).unwrap();
        assert!(status.is_unsafe());
        assert_eq!(status.trace().map(|t| t.len()), Some(4));
    }

    #[test]
    fn test_safe_counter() {
        let sts = counter(2);
        let prec = ExplPrec::new(sts.vars().iter().cloned());
        let status = abstractor(&sts)
            .with_waitlist(LifoWaitlist::supplier())
            .check(&prec)
            .unwrap();
        let SafetyStatus::Safe { arg } = status else {
            panic!("expected SAFE");
        };
        assert_eq!(arg.len(), 3);
        assert!(arg.is_complete());
    }

    /// Two paths meet in `x = 1, y = 1`.
    fn diamond() -> Sts {
        "var x : int
         var y : int
         init x = 0 && y = 0
         trans (x' = x + 1 && y' = y || x' = x && y' = y + 1) && x' <= 1 && y' <= 1
         prop x + y <= 2"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_covering_is_opt_in() {
        let sts = diamond();
        let prec = ExplPrec::new(sts.vars().iter().cloned());

        let SafetyStatus::Safe { arg } = abstractor(&sts).check(&prec).unwrap() else {
            panic!("expected SAFE");
        };
        assert_eq!(arg.len(), 5);
        assert_eq!(arg.coverings().count(), 0);
        assert!(arg.nodes().all(|n| arg.is_expanded(n)));

        let SafetyStatus::Safe { arg } = abstractor(&sts).with_covering().check(&prec).unwrap() else {
            panic!("expected SAFE");
        };
        assert_eq!(arg.len(), 5);
        assert_eq!(arg.coverings().count(), 1);
        let (covered, _) = arg.coverings().next().unwrap();
        assert!(!arg.is_expanded(covered));
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
        let prec = ExplPrec::new(sts.vars().iter().cloned());
        let Err(failure) = abstractor(&sts).check(&prec) else {
            panic!("expected the check to fail");
        };
        assert!(matches!(failure.error, Error::Unsupported(_)), "{}", failure.error);
        assert_eq!(failure.arg.len(), 1);
        assert!(!failure.arg.is_expanded(failure.arg.init_nodes()[0]));
    }

    #[test]
    fn test_predicate_target() {
        let sts = counter(10);
        let x = Var::int("x");
        let prec = ExplPrec::new([x.clone()]);
        let target = Target::Predicate(Box::new(move |s: &crate::expl::ExplState| {
            s.valuation().and_then(|v| v.get(&x)).and_then(|v| v.as_int()) == Some(1)
        }));
        let status = abstractor(&sts).with_target(target).check(&prec).unwrap();
        assert_eq!(status.trace().map(|t| t.len()), Some(2));
    }

    #[test]
    fn test_cancelled() {
        let sts = counter(10);
        let cancel = CancelToken::new();
        cancel.cancel();
        let status = abstractor(&sts).with_cancel(cancel).check(&ExplPrec::empty()).unwrap();
        assert!(status.is_aborted());
    }
}
