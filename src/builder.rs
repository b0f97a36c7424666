use std::marker::PhantomData;

use log::debug;

use crate::arg::{Arg, NodeId};
use crate::domain::{Domain, Lts};
use crate::error::Result;

/// Builds ARGs from an LTS and a domain: creates roots, expands nodes, and replaces
/// node states during refinement.
pub struct ArgBuilder<L, D, A> {
    lts: L,
    domain: D,
    _action: PhantomData<fn() -> A>,
}

impl<L, D, A> ArgBuilder<L, D, A>
where
    D: Domain<A>,
    L: Lts<D::State, A>,
{
    pub fn new(lts: L, domain: D) -> Self {
        Self {
            lts,
            domain,
            _action: PhantomData,
        }
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn create_arg(&self) -> Arg<D::State, A> {
        Arg::new()
    }

    /// Adds a root for every non-bottom initial state and returns the new roots.
    pub fn init(&self, arg: &mut Arg<D::State, A>, prec: &D::Prec) -> Result<Vec<NodeId>> {
        let mut roots = Vec::new();
        for state in self.domain.init_states(prec)? {
            if self.domain.is_bottom(&state) {
                continue;
            }
            let target = self.domain.may_be_target(&state)?;
            let n = arg.create_root(state, target);
            debug!("init {} (target={})", n, target);
            roots.push(n);
        }
        Ok(roots)
    }

    /// Attaches the non-bottom successors of `n` along every enabled action, in the
    /// order the LTS and the domain produce them, and marks `n` expanded.
    ///
    /// # Panics
    ///
    /// Panics if `n` is excluded or already expanded.
    pub fn expand(&self, arg: &mut Arg<D::State, A>, n: NodeId, prec: &D::Prec) -> Result<Vec<NodeId>>
    where
        A: Clone,
    {
        assert!(!arg.is_excluded(n), "excluded node {n} cannot be expanded");
        assert!(!arg.is_expanded(n), "{n} is already expanded");
        let mut succs = Vec::new();
        for action in self.lts.enabled_actions(arg.state(n)) {
            for state in self.domain.transfer(arg.state(n), &action, prec)? {
                if self.domain.is_bottom(&state) {
                    continue;
                }
                let target = self.domain.may_be_target(&state)?;
                succs.push(arg.create_successor(n, action.clone(), state, target));
            }
        }
        arg.mark_expanded(n);
        debug!("expand({}) -> {} successors", n, succs.len());
        Ok(succs)
    }

    /// Replaces the state of `n`, after uncovering the nodes it covered.
    pub fn set_state(&self, arg: &mut Arg<D::State, A>, n: NodeId, state: D::State) -> Result<()> {
        arg.clear_covered_nodes(n);
        let bottom = self.domain.is_bottom(&state);
        let target = !bottom && self.domain.may_be_target(&state)?;
        arg.set_state(n, state, bottom, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::{Expr, Var};
    use crate::pred::{PredDomain, PredPrec, PredState};
    use crate::solver::BuiltinSolver;
    use crate::sts::{Sts, StsAction, StsLts};
    use std::rc::Rc;

    fn builder(sts: &Sts) -> ArgBuilder<StsLts, PredDomain, StsAction> {
        let solver = Rc::new(BuiltinSolver::new());
        ArgBuilder::new(sts.lts(), PredDomain::new(solver, sts.init_formula(), sts.target()))
    }

    #[test]
    fn test_init_expand_set_state() {
        let x = Var::int("x");
        let sts = Sts::builder()
            .var(x.clone())
            .init(Expr::eq(x.expr(), Expr::int(0)))
            .trans(Expr::eq(x.prime(), Expr::add([x.expr(), Expr::int(1)])))
            .prop(Expr::lt(x.expr(), Expr::int(2)))
            .build()
            .unwrap();
        let builder = builder(&sts);
        let prec = PredPrec::empty();
        let mut arg = builder.create_arg();
        let roots = builder.init(&mut arg, &prec).unwrap();
        assert_eq!(roots.len(), 1);
        assert!(arg.is_target(roots[0]));

        let succs = builder.expand(&mut arg, roots[0], &prec).unwrap();
        assert_eq!(succs.len(), 1);
        assert!(arg.is_expanded(roots[0]));
        assert_eq!(arg.node(succs[0]).depth(), 1);

        arg.cover(succs[0], roots[0]);
        let label = Expr::lt(x.expr(), Expr::int(2));
        builder.set_state(&mut arg, roots[0], PredState::of([label])).unwrap();
        assert!(!arg.is_covered(succs[0]));
        assert!(!arg.is_target(roots[0]));

        builder.set_state(&mut arg, succs[0], PredState::bottom()).unwrap();
        assert!(arg.node(succs[0]).is_bottom());
        assert!(!arg.is_target(succs[0]));
        assert!(arg.is_complete());
    }

    #[test]
    #[should_panic(expected = "cannot be expanded")]
    fn test_expand_excluded() {
        let x = Var::int("x");
        let sts = Sts::builder().var(x.clone()).build().unwrap();
        let builder = builder(&sts);
        let prec = PredPrec::empty();
        let mut arg = builder.create_arg();
        let roots = builder.init(&mut arg, &prec).unwrap();
        let succs = builder.expand(&mut arg, roots[0], &prec).unwrap();
        arg.cover(succs[0], roots[0]);
        let _ = builder.expand(&mut arg, succs[0], &prec);
    }
}
