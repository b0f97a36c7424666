//! The classical CEGAR loop: abstract under a fixed precision, and refine the precision
//! whenever the abstract counterexample turns out to be spurious.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::cancel::CancelToken;
use crate::composite::CompositePrec;
use crate::domain::{ExprAction, ExprState, Prec};
use crate::error::Error;
use crate::expl::ExplPrec;
use crate::expr::Expr;
use crate::loc::LocPrec;
use crate::null::NullPrec;
use crate::pred::PredPrec;
use crate::refiner::{ExprRefiner, TraceStatus};
use crate::safety::{CheckFailure, CheckResult, SafetyChecker, SafetyStatus};

/// Precisions that can absorb the bad sets of a spurious trace.
pub trait RefinablePrec: Prec {
    fn refine_with(&self, bad: &[Expr]) -> Self;
}

impl RefinablePrec for ExplPrec {
    fn refine_with(&self, bad: &[Expr]) -> Self {
        let vars: BTreeSet<_> = bad.iter().flat_map(Expr::vars).collect();
        self.join(&ExplPrec::new(vars))
    }
}

impl RefinablePrec for PredPrec {
    fn refine_with(&self, bad: &[Expr]) -> Self {
        self.join(&PredPrec::new(bad.iter().flat_map(Expr::atoms)))
    }
}

impl RefinablePrec for NullPrec {
    fn refine_with(&self, _bad: &[Expr]) -> Self {
        NullPrec
    }
}

impl<P: RefinablePrec> RefinablePrec for LocPrec<P> {
    fn refine_with(&self, bad: &[Expr]) -> Self {
        self.map(|p| p.refine_with(bad))
    }
}

impl<P1: Prec, P2: RefinablePrec> RefinablePrec for CompositePrec<P1, P2> {
    fn refine_with(&self, bad: &[Expr]) -> Self {
        CompositePrec(self.0.clone(), self.1.refine_with(bad))
    }
}

pub struct CegarChecker<C, S> {
    abstractor: C,
    refiner: ExprRefiner<S>,
    cancel: CancelToken,
}

impl<C, S> CegarChecker<C, S> {
    pub fn new(abstractor: C, refiner: ExprRefiner<S>) -> Self {
        Self {
            abstractor,
            refiner,
            cancel: CancelToken::new(),
        }
    }

    /// Polled between iterations; pass the same token to the abstractor to stop inside
    /// one.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<C, S, A, P> SafetyChecker<S, A, P> for CegarChecker<C, S>
where
    C: SafetyChecker<S, A, P>,
    S: ExprState,
    A: ExprAction,
    P: RefinablePrec,
{
    fn check(&self, prec: &P) -> CheckResult<S, A> {
        let mut prec = prec.clone();
        let mut iteration = 0;
        loop {
            iteration += 1;
            if self.cancel.is_cancelled() {
                return Ok(SafetyStatus::Aborted);
            }
            info!("cegar iteration {}", iteration);
            let (trace, arg) = match self.abstractor.check(&prec)? {
                SafetyStatus::Unsafe { trace, arg } => (trace, arg),
                status => return Ok(status),
            };
            let bad = match self.refiner.check_trace(&trace) {
                Ok(TraceStatus::Feasible(_)) => {
                    info!("counterexample of length {} is feasible", trace.len());
                    return Ok(SafetyStatus::Unsafe { trace, arg });
                }
                Ok(TraceStatus::Infeasible(bad)) => bad,
                Err(Error::Cancelled) => return Ok(SafetyStatus::Aborted),
                Err(error) => return Err(CheckFailure { error, arg }),
            };
            let refined = prec.refine_with(&bad);
            if refined == prec {
                let error = Error::Refinement(format!(
                    "spurious counterexample of length {} does not refine the precision {:?}",
                    trace.len(),
                    prec
                ));
                return Err(CheckFailure { error, arg });
            }
            debug!("precision refined to {:?}", refined);
            prec = refined;
        }
    }
}
