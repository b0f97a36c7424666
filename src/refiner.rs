//! Trace refinement.
//!
//! A refiner decides whether an abstract counterexample is feasible. If it is not, it
//! strengthens the states along the trace so that the last one is no longer a target,
//! without losing any concrete state reachable along the trace. The last state only
//! becomes bottom when no state reachable along the trace is left in it.
//!
//! [`ExprRefiner`] first works backwards from the target. With `B_n` the target
//! condition of the last state and `B_i` the states from which action `i` leads into
//! `B_(i+1)`, the trace is infeasible exactly when no initial state lies in `B_0`.
//!
//! The labels are then built forwards, as a sequence of interpolants: `F_0` is the
//! initial condition and `F_(i+1)` the image of `I_i` under action `i`. Each label `I_i`
//! contains `F_i` and excludes `B_i`. It is a cube of literals implied by `F_i`, weakened
//! greedily while it still excludes `B_i`. Literals that keep holding further along the
//! trace are dropped last.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::{debug, trace};

use crate::domain::{ExprAction, ExprState, ExprStrengthen};
use crate::error::{Error, Result};
use crate::expr::{Expr, Var};
use crate::indexing::VarIndexing;
use crate::solver::{check_model, is_sat, project, Solver};
use crate::trace::Trace;
use crate::valuation::{Value, Valuation};

#[derive(Debug, Clone)]
pub enum RefinementResult<S, A> {
    /// The trace is infeasible; the returned trace has the same actions and stronger
    /// states, the last of which is no longer a target.
    ///
    /// The last state is not necessarily bottom: it keeps every state outside the target
    /// condition, so a checker may still expand it. It is bottom only when the trace
    /// reaches none of its states.
    Successful(Trace<S, A>),
    /// The trace is feasible; `witness` holds one concrete valuation per state.
    Unsuccessful { trace: Trace<S, A>, witness: Vec<Valuation> },
}

impl<S, A> RefinementResult<S, A> {
    pub fn is_successful(&self) -> bool {
        matches!(self, RefinementResult::Successful(_))
    }
}

pub trait Refiner<S, A> {
    fn refine(&self, trace: &Trace<S, A>) -> Result<RefinementResult<S, A>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceStatus {
    /// Concrete valuations along the trace, one per state.
    Feasible(Vec<Valuation>),
    /// The backward bad sets `B_0, ..., B_n` over current-state variables.
    Infeasible(Vec<Expr>),
}

pub struct ExprRefiner<S> {
    solver: Rc<dyn Solver>,
    init: Expr,
    target_of: Box<dyn Fn(&S) -> Expr>,
}

impl<S: ExprState> ExprRefiner<S> {
    /// A refiner for a model with initial condition `init`; `target_of` gives the
    /// condition under which a state is a target (`true` for states that are targets by
    /// their control location alone).
    pub fn new(solver: Rc<dyn Solver>, init: Expr, target_of: impl Fn(&S) -> Expr + 'static) -> Self {
        Self {
            solver,
            init,
            target_of: Box::new(target_of),
        }
    }

    pub fn check_trace<A: ExprAction>(&self, trace: &Trace<S, A>) -> Result<TraceStatus> {
        let n = trace.len();
        let target = (self.target_of)(trace.last());

        let mut indexings = vec![VarIndexing::new()];
        let mut parts = vec![indexings[0].unfold(&self.init)];
        for i in 0..n {
            parts.push(indexings[i].unfold(&trace.state(i).to_expr()));
            if i + 1 < n {
                let (formula, next) = trace.action(i).unfold(&indexings[i]);
                parts.push(formula);
                indexings.push(next);
            }
        }
        parts.push(indexings[n - 1].unfold(&target));

        if let Some(model) = check_model(&*self.solver, parts.iter().cloned())? {
            let vars: BTreeSet<Var> = parts.iter().flat_map(|p| p.vars()).collect();
            let witness = indexings
                .iter()
                .map(|indexing| {
                    vars.iter()
                        .map(|v| {
                            let value = model
                                .eval_complete(&v.at(indexing.get(v)))
                                .unwrap_or_else(|| Value::default_of(v.sort()));
                            (v.clone(), value)
                        })
                        .collect()
                })
                .collect();
            debug!("trace of length {} is feasible", n);
            return Ok(TraceStatus::Feasible(witness));
        }

        let zero = VarIndexing::new();
        let mut bad = vec![target];
        for i in (0..n - 1).rev() {
            let (formula, next) = trace.action(i).unfold(&zero);
            let post = next.unfold(&bad[bad.len() - 1]);
            let pre = project(&Expr::and([formula, post]), |leaf| matches!(leaf, Expr::Indexed(_, 0)))?;
            let pre = zero.foldin(&pre);
            trace!("B_{} = {}", i, pre);
            bad.push(pre);
        }
        bad.reverse();

        if is_sat(&*self.solver, [self.init.clone(), bad[0].clone()])? {
            return Err(Error::Refinement(format!(
                "trace of length {n} is infeasible, but its initial bad set `{}` meets the initial states",
                bad[0]
            )));
        }
        debug!("trace of length {} is infeasible", n);
        Ok(TraceStatus::Infeasible(bad))
    }

    /// Labels `I_0, ..., I_n` for an infeasible trace with bad sets `bad`.
    ///
    /// `I_0` contains the initial states, every successor of `I_i` and state `i` under
    /// action `i` lies in `I_(i+1)`, and no `I_i` meets `B_i` within state `i`. A label is
    /// `true` where the state already excludes its bad set.
    pub fn labels<A: ExprAction>(&self, trace: &Trace<S, A>, bad: &[Expr]) -> Result<Vec<Expr>> {
        let states: Vec<Expr> = trace.states().iter().map(ExprState::to_expr).collect();

        let mut exact = vec![Expr::and([self.init.clone(), states[0].clone()])];
        for i in 1..trace.len() {
            let post = image(trace.action(i - 1), &exact[i - 1])?;
            exact.push(Expr::and([post, states[i].clone()]));
        }

        let mut labels: Vec<Expr> = Vec::with_capacity(trace.len());
        for i in 0..trace.len() {
            let reach = match labels.last() {
                None => exact[0].clone(),
                Some(prev) => {
                    let post = image(trace.action(i - 1), &Expr::and([prev.clone(), states[i - 1].clone()]))?;
                    Expr::and([post, states[i].clone()])
                }
            };
            let label = if bad[i].is_false() || !is_sat(&*self.solver, [states[i].clone(), bad[i].clone()])? {
                Expr::bool(true)
            } else if !is_sat(&*self.solver, [reach.clone()])? {
                Expr::bool(false)
            } else if is_sat(&*self.solver, [reach.clone(), bad[i].clone()])? {
                // The image was over-approximated.
                Expr::not(bad[i].clone())
            } else {
                self.generalize(&reach, &states[i], &bad[i], &exact[i..])?
                    .unwrap_or_else(|| Expr::not(bad[i].clone()))
            };
            trace!("I_{} = {}", i, label);
            labels.push(label);
        }
        Ok(labels)
    }

    /// A weakening of `reach` that still excludes `bad` within `state`, as a cube of
    /// literals over the atoms of both, or as a disjunction of such cubes when `reach`
    /// needs one.
    fn generalize(&self, reach: &Expr, state: &Expr, bad: &Expr, later: &[Expr]) -> Result<Option<Expr>> {
        let bad_atoms = bad.atoms();
        let mut seen = BTreeSet::new();
        let mut implied = Vec::new();
        for atom in bad_atoms.iter().chain(&reach.atoms()) {
            if !seen.insert(atom.clone()) {
                continue;
            }
            let from_bad = bad_atoms.contains(atom);
            if !is_sat(&*self.solver, [reach.clone(), Expr::not(atom.clone())])? {
                implied.push((atom.clone(), from_bad));
            } else if !is_sat(&*self.solver, [reach.clone(), atom.clone()])? {
                implied.push((Expr::not(atom.clone()), from_bad));
            }
        }
        if let Some(cube) = self.weaken(implied, state, bad, later)? {
            return Ok(Some(cube));
        }

        let cubes = match project(reach, |_| true)? {
            Expr::Or(cubes) => cubes,
            cube => vec![cube],
        };
        let mut weakened = Vec::with_capacity(cubes.len());
        for cube in cubes {
            let literals = match cube {
                Expr::And(literals) => literals,
                literal => vec![literal],
            };
            let literals = literals.into_iter().map(|l| (l, false)).collect();
            match self.weaken(literals, state, bad, later)? {
                Some(cube) => weakened.push(cube),
                None => return Ok(None),
            }
        }
        Ok(Some(Expr::or(weakened)))
    }

    /// Drops literals from the cube while it excludes `bad` within `state`; `None` if it
    /// never did.
    ///
    /// Literals are dropped in order of how many of the `later` reach sets imply them.
    /// Among equally ranked ones, the cube is weakened twice, once dropping literals of
    /// the bad set first and once dropping the others first. The second result wins
    /// only when it is weaker than the first.
    fn weaken(&self, literals: Vec<(Expr, bool)>, state: &Expr, bad: &Expr, later: &[Expr]) -> Result<Option<Expr>> {
        let context = [state.clone(), bad.clone()];
        if is_sat(&*self.solver, literals.iter().map(|(l, _)| l.clone()).chain(context.clone()))? {
            return Ok(None);
        }
        let mut ranked = Vec::with_capacity(literals.len());
        for (literal, from_bad) in literals {
            let mut holds = 0usize;
            for reach in later {
                if !is_sat(&*self.solver, [reach.clone(), Expr::not(literal.clone())])? {
                    holds += 1;
                }
            }
            ranked.push((holds, from_bad, literal));
        }

        ranked.sort_by_key(|(holds, _, _)| *holds);
        let first = self.drop_literals(ranked.iter().map(|(_, _, l)| l.clone()).collect(), &context)?;
        if ranked.iter().all(|(_, from_bad, _)| !from_bad) {
            return Ok(Some(first));
        }
        ranked.sort_by_key(|(holds, from_bad, _)| (*holds, *from_bad));
        let second = self.drop_literals(ranked.into_iter().map(|(_, _, l)| l).collect(), &context)?;
        if first != second && !is_sat(&*self.solver, [state.clone(), first.clone(), Expr::not(second.clone())])? {
            return Ok(Some(second));
        }
        Ok(Some(first))
    }

    /// Greedily removes literals, front first, while their conjunction with `context`
    /// stays unsatisfiable.
    fn drop_literals(&self, mut kept: Vec<Expr>, context: &[Expr]) -> Result<Expr> {
        let mut i = 0;
        while i < kept.len() {
            let rest = kept.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, l)| l.clone());
            if is_sat(&*self.solver, rest.chain(context.iter().cloned()))? {
                i += 1;
            } else {
                kept.remove(i);
            }
        }
        Ok(Expr::and(kept))
    }
}

/// The states reachable from `from` by `action`, over current-state variables.
fn image<A: ExprAction>(action: &A, from: &Expr) -> Result<Expr> {
    let zero = VarIndexing::new();
    let (formula, next) = action.unfold(&zero);
    let post = project(&Expr::and([zero.unfold(from), formula]), |leaf| {
        matches!(leaf, Expr::Indexed(v, k) if *k == next.get(v))
    })?;
    Ok(next.foldin(&post))
}


impl<S, A> Refiner<S, A> for ExprRefiner<S>
where
    S: ExprStrengthen + Clone,
    A: ExprAction + Clone,
{
    fn refine(&self, trace: &Trace<S, A>) -> Result<RefinementResult<S, A>> {
        let bad = match self.check_trace(trace)? {
            TraceStatus::Feasible(witness) => {
                return Ok(RefinementResult::Unsuccessful {
                    trace: trace.clone(),
                    witness,
                })
            }
            TraceStatus::Infeasible(bad) => bad,
        };
        let labels = self.labels(trace, &bad)?;
        let mut states = Vec::with_capacity(trace.len());
        for (state, label) in trace.states().iter().zip(&labels) {
            let refined = if label.is_true() {
                state.clone()
            } else if label.is_false() || !is_sat(&*self.solver, [state.to_expr(), label.clone()])? {
                state.bottom()
            } else {
                state.strengthen(label)
            };
            states.push(refined);
        }
        Ok(RefinementResult::Successful(Trace::new(states, trace.actions().to_vec())))
    }
}
