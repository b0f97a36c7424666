//! Conjunctions of linear integer constraints.
//!
//! Equalities with a unit coefficient are solved and substituted; everything else goes
//! through Fourier–Motzkin elimination. Each derived inequality is divided by the gcd of
//! its coefficients and its constant rounded, which is exact over the integers and cuts
//! off many rational-only solutions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use super::formula::LinExpr;

#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Sat(T),
    Unsat,
    Unknown(String),
}

enum Norm {
    True,
    False,
    Keep(LinExpr),
}

#[derive(Debug)]
enum Step {
    /// The symbol was replaced by the expression.
    Subst(usize, LinExpr),
    /// The symbol was eliminated; these are the constraints that bounded it.
    Bounds(usize, Vec<LinExpr>),
}

/// A conjunction of `lin = 0` and `lin <= 0` constraints.
#[derive(Debug, Default)]
pub(crate) struct System {
    eqs: Vec<LinExpr>,
    ineqs: BTreeSet<LinExpr>,
    steps: Vec<Step>,
    infeasible: bool,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_eq(&mut self, lin: LinExpr) {
        match normalize_eq(lin) {
            Norm::True => {}
            Norm::False => self.infeasible = true,
            Norm::Keep(lin) => self.eqs.push(lin),
        }
    }

    pub fn add_le(&mut self, lin: LinExpr) {
        match normalize_le(lin) {
            Norm::True => {}
            Norm::False => self.infeasible = true,
            Norm::Keep(lin) => {
                self.ineqs.insert(lin);
            }
        }
    }

    /// Decides the system and builds an integer model on success.
    pub fn solve(mut self) -> Outcome<HashMap<usize, BigInt>> {
        let all = |_: usize| true;
        self.eliminate_eqs(&all);
        self.eliminate_les(&all);
        if self.infeasible {
            return Outcome::Unsat;
        }
        debug_assert!(self.eqs.is_empty() && self.ineqs.is_empty());

        let mut values: HashMap<usize, BigInt> = HashMap::new();
        for step in self.steps.iter().rev() {
            match step {
                Step::Subst(id, def) => {
                    let value = def.eval(&mut values);
                    values.insert(*id, value);
                }
                Step::Bounds(id, constraints) => {
                    let mut lower: Option<BigInt> = None;
                    let mut upper: Option<BigInt> = None;
                    for constraint in constraints {
                        let coeff = &constraint.terms[id];
                        let mut rest = constraint.clone();
                        rest.terms.remove(id);
                        let r = rest.eval(&mut values);
                        if coeff.is_positive() {
                            // coeff * x + r <= 0  ~>  x <= floor(-r / coeff)
                            let bound = (-r).div_floor(coeff);
                            upper = Some(upper.map_or(bound.clone(), |u| u.min(bound)));
                        } else {
                            // x >= ceil(r / -coeff)
                            let bound = div_ceil(&r, &-coeff);
                            lower = Some(lower.map_or(bound.clone(), |l| l.max(bound)));
                        }
                    }
                    let value = match (lower, upper) {
                        (Some(l), Some(u)) if l > u => {
                            return Outcome::Unknown("no integer point in the rational solution space".into());
                        }
                        (lower, upper) => {
                            let mut value = BigInt::zero();
                            if let Some(l) = lower {
                                value = value.max(l);
                            }
                            if let Some(u) = upper {
                                value = value.min(u);
                            }
                            value
                        }
                    };
                    values.insert(*id, value);
                }
            }
        }
        Outcome::Sat(values)
    }

    /// Eliminates the symbols accepted by `select` and returns the remaining equalities
    /// and inequalities, or `None` if the system is infeasible.
    pub fn project(mut self, select: &dyn Fn(usize) -> bool) -> Option<(Vec<LinExpr>, Vec<LinExpr>)> {
        self.eliminate_eqs(select);
        self.eliminate_les(select);
        if self.infeasible {
            None
        } else {
            Some((self.eqs, self.ineqs.into_iter().collect()))
        }
    }

    fn eliminate_eqs(&mut self, select: &dyn Fn(usize) -> bool) {
        let mut pending = std::mem::take(&mut self.eqs);
        let mut kept = Vec::new();
        while let Some(eq) = pending.pop() {
            if self.infeasible {
                return;
            }
            let eq = match normalize_eq(eq) {
                Norm::True => continue,
                Norm::False => {
                    self.infeasible = true;
                    return;
                }
                Norm::Keep(eq) => eq,
            };
            match eq.unit_symbol(select) {
                Some((id, coeff)) => {
                    // coeff * x + rest = 0 with coeff = ±1  ~>  x = -coeff * rest
                    let mut rest = eq;
                    rest.terms.remove(&id);
                    let def = rest.scale(&-coeff);
                    pending = pending.into_iter().map(|e| e.substitute(id, &def)).collect();
                    pending.extend(kept.drain(..).map(|e: LinExpr| e.substitute(id, &def)));
                    for ineq in std::mem::take(&mut self.ineqs) {
                        self.add_le(ineq.substitute(id, &def));
                    }
                    self.steps.push(Step::Subst(id, def));
                }
                None if eq.terms.keys().any(|id| select(*id)) => {
                    self.add_le(eq.neg());
                    self.add_le(eq);
                }
                None => kept.push(eq),
            }
        }
        self.eqs = kept;
    }

    fn eliminate_les(&mut self, select: &dyn Fn(usize) -> bool) {
        while !self.infeasible {
            // Pick the symbol producing the fewest combinations.
            let mut counts: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
            for ineq in &self.ineqs {
                for (id, coeff) in &ineq.terms {
                    if select(*id) {
                        let entry = counts.entry(*id).or_default();
                        if coeff.is_positive() {
                            entry.1 += 1;
                        } else {
                            entry.0 += 1;
                        }
                    }
                }
            }
            let Some(id) = counts.iter().min_by_key(|(_, (lo, up))| lo * up).map(|(id, _)| *id) else {
                break;
            };

            let (with, without): (Vec<LinExpr>, Vec<LinExpr>) =
                std::mem::take(&mut self.ineqs).into_iter().partition(|ineq| ineq.terms.contains_key(&id));
            self.ineqs = without.into_iter().collect();
            let (lowers, uppers): (Vec<&LinExpr>, Vec<&LinExpr>) =
                with.iter().partition(|ineq| ineq.terms[&id].is_negative());
            for lower in &lowers {
                for upper in &uppers {
                    let a = &lower.terms[&id];
                    let b = &upper.terms[&id];
                    self.add_le(lower.scale(b).add(&upper.scale(&-a)));
                }
            }
            self.steps.push(Step::Bounds(id, with));
        }
    }
}

fn div_ceil(n: &BigInt, d: &BigInt) -> BigInt {
    -((-n).div_floor(d))
}

fn gcd_of(lin: &LinExpr) -> BigInt {
    lin.terms.values().fold(BigInt::zero(), |g, c| g.gcd(c))
}

fn normalize_le(mut lin: LinExpr) -> Norm {
    lin.terms.retain(|_, c| !c.is_zero());
    if lin.terms.is_empty() {
        return if lin.constant.is_positive() { Norm::False } else { Norm::True };
    }
    let g = gcd_of(&lin);
    if !g.is_one() {
        for c in lin.terms.values_mut() {
            *c = &*c / &g;
        }
        lin.constant = div_ceil(&lin.constant, &g);
    }
    Norm::Keep(lin)
}

fn normalize_eq(mut lin: LinExpr) -> Norm {
    lin.terms.retain(|_, c| !c.is_zero());
    if lin.terms.is_empty() {
        return if lin.constant.is_zero() { Norm::True } else { Norm::False };
    }
    let g = gcd_of(&lin);
    if !lin.constant.is_multiple_of(&g) {
        return Norm::False;
    }
    if !g.is_one() {
        for c in lin.terms.values_mut() {
            *c = &*c / &g;
        }
        lin.constant = &lin.constant / &g;
    }
    Norm::Keep(lin)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn lin(terms: &[(usize, i64)], constant: i64) -> LinExpr {
        LinExpr {
            terms: terms.iter().map(|(id, c)| (*id, BigInt::from(*c))).collect(),
            constant: BigInt::from(constant),
        }
    }

    fn check(eqs: &[LinExpr], les: &[LinExpr], values: &HashMap<usize, BigInt>) -> bool {
        let mut values = values.clone();
        eqs.iter().all(|e| e.eval(&mut values).is_zero()) && les.iter().all(|l| !l.eval(&mut values).is_positive())
    }

    #[test]
    fn test_solve_with_substitution() {
        // x = y + 1, y >= 3, x <= 10
        let eqs = vec![lin(&[(0, 1), (1, -1)], -1)];
        let les = vec![lin(&[(1, -1)], 3), lin(&[(0, 1)], -10)];
        let mut system = System::new();
        eqs.iter().cloned().for_each(|e| system.add_eq(e));
        les.iter().cloned().for_each(|l| system.add_le(l));
        match system.solve() {
            Outcome::Sat(values) => assert!(check(&eqs, &les, &values)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unsat_by_bounds() {
        // x <= 1, x >= 2
        let mut system = System::new();
        system.add_le(lin(&[(0, 1)], -1));
        system.add_le(lin(&[(0, -1)], 2));
        assert!(matches!(system.solve(), Outcome::Unsat));
    }

    #[test]
    fn test_unsat_by_parity() {
        // 2x = 2y + 1
        let mut system = System::new();
        system.add_eq(lin(&[(0, 2), (1, -2)], -1));
        assert!(matches!(system.solve(), Outcome::Unsat));
    }

    #[test]
    fn test_tightening_refutes_integer_gap() {
        // 1 <= 3x <= 2 has rational but no integer solutions
        let mut system = System::new();
        system.add_le(lin(&[(0, -3)], 1));
        system.add_le(lin(&[(0, 3)], -2));
        assert!(matches!(system.solve(), Outcome::Unsat));
    }

    #[test]
    fn test_project_keeps_other_symbols() {
        // exists y. x = y + 1 && y >= 0  ~>  x >= 1
        let mut system = System::new();
        system.add_eq(lin(&[(0, 1), (1, -1)], -1));
        system.add_le(lin(&[(1, -1)], 0));
        let (eqs, les) = system.project(&|id| id == 1).unwrap();
        assert!(eqs.is_empty());
        assert_eq!(les, vec![lin(&[(0, -1)], 1)]);
    }
}
