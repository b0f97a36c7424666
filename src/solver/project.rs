use std::collections::BTreeSet;

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

use super::formula::{to_formula, Atom, Formula, LinExpr, Symbols};
use super::linear::System;
use crate::error::{Error, Result};
use crate::expr::Expr;

/// Existential projection: eliminates every variable reference for which `keep` returns
/// false.
///
/// The result is a disjunction of cubes over the kept references, equivalent over the
/// integers to `exists dropped. expr` whenever every eliminated equality had a unit
/// coefficient, and an over-approximation otherwise.
pub fn project(expr: &Expr, keep: impl Fn(&Expr) -> bool) -> Result<Expr> {
    let mut syms = Symbols::default();
    let formula = to_formula(expr, true, &mut syms)?;
    let mut branches = Vec::new();
    collect_branches(vec![&formula], Vec::new(), Vec::new(), &mut branches);

    let eliminated: Vec<bool> = (0..syms.len()).map(|id| !keep(syms.leaf(id))).collect();
    let select = |id: usize| eliminated[id];
    let mut cubes = BTreeSet::new();
    for atoms in branches {
        let mut literals = Vec::new();
        let mut system = System::new();
        for atom in atoms {
            match atom {
                Atom::Bool(id, polarity) => {
                    if !select(*id) {
                        let leaf = syms.leaf(*id).clone();
                        literals.push(if *polarity { leaf } else { Expr::not(leaf) });
                    }
                }
                Atom::Le(lin) => system.add_le(lin.clone()),
                Atom::Eq(lin) => system.add_eq(lin.clone()),
            }
        }
        let Some((eqs, les)) = system.project(&select) else {
            continue;
        };
        for eq in &eqs {
            literals.push(render(eq, true, &syms)?);
        }
        for le in &les {
            literals.push(render(le, false, &syms)?);
        }
        let cube = Expr::and(literals);
        if cube.is_true() {
            return Ok(cube);
        }
        cubes.insert(cube);
    }
    Ok(Expr::or(cubes))
}

/// Enumerates the branches of the disjunctive normal form, dropping those with
/// contradictory boolean literals.
fn collect_branches<'f>(
    mut todo: Vec<&'f Formula>,
    mut atoms: Vec<&'f Atom>,
    mut ors: Vec<&'f [Formula]>,
    out: &mut Vec<Vec<&'f Atom>>,
) {
    while let Some(formula) = todo.pop() {
        match formula {
            Formula::True => {}
            Formula::False => return,
            Formula::Atom(atom @ Atom::Bool(id, polarity)) => {
                if atoms.iter().any(|a| matches!(a, Atom::Bool(s, p) if s == id && p != polarity)) {
                    return;
                }
                atoms.push(atom);
            }
            Formula::Atom(atom) => atoms.push(atom),
            Formula::And(parts) => todo.extend(parts.iter()),
            Formula::Or(parts) => ors.push(parts),
        }
    }
    match ors.pop() {
        None => out.push(atoms),
        Some(parts) => {
            for part in parts {
                collect_branches(vec![part], atoms.clone(), ors.clone(), out);
            }
        }
    }
}

/// Renders `lin = 0` (or `lin <= 0`) with positive coefficients on both sides.
fn render(lin: &LinExpr, equality: bool, syms: &Symbols) -> Result<Expr> {
    let to_i64 = |n: &BigInt| {
        n.to_i64()
            .ok_or_else(|| Error::Unknown(format!("coefficient {n} does not fit in 64 bits")))
    };
    let mut lhs = Vec::new();
    let mut rhs = Vec::new();
    for (id, coeff) in &lin.terms {
        let leaf = syms.leaf(*id).clone();
        let magnitude = coeff.abs();
        let term = if magnitude.is_one() {
            leaf
        } else {
            Expr::mul([Expr::int(to_i64(&magnitude)?), leaf])
        };
        if coeff.is_positive() {
            lhs.push(term);
        } else {
            rhs.push(term);
        }
    }
    // lhs - rhs + c ~ 0
    let c = to_i64(&lin.constant)?;
    let relation = |a: Expr, b: Expr| if equality { Expr::eq(a, b) } else { Expr::leq(a, b) };
    let flipped = |a: Expr, b: Expr| if equality { Expr::eq(a, b) } else { Expr::geq(a, b) };
    let expr = if rhs.is_empty() {
        relation(Expr::add(lhs), Expr::int(-c))
    } else if lhs.is_empty() {
        flipped(Expr::add(rhs), Expr::int(c))
    } else {
        let rhs = Expr::add(rhs);
        let rhs = if lin.constant.is_zero() {
            rhs
        } else if c < 0 {
            Expr::add([rhs, Expr::int(-c)])
        } else {
            Expr::sub(rhs, Expr::int(c))
        };
        relation(Expr::add(lhs), rhs)
    };
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::expr::Var;
    use crate::solver::{is_sat, BuiltinSolver};

    fn keep_index(index: usize) -> impl Fn(&Expr) -> bool {
        move |leaf| matches!(leaf, Expr::Indexed(_, k) if *k == index)
    }

    #[test]
    fn test_preimage_of_increment() {
        let x = Var::int("x");
        // exists x@1. x@1 = x@0 + 1 && x@1 = 3  ~>  x@0 = 2
        let e = Expr::and([
            Expr::eq(x.at(1), Expr::add([x.at(0), Expr::int(1)])),
            Expr::eq(x.at(1), Expr::int(3)),
        ]);
        let projected = project(&e, keep_index(0)).unwrap();
        assert_eq!(projected, Expr::eq(x.at(0), Expr::int(2)));
    }

    #[test]
    fn test_projection_of_disjunction() {
        let x = Var::int("x");
        let y = Var::int("y");
        let step = Expr::or([
            Expr::and([
                Expr::eq(x.at(1), Expr::add([x.at(0), Expr::int(1)])),
                Expr::eq(y.at(1), y.at(0)),
            ]),
            Expr::and([
                Expr::eq(x.at(1), x.at(0)),
                Expr::eq(y.at(1), Expr::add([y.at(0), Expr::int(1)])),
            ]),
        ]);
        let target = Expr::and([Expr::eq(x.at(1), Expr::int(2)), Expr::eq(y.at(1), Expr::int(2))]);
        let pre = project(&Expr::and([step, target]), keep_index(0)).unwrap();
        assert!(pre.vars().iter().all(|v| v == &x || v == &y));

        let solver = BuiltinSolver::new();
        let at = |a: i64, b: i64| Expr::and([pre.clone(), Expr::eq(x.at(0), Expr::int(a)), Expr::eq(y.at(0), Expr::int(b))]);
        assert!(is_sat(&solver, [at(1, 2)]).unwrap());
        assert!(is_sat(&solver, [at(2, 1)]).unwrap());
        assert!(!is_sat(&solver, [at(1, 1)]).unwrap());
        assert!(!is_sat(&solver, [at(2, 2)]).unwrap());
    }

    #[test]
    fn test_infeasible_projects_to_false() {
        let x = Var::int("x");
        let e = Expr::and([Expr::lt(x.at(1), Expr::int(0)), Expr::gt(x.at(1), Expr::int(0))]);
        assert_eq!(project(&e, keep_index(0)).unwrap(), Expr::bool(false));
    }

    #[test]
    fn test_render_moves_negative_terms() {
        let x = Var::int("x");
        let y = Var::int("y");
        // exists z. x + 1 <= z && z <= y  ~>  x <= y - 1
        let z = Var::int("z");
        let e = Expr::and([Expr::leq(Expr::add([x.at(0), Expr::int(1)]), z.at(1)), Expr::leq(z.at(1), y.at(0))]);
        let projected = project(&e, keep_index(0)).unwrap();
        assert_eq!(projected.to_string(), "x@0 <= y@0 - 1");
    }
}
