//! Translation of expressions into negation normal form over linear atoms.

use std::collections::{BTreeMap, HashMap};

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::error::{Error, Result};
use crate::expr::{Expr, Sort};

/// Interning table between variable references and dense symbol ids.
#[derive(Debug, Default)]
pub(crate) struct Symbols {
    leaves: Vec<Expr>,
    ids: HashMap<Expr, usize>,
}

impl Symbols {
    pub fn intern(&mut self, leaf: &Expr) -> usize {
        if let Some(&id) = self.ids.get(leaf) {
            return id;
        }
        let id = self.leaves.len();
        self.leaves.push(leaf.clone());
        self.ids.insert(leaf.clone(), id);
        id
    }

    pub fn leaf(&self, id: usize) -> &Expr {
        &self.leaves[id]
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }
}

/// `sum(coeff * sym) + constant`, with no zero coefficients.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct LinExpr {
    pub terms: BTreeMap<usize, BigInt>,
    pub constant: BigInt,
}

impl LinExpr {
    pub fn constant(value: BigInt) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn symbol(id: usize) -> Self {
        Self {
            terms: BTreeMap::from([(id, BigInt::one())]),
            constant: BigInt::zero(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn add(&self, other: &LinExpr) -> LinExpr {
        let mut result = self.clone();
        for (id, coeff) in &other.terms {
            let entry = result.terms.entry(*id).or_insert_with(BigInt::zero);
            *entry += coeff;
            if entry.is_zero() {
                result.terms.remove(id);
            }
        }
        result.constant += &other.constant;
        result
    }

    pub fn scale(&self, factor: &BigInt) -> LinExpr {
        if factor.is_zero() {
            return LinExpr::default();
        }
        LinExpr {
            terms: self.terms.iter().map(|(id, c)| (*id, c * factor)).collect(),
            constant: &self.constant * factor,
        }
    }

    pub fn neg(&self) -> LinExpr {
        self.scale(&-BigInt::one())
    }

    pub fn sub(&self, other: &LinExpr) -> LinExpr {
        self.add(&other.neg())
    }

    pub fn plus_constant(&self, value: i64) -> LinExpr {
        let mut result = self.clone();
        result.constant += value;
        result
    }

    /// Replaces symbol `id` by `def`.
    pub fn substitute(&self, id: usize, def: &LinExpr) -> LinExpr {
        match self.terms.get(&id) {
            None => self.clone(),
            Some(coeff) => {
                let mut rest = self.clone();
                rest.terms.remove(&id);
                rest.add(&def.scale(coeff))
            }
        }
    }

    /// Evaluates under `values`; missing symbols are set to zero and recorded.
    pub fn eval(&self, values: &mut HashMap<usize, BigInt>) -> BigInt {
        let mut sum = self.constant.clone();
        for (id, coeff) in &self.terms {
            let value = values.entry(*id).or_insert_with(BigInt::zero);
            sum += coeff * &*value;
        }
        sum
    }

    /// The first symbol with coefficient `±1` among those accepted by `select`.
    pub fn unit_symbol(&self, select: &dyn Fn(usize) -> bool) -> Option<(usize, BigInt)> {
        self.terms
            .iter()
            .find(|(id, c)| select(**id) && c.abs().is_one())
            .map(|(id, c)| (*id, c.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Atom {
    /// A boolean symbol with its polarity.
    Bool(usize, bool),
    /// `lin <= 0`.
    Le(LinExpr),
    /// `lin = 0`.
    Eq(LinExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Formula {
    True,
    False,
    Atom(Atom),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

/// Converts `expr` (negated when `positive` is false) into negation normal form.
///
/// Integer disequalities become `a < b || a > b`, and strict comparisons are tightened
/// to non-strict ones over the integers.
pub(crate) fn to_formula(expr: &Expr, positive: bool, syms: &mut Symbols) -> Result<Formula> {
    let le = |lin: LinExpr| Formula::Atom(Atom::Le(lin));
    let formula = match expr {
        Expr::Bool(b) => {
            if *b == positive {
                Formula::True
            } else {
                Formula::False
            }
        }
        Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) if expr.sort() == Sort::Bool => {
            Formula::Atom(Atom::Bool(syms.intern(expr), positive))
        }
        Expr::Not(op) => to_formula(op, !positive, syms)?,
        Expr::And(ops) | Expr::Or(ops) => {
            let parts = ops.iter().map(|op| to_formula(op, positive, syms)).collect::<Result<Vec<_>>>()?;
            if matches!(expr, Expr::And(_)) == positive {
                Formula::And(parts)
            } else {
                Formula::Or(parts)
            }
        }
        Expr::Imply(a, b) => {
            if positive {
                Formula::Or(vec![to_formula(a, false, syms)?, to_formula(b, true, syms)?])
            } else {
                Formula::And(vec![to_formula(a, true, syms)?, to_formula(b, false, syms)?])
            }
        }
        Expr::Eq(a, b) if a.sort() == Sort::Bool => {
            let (ap, an) = (to_formula(a, true, syms)?, to_formula(a, false, syms)?);
            let (bp, bn) = (to_formula(b, true, syms)?, to_formula(b, false, syms)?);
            if positive {
                Formula::Or(vec![Formula::And(vec![ap, bp]), Formula::And(vec![an, bn])])
            } else {
                Formula::Or(vec![Formula::And(vec![ap, bn]), Formula::And(vec![an, bp])])
            }
        }
        Expr::Eq(a, b) => {
            let diff = linearize(a, syms)?.sub(&linearize(b, syms)?);
            if positive {
                Formula::Atom(Atom::Eq(diff))
            } else {
                Formula::Or(vec![le(diff.plus_constant(1)), le(diff.neg().plus_constant(1))])
            }
        }
        Expr::Lt(a, b) | Expr::Leq(a, b) | Expr::Gt(a, b) | Expr::Geq(a, b) => {
            // Normalize to `lhs < rhs` or `lhs <= rhs`.
            let (lhs, rhs, strict) = match expr {
                Expr::Lt(..) => (a, b, true),
                Expr::Leq(..) => (a, b, false),
                Expr::Gt(..) => (b, a, true),
                _ => (b, a, false),
            };
            let diff = linearize(lhs, syms)?.sub(&linearize(rhs, syms)?);
            match (positive, strict) {
                (true, true) => le(diff.plus_constant(1)),
                (true, false) => le(diff),
                (false, true) => le(diff.neg()),
                (false, false) => le(diff.neg().plus_constant(1)),
            }
        }
        _ => return Err(Error::Unsupported(format!("expected a formula, found `{expr}`"))),
    };
    Ok(formula)
}

/// Converts an integer term into a linear expression.
pub(crate) fn linearize(expr: &Expr, syms: &mut Symbols) -> Result<LinExpr> {
    match expr {
        Expr::Int(n) => Ok(LinExpr::constant(BigInt::from(*n))),
        Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) if expr.sort() == Sort::Int => {
            Ok(LinExpr::symbol(syms.intern(expr)))
        }
        Expr::Add(ops) => {
            let mut sum = LinExpr::default();
            for op in ops {
                sum = sum.add(&linearize(op, syms)?);
            }
            Ok(sum)
        }
        Expr::Sub(a, b) => Ok(linearize(a, syms)?.sub(&linearize(b, syms)?)),
        Expr::Neg(op) => Ok(linearize(op, syms)?.neg()),
        Expr::Mul(ops) => {
            let mut product = LinExpr::constant(BigInt::one());
            for op in ops {
                let factor = linearize(op, syms)?;
                product = if product.is_constant() {
                    factor.scale(&product.constant)
                } else if factor.is_constant() {
                    product.scale(&factor.constant)
                } else {
                    return Err(Error::Unsupported(format!("non-linear term `{expr}`")));
                };
            }
            Ok(product)
        }
        _ => Err(Error::Unsupported(format!("expected an integer term, found `{expr}`"))),
    }
}
