//! Quantifier-free expressions over boolean and integer variables.
//!
//! Expressions are plain trees. The smart constructors ([`Expr::and`], [`Expr::or`],
//! [`Expr::not`]) flatten nested connectives and fold boolean literals, so the trees
//! produced by the domains and the refiner stay small.
//!
//! A variable may appear in three forms:
//! - `x`, the current-state copy ([`Expr::Var`]),
//! - `x'`, the next-state copy ([`Expr::Prime`]), used by transition formulas,
//! - `x@k`, the `k`-th copy in an unfolded path formula ([`Expr::Indexed`]).

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::valuation::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sort {
    Bool,
    Int,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "bool"),
            Sort::Int => write!(f, "int"),
        }
    }
}

/// A named, sorted state variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    name: Rc<str>,
    sort: Sort,
}

impl Var {
    pub fn new(name: &str, sort: Sort) -> Self {
        Self {
            name: Rc::from(name),
            sort,
        }
    }

    pub fn int(name: &str) -> Self {
        Self::new(name, Sort::Int)
    }

    pub fn bool(name: &str) -> Self {
        Self::new(name, Sort::Bool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    /// The current-state reference `x`.
    pub fn expr(&self) -> Expr {
        Expr::Var(self.clone())
    }

    /// The next-state reference `x'`.
    pub fn prime(&self) -> Expr {
        Expr::Prime(self.clone())
    }

    /// The `index`-th copy `x@index`.
    pub fn at(&self, index: usize) -> Expr {
        Expr::Indexed(self.clone(), index)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Var(Var),
    Prime(Var),
    Indexed(Var, usize),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Imply(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Leq(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Geq(Box<Expr>, Box<Expr>),
    Add(Vec<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Mul(Vec<Expr>),
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn bool(value: bool) -> Self {
        Expr::Bool(value)
    }

    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn and(ops: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for op in ops {
            match op {
                Expr::Bool(true) => {}
                Expr::Bool(false) => return Expr::Bool(false),
                Expr::And(inner) => {
                    for e in inner {
                        if !flat.contains(&e) {
                            flat.push(e);
                        }
                    }
                }
                op => {
                    if !flat.contains(&op) {
                        flat.push(op);
                    }
                }
            }
        }
        match flat.len() {
            0 => Expr::Bool(true),
            1 => flat.remove(0),
            _ => Expr::And(flat),
        }
    }

    pub fn or(ops: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for op in ops {
            match op {
                Expr::Bool(false) => {}
                Expr::Bool(true) => return Expr::Bool(true),
                Expr::Or(inner) => {
                    for e in inner {
                        if !flat.contains(&e) {
                            flat.push(e);
                        }
                    }
                }
                op => {
                    if !flat.contains(&op) {
                        flat.push(op);
                    }
                }
            }
        }
        match flat.len() {
            0 => Expr::Bool(false),
            1 => flat.remove(0),
            _ => Expr::Or(flat),
        }
    }

    pub fn not(op: Expr) -> Self {
        match op {
            Expr::Bool(b) => Expr::Bool(!b),
            Expr::Not(inner) => *inner,
            op => Expr::Not(Box::new(op)),
        }
    }

    pub fn imply(lhs: Expr, rhs: Expr) -> Self {
        Expr::Imply(Box::new(lhs), Box::new(rhs))
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::Eq(Box::new(lhs), Box::new(rhs))
    }

    pub fn neq(lhs: Expr, rhs: Expr) -> Self {
        Expr::not(Expr::eq(lhs, rhs))
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Expr::Lt(Box::new(lhs), Box::new(rhs))
    }

    pub fn leq(lhs: Expr, rhs: Expr) -> Self {
        Expr::Leq(Box::new(lhs), Box::new(rhs))
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Expr::Gt(Box::new(lhs), Box::new(rhs))
    }

    pub fn geq(lhs: Expr, rhs: Expr) -> Self {
        Expr::Geq(Box::new(lhs), Box::new(rhs))
    }

    pub fn add(ops: impl IntoIterator<Item = Expr>) -> Self {
        let mut ops: Vec<Expr> = ops.into_iter().collect();
        match ops.len() {
            0 => Expr::Int(0),
            1 => ops.remove(0),
            _ => Expr::Add(ops),
        }
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Expr::Sub(Box::new(lhs), Box::new(rhs))
    }

    pub fn neg(op: Expr) -> Self {
        Expr::Neg(Box::new(op))
    }

    pub fn mul(ops: impl IntoIterator<Item = Expr>) -> Self {
        let mut ops: Vec<Expr> = ops.into_iter().collect();
        match ops.len() {
            0 => Expr::Int(1),
            1 => ops.remove(0),
            _ => Expr::Mul(ops),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Bool(false))
    }

    /// Whether this is a variable reference in any of its three forms.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..))
    }

    /// The sort of the expression, read off the outermost operator.
    ///
    /// Use [`Expr::type_check`] to validate the operands as well.
    pub fn sort(&self) -> Sort {
        match self {
            Expr::Bool(_) => Sort::Bool,
            Expr::Int(_) => Sort::Int,
            Expr::Var(v) | Expr::Prime(v) | Expr::Indexed(v, _) => v.sort(),
            Expr::Not(_)
            | Expr::And(_)
            | Expr::Or(_)
            | Expr::Imply(..)
            | Expr::Eq(..)
            | Expr::Lt(..)
            | Expr::Leq(..)
            | Expr::Gt(..)
            | Expr::Geq(..) => Sort::Bool,
            Expr::Add(_) | Expr::Sub(..) | Expr::Neg(_) | Expr::Mul(_) => Sort::Int,
        }
    }

    /// Checks that every operator is applied to operands of the right sort.
    pub fn type_check(&self) -> Result<Sort> {
        let expect = |e: &Expr, sort: Sort| -> Result<()> {
            let actual = e.type_check()?;
            if actual == sort {
                Ok(())
            } else {
                Err(Error::Sort(format!("expected {sort}, found {actual} in `{e}`")))
            }
        };
        match self {
            Expr::Not(op) => expect(op, Sort::Bool)?,
            Expr::And(ops) | Expr::Or(ops) => {
                for op in ops {
                    expect(op, Sort::Bool)?;
                }
            }
            Expr::Imply(a, b) => {
                expect(a, Sort::Bool)?;
                expect(b, Sort::Bool)?;
            }
            Expr::Eq(a, b) => {
                let sort = a.type_check()?;
                expect(b, sort)?;
            }
            Expr::Lt(a, b) | Expr::Leq(a, b) | Expr::Gt(a, b) | Expr::Geq(a, b) | Expr::Sub(a, b) => {
                expect(a, Sort::Int)?;
                expect(b, Sort::Int)?;
            }
            Expr::Neg(op) => expect(op, Sort::Int)?,
            Expr::Add(ops) | Expr::Mul(ops) => {
                for op in ops {
                    expect(op, Sort::Int)?;
                }
            }
            Expr::Bool(_) | Expr::Int(_) | Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) => {}
        }
        Ok(self.sort())
    }

    /// Direct operands, left to right.
    pub fn ops(&self) -> Vec<&Expr> {
        match self {
            Expr::Bool(_) | Expr::Int(_) | Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) => Vec::new(),
            Expr::Not(op) | Expr::Neg(op) => vec![op],
            Expr::And(ops) | Expr::Or(ops) | Expr::Add(ops) | Expr::Mul(ops) => ops.iter().collect(),
            Expr::Imply(a, b)
            | Expr::Eq(a, b)
            | Expr::Lt(a, b)
            | Expr::Leq(a, b)
            | Expr::Gt(a, b)
            | Expr::Geq(a, b)
            | Expr::Sub(a, b) => vec![a, b],
        }
    }

    /// Rebuilds a node of the same kind over new operands.
    ///
    /// # Panics
    ///
    /// Panics if the number of operands does not fit the operator.
    pub fn with_ops(&self, ops: Vec<Expr>) -> Expr {
        let unary = |mut ops: Vec<Expr>| {
            assert_eq!(ops.len(), 1, "unary operator `{self}` needs exactly one operand");
            ops.remove(0)
        };
        let binary = |mut ops: Vec<Expr>| {
            assert_eq!(ops.len(), 2, "binary operator `{self}` needs exactly two operands");
            let b = ops.remove(1);
            let a = ops.remove(0);
            (a, b)
        };
        match self {
            Expr::Bool(_) | Expr::Int(_) | Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) => {
                assert!(ops.is_empty(), "leaf `{self}` takes no operands");
                self.clone()
            }
            Expr::Not(_) => Expr::not(unary(ops)),
            Expr::Neg(_) => Expr::neg(unary(ops)),
            Expr::And(_) => Expr::and(ops),
            Expr::Or(_) => Expr::or(ops),
            Expr::Add(_) => Expr::add(ops),
            Expr::Mul(_) => Expr::mul(ops),
            Expr::Imply(..) => {
                let (a, b) = binary(ops);
                Expr::imply(a, b)
            }
            Expr::Eq(..) => {
                let (a, b) = binary(ops);
                Expr::eq(a, b)
            }
            Expr::Lt(..) => {
                let (a, b) = binary(ops);
                Expr::lt(a, b)
            }
            Expr::Leq(..) => {
                let (a, b) = binary(ops);
                Expr::leq(a, b)
            }
            Expr::Gt(..) => {
                let (a, b) = binary(ops);
                Expr::gt(a, b)
            }
            Expr::Geq(..) => {
                let (a, b) = binary(ops);
                Expr::geq(a, b)
            }
            Expr::Sub(..) => {
                let (a, b) = binary(ops);
                Expr::sub(a, b)
            }
        }
    }

    /// Top-down rewriting: wherever `f` returns a replacement, that subtree is replaced
    /// and not visited further.
    pub fn map(&self, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        let ops = self.ops();
        if ops.is_empty() {
            return self.clone();
        }
        let mut mapped = Vec::with_capacity(ops.len());
        for op in ops {
            mapped.push(op.map(f));
        }
        self.with_ops(mapped)
    }

    /// Replaces current-state references `x` by `subst[x]`.
    pub fn substitute(&self, subst: &HashMap<Var, Expr>) -> Expr {
        self.map(&mut |e| match e {
            Expr::Var(v) => subst.get(v).cloned(),
            _ => None,
        })
    }

    /// Turns every current-state reference `x` into `x'`.
    pub fn prime_vars(&self) -> Expr {
        self.map(&mut |e| match e {
            Expr::Var(v) => Some(Expr::Prime(v.clone())),
            _ => None,
        })
    }

    /// Variables occurring in any form.
    pub fn vars(&self) -> BTreeSet<Var> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut BTreeSet<Var>) {
        match self {
            Expr::Var(v) | Expr::Prime(v) | Expr::Indexed(v, _) => {
                vars.insert(v.clone());
            }
            _ => {
                for op in self.ops() {
                    op.collect_vars(vars);
                }
            }
        }
    }

    /// Whether some `x'` occurs.
    pub fn has_primes(&self) -> bool {
        match self {
            Expr::Prime(_) => true,
            _ => self.ops().iter().any(|op| op.has_primes()),
        }
    }

    /// Maximal subformulas that are not boolean connectives: comparisons and boolean
    /// variables. Literals are skipped.
    pub fn atoms(&self) -> BTreeSet<Expr> {
        let mut atoms = BTreeSet::new();
        self.collect_atoms(&mut atoms);
        atoms
    }

    fn collect_atoms(&self, atoms: &mut BTreeSet<Expr>) {
        match self {
            Expr::Bool(_) => {}
            Expr::Not(_) | Expr::And(_) | Expr::Or(_) | Expr::Imply(..) => {
                for op in self.ops() {
                    op.collect_atoms(atoms);
                }
            }
            Expr::Eq(a, b) if a.sort() == Sort::Bool => {
                a.collect_atoms(atoms);
                b.collect_atoms(atoms);
            }
            _ => {
                atoms.insert(self.clone());
            }
        }
    }

    /// Partial evaluation.
    ///
    /// `env` supplies values for variable references. The result is `None` when the
    /// value depends on an unknown reference or an arithmetic operation overflows.
    /// Connectives short-circuit, so `x = 1 && false` evaluates to `false` even when `x`
    /// is unknown.
    pub fn eval(&self, env: &dyn Fn(&Expr) -> Option<Value>) -> Option<Value> {
        let int = |e: &Expr| e.eval(env).and_then(|v| v.as_int());
        let boolean = |e: &Expr| e.eval(env).and_then(|v| v.as_bool());
        let value = match self {
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(n) => Value::Int(*n),
            Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) => return env(self),
            Expr::Not(op) => Value::Bool(!boolean(op)?),
            Expr::And(ops) => {
                let mut known = true;
                for op in ops {
                    match boolean(op) {
                        Some(false) => return Some(Value::Bool(false)),
                        Some(true) => {}
                        None => known = false,
                    }
                }
                return known.then_some(Value::Bool(true));
            }
            Expr::Or(ops) => {
                let mut known = true;
                for op in ops {
                    match boolean(op) {
                        Some(true) => return Some(Value::Bool(true)),
                        Some(false) => {}
                        None => known = false,
                    }
                }
                return known.then_some(Value::Bool(false));
            }
            Expr::Imply(a, b) => {
                return match (boolean(a), boolean(b)) {
                    (Some(false), _) | (_, Some(true)) => Some(Value::Bool(true)),
                    (Some(true), Some(false)) => Some(Value::Bool(false)),
                    _ => None,
                };
            }
            Expr::Eq(a, b) => Value::Bool(a.eval(env)? == b.eval(env)?),
            Expr::Lt(a, b) => Value::Bool(int(a)? < int(b)?),
            Expr::Leq(a, b) => Value::Bool(int(a)? <= int(b)?),
            Expr::Gt(a, b) => Value::Bool(int(a)? > int(b)?),
            Expr::Geq(a, b) => Value::Bool(int(a)? >= int(b)?),
            Expr::Add(ops) => {
                let mut sum: i64 = 0;
                for op in ops {
                    sum = sum.checked_add(int(op)?)?;
                }
                Value::Int(sum)
            }
            Expr::Mul(ops) => {
                let mut product: i64 = 1;
                for op in ops {
                    product = product.checked_mul(int(op)?)?;
                }
                Value::Int(product)
            }
            Expr::Sub(a, b) => Value::Int(int(a)?.checked_sub(int(b)?)?),
            Expr::Neg(op) => Value::Int(int(op)?.checked_neg()?),
        };
        Some(value)
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Imply(..) => 1,
            Expr::Or(_) => 2,
            Expr::And(_) => 3,
            Expr::Not(_) => 4,
            Expr::Eq(..) | Expr::Lt(..) | Expr::Leq(..) | Expr::Gt(..) | Expr::Geq(..) => 5,
            Expr::Add(_) | Expr::Sub(..) => 6,
            Expr::Mul(_) => 7,
            Expr::Neg(_) => 8,
            Expr::Bool(_) | Expr::Int(_) | Expr::Var(_) | Expr::Prime(_) | Expr::Indexed(..) => 9,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let parens = self.precedence() < min;
        if parens {
            write!(f, "(")?;
        }
        let join = |f: &mut fmt::Formatter<'_>, ops: &[Expr], sep: &str, min: u8| -> fmt::Result {
            for (i, op) in ops.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                op.fmt_prec(f, min)?;
            }
            Ok(())
        };
        let binary = |f: &mut fmt::Formatter<'_>, a: &Expr, op: &str, b: &Expr, la: u8, lb: u8| -> fmt::Result {
            a.fmt_prec(f, la)?;
            write!(f, " {op} ")?;
            b.fmt_prec(f, lb)
        };
        match self {
            Expr::Bool(b) => write!(f, "{b}")?,
            Expr::Int(n) => write!(f, "{n}")?,
            Expr::Var(v) => write!(f, "{v}")?,
            Expr::Prime(v) => write!(f, "{v}'")?,
            Expr::Indexed(v, k) => write!(f, "{v}@{k}")?,
            Expr::Not(op) => {
                write!(f, "!")?;
                op.fmt_prec(f, 9)?;
            }
            Expr::And(ops) => join(f, ops, "&&", 4)?,
            Expr::Or(ops) => join(f, ops, "||", 4)?,
            Expr::Imply(a, b) => binary(f, a, "->", b, 2, 1)?,
            Expr::Eq(a, b) => binary(f, a, "=", b, 6, 6)?,
            Expr::Lt(a, b) => binary(f, a, "<", b, 6, 6)?,
            Expr::Leq(a, b) => binary(f, a, "<=", b, 6, 6)?,
            Expr::Gt(a, b) => binary(f, a, ">", b, 6, 6)?,
            Expr::Geq(a, b) => binary(f, a, ">=", b, 6, 6)?,
            Expr::Add(ops) => join(f, ops, "+", 6)?,
            Expr::Sub(a, b) => binary(f, a, "-", b, 6, 7)?,
            Expr::Mul(ops) => join(f, ops, "*", 7)?,
            Expr::Neg(op) => {
                write!(f, "-")?;
                op.fmt_prec(f, 9)?;
            }
        }
        if parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Bool(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

impl From<&Var> for Expr {
    fn from(var: &Var) -> Self {
        var.expr()
    }
}
