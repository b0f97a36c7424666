//! Values and partial valuations.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::expr::{Expr, Sort, Var};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Value {
    /// The value a solver picks for an unconstrained variable of the given sort.
    pub fn default_of(sort: Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            Value::Int(_) => None,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            Value::Bool(_) => None,
        }
    }

    pub fn sort(self) -> Sort {
        match self {
            Value::Bool(_) => Sort::Bool,
            Value::Int(_) => Sort::Int,
        }
    }

    pub fn to_expr(self) -> Expr {
        match self {
            Value::Bool(b) => Expr::Bool(b),
            Value::Int(n) => Expr::Int(n),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
        }
    }
}

/// A partial assignment of values to variables, ordered by variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Valuation {
    values: BTreeMap<Var, Value>,
}

impl Valuation {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the value does not have the variable's sort.
    pub fn put(&mut self, var: Var, value: Value) {
        assert_eq!(var.sort(), value.sort(), "value {value} does not fit variable {var}");
        self.values.insert(var, value);
    }

    pub fn get(&self, var: &Var) -> Option<Value> {
        self.values.get(var).copied()
    }

    pub fn remove(&mut self, var: &Var) -> Option<Value> {
        self.values.remove(var)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        self.values.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Var, Value> {
        self.values.iter()
    }

    /// Keeps only the bindings of `vars`.
    pub fn project(&self, vars: &BTreeSet<Var>) -> Valuation {
        self.values
            .iter()
            .filter(|(var, _)| vars.contains(*var))
            .map(|(var, value)| (var.clone(), *value))
            .collect()
    }

    /// The conjunction `x1 = v1 && ... && xn = vn`.
    pub fn to_expr(&self) -> Expr {
        Expr::and(self.values.iter().map(|(var, value)| Expr::eq(var.expr(), value.to_expr())))
    }

    /// Partial evaluation of `expr` with current-state references looked up here.
    pub fn eval(&self, expr: &Expr) -> Option<Value> {
        expr.eval(&|leaf| match leaf {
            Expr::Var(var) => self.get(var),
            _ => None,
        })
    }
}

impl FromIterator<(Var, Value)> for Valuation {
    fn from_iter<T: IntoIterator<Item = (Var, Value)>>(iter: T) -> Self {
        let mut valuation = Valuation::new();
        for (var, value) in iter {
            valuation.put(var, value);
        }
        valuation
    }
}

impl<'a> IntoIterator for &'a Valuation {
    type Item = (&'a Var, &'a Value);
    type IntoIter = btree_map::Iter<'a, Var, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Valuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var} = {value}")?;
        }
        write!(f, "}}")
    }
}
