//! Symbolic transition systems.
//!
//! An STS declares its variables, an initial condition, a transition relation over
//! current (`x`) and next (`x'`) variables, an invariant that holds in every state, and
//! a safety property. Its target states are those violating the property.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use crate::domain::{ExprAction, Lts};
use crate::error::{Error, Result};
use crate::expr::{Expr, Sort, Var};
use crate::indexing::VarIndexing;

#[derive(Debug, Clone)]
pub struct Sts {
    vars: BTreeSet<Var>,
    init: Expr,
    trans: Expr,
    invar: Expr,
    prop: Expr,
}

impl Sts {
    pub fn builder() -> StsBuilder {
        StsBuilder::default()
    }

    pub fn vars(&self) -> &BTreeSet<Var> {
        &self.vars
    }

    pub fn init(&self) -> &Expr {
        &self.init
    }

    pub fn trans(&self) -> &Expr {
        &self.trans
    }

    pub fn invar(&self) -> &Expr {
        &self.invar
    }

    pub fn prop(&self) -> &Expr {
        &self.prop
    }

    /// The initial states: `init` restricted to the invariant.
    pub fn init_formula(&self) -> Expr {
        Expr::and([self.init.clone(), self.invar.clone()])
    }

    /// The states violating the property.
    pub fn target(&self) -> Expr {
        Expr::not(self.prop.clone())
    }

    /// The single action of the system.
    pub fn action(&self) -> StsAction {
        StsAction {
            trans: Rc::new(Expr::and([
                self.trans.clone(),
                self.invar.clone(),
                self.invar.prime_vars(),
            ])),
            vars: Rc::new(self.vars.clone()),
        }
    }

    pub fn lts(&self) -> StsLts {
        StsLts { action: self.action() }
    }
}

impl fmt::Display for Sts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for var in &self.vars {
            writeln!(f, "var {var} : {}", var.sort())?;
        }
        writeln!(f, "init {}", self.init)?;
        writeln!(f, "trans {}", self.trans)?;
        writeln!(f, "invar {}", self.invar)?;
        write!(f, "prop {}", self.prop)
    }
}

#[derive(Debug, Default)]
pub struct StsBuilder {
    vars: BTreeSet<Var>,
    init: Vec<Expr>,
    trans: Vec<Expr>,
    invar: Vec<Expr>,
    prop: Option<Expr>,
}

impl StsBuilder {
    pub fn var(mut self, var: Var) -> Self {
        self.vars.insert(var);
        self
    }

    pub fn init(mut self, expr: Expr) -> Self {
        self.init.push(expr);
        self
    }

    pub fn trans(mut self, expr: Expr) -> Self {
        self.trans.push(expr);
        self
    }

    pub fn invar(mut self, expr: Expr) -> Self {
        self.invar.push(expr);
        self
    }

    /// Sets the property; a later call replaces an earlier one.
    pub fn prop(mut self, expr: Expr) -> Self {
        self.prop = Some(expr);
        self
    }

    pub fn build(self) -> Result<Sts> {
        let init = Expr::and(self.init);
        let trans = Expr::and(self.trans);
        let invar = Expr::and(self.invar);
        let prop = self.prop.unwrap_or(Expr::bool(true));
        for (what, expr, primes) in [
            ("init", &init, false),
            ("trans", &trans, true),
            ("invar", &invar, false),
            ("prop", &prop, false),
        ] {
            if expr.type_check()? != Sort::Bool {
                return Err(Error::Sort(format!("{what} `{expr}` is not a formula")));
            }
            if !primes && expr.has_primes() {
                return Err(Error::Model(format!("{what} `{expr}` refers to next-state variables")));
            }
            if let Some(var) = expr.vars().into_iter().find(|v| !self.vars.contains(v)) {
                return Err(Error::Model(format!("{what} refers to undeclared variable `{var}`")));
            }
        }
        Ok(Sts {
            vars: self.vars,
            init,
            trans,
            invar,
            prop,
        })
    }
}

/// The transition relation of an STS, unfolded one step at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsAction {
    trans: Rc<Expr>,
    vars: Rc<BTreeSet<Var>>,
}

impl StsAction {
    pub fn trans(&self) -> &Expr {
        &self.trans
    }
}

impl ExprAction for StsAction {
    fn unfold(&self, from: &VarIndexing) -> (Expr, VarIndexing) {
        let mut to = from.clone();
        for var in self.vars.iter() {
            to.inc(var);
        }
        (from.unfold(&self.trans), to)
    }
}

impl fmt::Display for StsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trans")
    }
}

/// Enables the transition relation in every state.
#[derive(Debug, Clone)]
pub struct StsLts {
    action: StsAction,
}

impl<S> Lts<S, StsAction> for StsLts {
    fn enabled_actions(&self, _state: &S) -> Vec<StsAction> {
        vec![self.action.clone()]
    }
}
