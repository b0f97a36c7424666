//! Control-flow automata.
//!
//! A CFA is a graph of locations whose edges carry statement sequences. It is analysed
//! with the location domain wrapped around a data domain; [`CfaLts`] enables exactly the
//! edges leaving a state's location.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::domain::{ExprAction, Lts};
use crate::error::{Error, Result};
use crate::expr::{Expr, Sort};
use crate::indexing::VarIndexing;
use crate::loc::LocAware;
use crate::stmt::{unfold_stmts, Stmt};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Loc {
    id: usize,
    name: Rc<str>,
}

impl Loc {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CfaEdge {
    pub source: Loc,
    pub target: Loc,
    pub stmts: Vec<Stmt>,
}

/// An edge of a CFA, shared between the automaton and the ARGs built over it.
#[derive(Debug, Clone)]
pub struct CfaAction(Rc<CfaEdge>);

impl CfaAction {
    pub fn edge(&self) -> &CfaEdge {
        &self.0
    }

    pub fn source(&self) -> &Loc {
        &self.0.source
    }

    pub fn target(&self) -> &Loc {
        &self.0.target
    }
}

impl PartialEq for CfaAction {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for CfaAction {}

impl ExprAction for CfaAction {
    fn unfold(&self, from: &VarIndexing) -> (Expr, VarIndexing) {
        unfold_stmts(&self.0.stmts, from)
    }
}

impl fmt::Display for CfaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.0.source, self.0.target)?;
        for (i, stmt) in self.0.stmts.iter().enumerate() {
            write!(f, "{}{stmt}", if i == 0 { ": " } else { "; " })?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Cfa {
    locs: Vec<Loc>,
    init: Loc,
    error: Option<Loc>,
    edges: Vec<CfaAction>,
    outgoing: HashMap<usize, Vec<CfaAction>>,
}

impl Cfa {
    pub fn builder() -> CfaBuilder {
        CfaBuilder::default()
    }

    pub fn init_loc(&self) -> &Loc {
        &self.init
    }

    pub fn error_loc(&self) -> Option<&Loc> {
        self.error.as_ref()
    }

    pub fn locs(&self) -> &[Loc] {
        &self.locs
    }

    pub fn edges(&self) -> &[CfaAction] {
        &self.edges
    }

    pub fn outgoing(&self, loc: &Loc) -> &[CfaAction] {
        self.outgoing.get(&loc.id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
pub struct CfaBuilder {
    locs: Vec<Loc>,
    by_name: HashMap<Rc<str>, usize>,
    init: Option<Loc>,
    error: Option<Loc>,
    edges: Vec<CfaEdge>,
}

impl CfaBuilder {
    /// The location called `name`, created on first use.
    pub fn loc(&mut self, name: &str) -> Loc {
        if let Some(&id) = self.by_name.get(name) {
            return self.locs[id].clone();
        }
        let loc = Loc {
            id: self.locs.len(),
            name: Rc::from(name),
        };
        self.by_name.insert(loc.name.clone(), loc.id);
        self.locs.push(loc.clone());
        loc
    }

    pub fn set_init(&mut self, loc: &Loc) {
        self.init = Some(loc.clone());
    }

    pub fn set_error(&mut self, loc: &Loc) {
        self.error = Some(loc.clone());
    }

    pub fn add_edge(&mut self, source: &Loc, target: &Loc, stmts: Vec<Stmt>) {
        self.edges.push(CfaEdge {
            source: source.clone(),
            target: target.clone(),
            stmts,
        });
    }

    pub fn build(self) -> Result<Cfa> {
        let init = self
            .init
            .ok_or_else(|| Error::Model("automaton has no initial location".into()))?;
        let mut edges = Vec::with_capacity(self.edges.len());
        let mut outgoing: HashMap<usize, Vec<CfaAction>> = HashMap::new();
        for edge in self.edges {
            for stmt in &edge.stmts {
                check_stmt(stmt)
                    .map_err(|e| Error::Model(format!("edge {} -> {}: {e}", edge.source, edge.target)))?;
            }
            let action = CfaAction(Rc::new(edge));
            outgoing.entry(action.source().id).or_default().push(action.clone());
            edges.push(action);
        }
        debug!("built automaton with {} locations and {} edges", self.locs.len(), edges.len());
        Ok(Cfa {
            locs: self.locs,
            init,
            error: self.error,
            edges,
            outgoing,
        })
    }
}

fn check_stmt(stmt: &Stmt) -> Result<()> {
    let expr = match stmt {
        Stmt::Assume(cond) => {
            if cond.type_check()? != Sort::Bool {
                return Err(Error::Sort(format!("assumption `{cond}` is not a formula")));
            }
            cond
        }
        Stmt::Assign(var, value) => {
            if value.type_check()? != var.sort() {
                return Err(Error::Sort(format!("`{value}` cannot be assigned to `{var}`")));
            }
            value
        }
        Stmt::Havoc(_) => return Ok(()),
    };
    if expr.has_primes() {
        return Err(Error::Model(format!("statement `{stmt}` refers to a next-state variable")));
    }
    Ok(())
}

/// Enables the edges leaving the location of a state.
pub struct CfaLts {
    cfa: Rc<Cfa>,
}

impl CfaLts {
    pub fn new(cfa: Rc<Cfa>) -> Self {
        Self { cfa }
    }
}

impl<S: LocAware> Lts<S, CfaAction> for CfaLts {
    fn enabled_actions(&self, state: &S) -> Vec<CfaAction> {
        self.cfa.outgoing(state.loc()).to_vec()
    }
}
