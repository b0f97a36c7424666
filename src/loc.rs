//! The location domain: pairs a control location with a data state.
//!
//! Data precisions may vary per location. The successor of a state along an edge is
//! computed by the inner domain under the precision of the edge's target location.

use std::collections::BTreeMap;
use std::fmt;

use crate::cfa::{CfaAction, Loc};
use crate::domain::{Domain, ExprState, ExprStrengthen, Prec};
use crate::error::Result;
use crate::expr::Expr;

/// States that know their control location.
pub trait LocAware {
    fn loc(&self) -> &Loc;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocState<S> {
    pub loc: Loc,
    pub state: S,
}

impl<S> LocState<S> {
    pub fn new(loc: Loc, state: S) -> Self {
        Self { loc, state }
    }
}

impl<S> LocAware for LocState<S> {
    fn loc(&self) -> &Loc {
        &self.loc
    }
}

impl<S: ExprState> ExprState for LocState<S> {
    fn to_expr(&self) -> Expr {
        self.state.to_expr()
    }
}

impl<S: ExprStrengthen> ExprStrengthen for LocState<S> {
    fn strengthen(&self, label: &Expr) -> Self {
        Self::new(self.loc.clone(), self.state.strengthen(label))
    }

    fn bottom(&self) -> Self {
        Self::new(self.loc.clone(), self.state.bottom())
    }
}

impl<S: fmt::Display> fmt::Display for LocState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.loc, self.state)
    }
}

/// A precision per location, falling back to a default for locations without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocPrec<P> {
    default: P,
    overrides: BTreeMap<Loc, P>,
}

impl<P: Prec> LocPrec<P> {
    /// The same precision at every location.
    pub fn constant(prec: P) -> Self {
        Self {
            default: prec,
            overrides: BTreeMap::new(),
        }
    }

    /// A copy with the precision at `loc` replaced.
    pub fn with(&self, loc: &Loc, prec: P) -> Self {
        let mut overrides = self.overrides.clone();
        overrides.insert(loc.clone(), prec);
        Self {
            default: self.default.clone(),
            overrides,
        }
    }

    pub fn get(&self, loc: &Loc) -> &P {
        self.overrides.get(loc).unwrap_or(&self.default)
    }

    pub fn default_prec(&self) -> &P {
        &self.default
    }

    /// Applies `f` to the default and to every per-location precision.
    pub fn map(&self, f: impl Fn(&P) -> P) -> Self {
        Self {
            default: f(&self.default),
            overrides: self.overrides.iter().map(|(loc, p)| (loc.clone(), f(p))).collect(),
        }
    }
}

impl<P: Prec> Prec for LocPrec<P> {
    fn join(&self, other: &Self) -> Self {
        let mut overrides = BTreeMap::new();
        for loc in self.overrides.keys().chain(other.overrides.keys()) {
            overrides.insert(loc.clone(), self.get(loc).join(other.get(loc)));
        }
        Self {
            default: self.default.join(&other.default),
            overrides,
        }
    }
}

pub struct LocDomain<D> {
    init_loc: Loc,
    target_locs: Vec<Loc>,
    inner: D,
}

impl<D> LocDomain<D> {
    /// Wraps `inner`; `target_locs` are the locations whose (non-empty) states are
    /// targets regardless of their data.
    pub fn new(init_loc: Loc, target_locs: impl IntoIterator<Item = Loc>, inner: D) -> Self {
        Self {
            init_loc,
            target_locs: target_locs.into_iter().collect(),
            inner,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Domain<CfaAction>> Domain<CfaAction> for LocDomain<D> {
    type State = LocState<D::State>;
    type Prec = LocPrec<D::Prec>;

    fn init_states(&self, prec: &Self::Prec) -> Result<Vec<Self::State>> {
        let inner = self.inner.init_states(prec.get(&self.init_loc))?;
        Ok(inner
            .into_iter()
            .map(|s| LocState::new(self.init_loc.clone(), s))
            .collect())
    }

    fn transfer(&self, state: &Self::State, action: &CfaAction, prec: &Self::Prec) -> Result<Vec<Self::State>> {
        if action.source() != &state.loc {
            return Ok(Vec::new());
        }
        let target = action.target();
        let succs = self.inner.transfer(&state.state, action, prec.get(target))?;
        Ok(succs.into_iter().map(|s| LocState::new(target.clone(), s)).collect())
    }

    fn may_be_target(&self, state: &Self::State) -> Result<bool> {
        if self.inner.is_bottom(&state.state) {
            return Ok(false);
        }
        if self.target_locs.contains(&state.loc) {
            return Ok(true);
        }
        self.inner.may_be_target(&state.state)
    }

    fn is_bottom(&self, state: &Self::State) -> bool {
        self.inner.is_bottom(&state.state)
    }

    fn is_leq(&self, state1: &Self::State, state2: &Self::State) -> Result<bool> {
        if state1.loc != state2.loc {
            return Ok(false);
        }
        self.inner.is_leq(&state1.state, &state2.state)
    }
}
