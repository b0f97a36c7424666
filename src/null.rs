//! The null domain: a single state that tracks nothing.

use std::fmt;

use crate::domain::{Domain, ExprState, Prec};
use crate::error::Result;
use crate::expr::Expr;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NullState;

impl fmt::Display for NullState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "()")
    }
}

impl ExprState for NullState {
    fn to_expr(&self) -> Expr {
        Expr::bool(true)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct NullPrec;

impl Prec for NullPrec {
    fn join(&self, _other: &Self) -> Self {
        NullPrec
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct NullDomain;

impl<A> Domain<A> for NullDomain {
    type State = NullState;
    type Prec = NullPrec;

    fn init_states(&self, _prec: &NullPrec) -> Result<Vec<NullState>> {
        Ok(vec![NullState])
    }

    fn transfer(&self, _state: &NullState, _action: &A, _prec: &NullPrec) -> Result<Vec<NullState>> {
        Ok(vec![NullState])
    }

    fn may_be_target(&self, _state: &NullState) -> Result<bool> {
        Ok(false)
    }

    fn is_bottom(&self, _state: &NullState) -> bool {
        false
    }

    fn is_leq(&self, _state1: &NullState, _state2: &NullState) -> Result<bool> {
        Ok(true)
    }
}
