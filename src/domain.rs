//! Abstract domains.
//!
//! An abstract domain bundles the operations the algorithms need over an abstract state
//! type `S`, an action type `A` and a precision type `P`:
//!
//! - `init_states(P)`: abstract states covering the initial states of the model,
//! - `transfer(S, A, P)`: the abstract post image, possibly empty,
//! - `may_be_target(S)`: an over-approximation of "contains a target state",
//! - `is_bottom(S)`: whether the state denotes no concrete state at all,
//! - `is_leq(S, S)`: subsumption, i.e. inclusion of concretizations.
//!
//! Precisions form a join semi-lattice: [`Prec::join`] is idempotent, commutative and
//! monotone, so a refinement never loses what was tracked before.
//!
//! Concrete domains live in their own modules: [`expl`][crate::expl],
//! [`pred`][crate::pred], [`loc`][crate::loc], [`null`][crate::null], and products of
//! those in [`composite`][crate::composite].

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::Result;
use crate::expr::Expr;
use crate::indexing::VarIndexing;

/// Abstract states: immutable values with structural equality.
pub trait State: Clone + Eq + Hash + Debug + Display {}

impl<T: Clone + Eq + Hash + Debug + Display> State for T {}

/// Actions are opaque to the algorithms.
pub trait Action: Clone + Debug + Display {}

impl<T: Clone + Debug + Display> Action for T {}

pub trait Prec: Clone + Eq + Debug {
    /// The least precision tracking everything either operand tracks.
    fn join(&self, other: &Self) -> Self;
}

pub trait Domain<A> {
    type State: State;
    type Prec: Prec;

    fn init_states(&self, prec: &Self::Prec) -> Result<Vec<Self::State>>;

    fn transfer(&self, state: &Self::State, action: &A, prec: &Self::Prec) -> Result<Vec<Self::State>>;

    fn may_be_target(&self, state: &Self::State) -> Result<bool>;

    fn is_bottom(&self, state: &Self::State) -> bool;

    fn is_leq(&self, state1: &Self::State, state2: &Self::State) -> Result<bool>;
}

/// The labelled transition system view of a model: which actions a state enables.
pub trait Lts<S, A> {
    fn enabled_actions(&self, state: &S) -> Vec<A>;
}

/// States whose concretization is described by a formula over current-state variables.
pub trait ExprState {
    fn to_expr(&self) -> Expr;
}

/// Actions whose semantics is a transition formula.
pub trait ExprAction {
    /// The transition formula over the copies selected by `from`, together with the
    /// indexing that selects the post-state copies.
    fn unfold(&self, from: &VarIndexing) -> (Expr, VarIndexing);
}

/// States that can be strengthened in place by an arbitrary formula, as the Impact
/// refinement requires.
pub trait ExprStrengthen: ExprState + Sized {
    /// A state whose concretization is that of `self` intersected with `label`.
    fn strengthen(&self, label: &Expr) -> Self;

    /// The empty state at the same position (same location, same components).
    fn bottom(&self) -> Self;
}
