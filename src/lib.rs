//! # cegar-rs: lazy abstraction model checking
//!
//! **`cegar-rs`** decides safety of transition systems: given a model and a property, it
//! either proves that no reachable state violates the property, or produces a concrete
//! counterexample.
//!
//! ## How it works
//!
//! The state space is explored symbolically in an **abstract reachability graph (ARG)**:
//! a tree of abstract states, closed under a *covering* relation. A node covered by a
//! node with a larger state need not be explored any further, so a complete ARG with no
//! reachable target is a proof of safety.
//!
//! Abstract states come from pluggable **domains**:
//!
//! - [`expl`]: explicit values of a set of tracked variables;
//! - [`pred`]: boolean combinations of tracked predicates;
//! - [`loc`]: control locations of a CFA, paired with an inner domain;
//! - [`composite`]: the product of two domains, optionally strengthening each other;
//! - [`null`]: the domain with a single state.
//!
//! Two algorithms build ARGs:
//!
//! - [`cegar::CegarChecker`] runs a [`abstractor::WaitlistBasedAbstractor`] under a
//!   fixed precision and refines the precision on spurious counterexamples;
//! - [`impact::ImpactChecker`] refines the states along a spurious path in place
//!   (lazy abstraction), re-covering nodes as it goes.
//!
//! Both talk to a [`solver::Solver`]; the built-in one decides linear integer arithmetic.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use cegar_rs::builder::ArgBuilder;
//! use cegar_rs::impact::ImpactChecker;
//! use cegar_rs::pred::{PredDomain, PredPrec, PredState};
//! use cegar_rs::refiner::ExprRefiner;
//! use cegar_rs::safety::SafetyChecker;
//! use cegar_rs::solver::BuiltinSolver;
//! use cegar_rs::sts::Sts;
//!
//! // 1. Describe the system: x counts from 0 up to 5.
//! let sts: Sts = "
//!     var x : int
//!     init x = 0
//!     trans x < 5 && x' = x + 1
//!     prop x <= 5
//! "
//! .parse()
//! .unwrap();
//!
//! // 2. Pick a domain and a refiner sharing one solver.
//! let solver = Rc::new(BuiltinSolver::new());
//! let domain = PredDomain::new(solver.clone(), sts.init_formula(), sts.target());
//! let target = sts.target();
//! let refiner = ExprRefiner::new(solver, sts.init_formula(), move |_: &PredState| target.clone());
//!
//! // 3. Check.
//! let checker = ImpactChecker::new(ArgBuilder::new(sts.lts(), domain), refiner);
//! let status = checker.check(&PredPrec::empty()).unwrap();
//! assert!(status.is_safe());
//! ```

pub mod abstractor;
pub mod arg;
pub mod builder;
pub mod cancel;
pub mod cegar;
pub mod cfa;
pub mod composite;
pub mod domain;
pub mod dot;
pub mod error;
pub mod expl;
pub mod expr;
pub mod impact;
pub mod indexing;
pub mod loc;
pub mod null;
pub mod parse;
pub mod pred;
pub mod reached;
pub mod refiner;
pub mod safety;
pub mod solver;
pub mod stmt;
pub mod sts;
pub mod trace;
pub mod valuation;
pub mod waitlist;
