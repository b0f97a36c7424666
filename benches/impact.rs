//! Impact and CEGAR on small transition systems.
//!
//! Run with:
//! ```bash
//! cargo bench --bench impact
//! ```

use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use cegar_rs::abstractor::WaitlistBasedAbstractor;
use cegar_rs::builder::ArgBuilder;
use cegar_rs::cegar::CegarChecker;
use cegar_rs::domain::ExprState;
use cegar_rs::expl::{ExplDomain, ExplPrec, ExplState};
use cegar_rs::impact::ImpactChecker;
use cegar_rs::pred::{PredDomain, PredPrec, PredState};
use cegar_rs::refiner::ExprRefiner;
use cegar_rs::safety::SafetyChecker;
use cegar_rs::solver::{BuiltinSolver, Solver};
use cegar_rs::sts::{Sts, StsAction};

/// A counter that stops at `bound`, with the property `x <= bound`.
fn counter(bound: i64) -> Sts {
    format!("var x : int\ninit x = 0\ntrans x < {bound} && x' = x + 1\nprop x <= {bound}")
        .parse()
        .unwrap()
}

/// Two counters moving one at a time until both reach `bound`.
fn grid(bound: i64) -> Sts {
    format!(
        "var x : int\nvar y : int\ninit x = 0 && y = 0\n\
         trans x' = x + 1 && y' = y || x' = x && y' = y + 1\n\
         prop !(x = {bound} && y = {bound})"
    )
    .parse()
    .unwrap()
}

fn refiner<S: ExprState + 'static>(sts: &Sts, solver: &Rc<dyn Solver>) -> ExprRefiner<S> {
    let target = sts.target();
    ExprRefiner::new(solver.clone(), sts.init_formula(), move |_: &S| target.clone())
}

fn impact(sts: &Sts) -> bool {
    let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
    let domain = PredDomain::new(solver.clone(), sts.init_formula(), sts.target());
    let builder = ArgBuilder::<_, _, StsAction>::new(sts.lts(), domain);
    let checker = ImpactChecker::new(builder, refiner::<PredState>(sts, &solver));
    checker.check(&PredPrec::empty()).unwrap().is_safe()
}

fn cegar(sts: &Sts) -> bool {
    let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::new());
    let domain = ExplDomain::new(solver.clone(), sts.init_formula(), sts.target());
    let abstractor = WaitlistBasedAbstractor::new(ArgBuilder::<_, _, StsAction>::new(sts.lts(), domain)).with_covering();
    let checker = CegarChecker::new(abstractor, refiner::<ExplState>(sts, &solver));
    checker.check(&ExplPrec::empty()).unwrap().is_safe()
}

fn bench_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter");
    for bound in [2, 4, 8] {
        let sts = counter(bound);
        group.bench_with_input(BenchmarkId::new("impact", bound), &sts, |b, sts| b.iter(|| impact(sts)));
        group.bench_with_input(BenchmarkId::new("cegar", bound), &sts, |b, sts| b.iter(|| cegar(sts)));
    }
    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");
    group.sample_size(10);
    for bound in [1, 2] {
        let sts = grid(bound);
        group.bench_with_input(BenchmarkId::new("impact", bound), &sts, |b, sts| b.iter(|| impact(sts)));
    }
    group.finish();
}

criterion_group!(benches, bench_counter, bench_grid);
criterion_main!(benches);
