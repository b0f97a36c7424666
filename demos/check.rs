use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, eyre, WrapErr};
use log::{info, warn};

use cegar_rs::abstractor::WaitlistBasedAbstractor;
use cegar_rs::arg::{Arg, NodeId};
use cegar_rs::builder::ArgBuilder;
use cegar_rs::cancel::CancelToken;
use cegar_rs::cegar::CegarChecker;
use cegar_rs::composite::{CompositeDomain, CompositePrec, CompositeState, SolverStrengthener};
use cegar_rs::domain::{Domain, ExprAction, ExprState, Lts};
use cegar_rs::expl::{ExplDomain, ExplPrec, ExplState};
use cegar_rs::impact::ImpactChecker;
use cegar_rs::pred::{PredDomain, PredPrec, PredState};
use cegar_rs::refiner::{ExprRefiner, TraceStatus};
use cegar_rs::safety::{CheckResult, SafetyChecker, SafetyStatus};
use cegar_rs::solver::{BuiltinSolver, Solver};
use cegar_rs::sts::{Sts, StsAction};
use cegar_rs::waitlist::{FifoWaitlist, LifoWaitlist, WaitlistSupplier};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum DomainKind {
    Expl,
    Pred,
    Composite,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum WaitlistKind {
    Fifo,
    Lifo,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum RefinerKind {
    Impact,
    Cegar,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Model file in the STS text format.
    #[arg(value_name = "FILE")]
    model: PathBuf,

    /// Abstract domain.
    #[clap(long, value_enum, default_value = "pred")]
    domain: DomainKind,

    /// Exploration order of the abstractor (CEGAR only).
    #[clap(long, value_enum, default_value = "fifo")]
    waitlist: WaitlistKind,

    /// Refinement strategy.
    #[clap(long, value_enum, default_value = "impact")]
    refiner: RefinerKind,

    /// Write the final ARG in DOT format.
    #[clap(long, value_name = "FILE")]
    dot: Option<PathBuf>,

    /// Variable tracked by the explicit component of the composite domain.
    #[clap(long = "track", value_name = "VAR")]
    track: Vec<String>,

    /// Give up after this many seconds.
    #[clap(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// More logging (-v: debug, -vv: trace).
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(2)
        }
    }
}

fn run() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    let args = Cli::parse();
    let level = match args.verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = Instant::now();

    let text = std::fs::read_to_string(&args.model).wrap_err_with(|| format!("cannot read {}", args.model.display()))?;
    let sts: Sts = text.parse()?;
    info!("model with {} variables", sts.vars().len());

    let cancel = CancelToken::new();
    if let Some(secs) = args.timeout {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            cancel.cancel();
        });
    }
    let solver: Rc<dyn Solver> = Rc::new(BuiltinSolver::with_cancel(cancel.clone()));
    let waitlist = match args.waitlist {
        WaitlistKind::Fifo => FifoWaitlist::supplier(),
        WaitlistKind::Lifo => LifoWaitlist::supplier(),
    };
    if args.refiner == RefinerKind::Impact && args.waitlist != WaitlistKind::Fifo {
        warn!("--waitlist is ignored by --refiner impact");
    }
    let dot = args.dot.as_deref();

    let code = match args.domain {
        DomainKind::Expl => {
            if args.refiner == RefinerKind::Impact {
                bail!("the explicit domain cannot be refined in place, use --refiner cegar");
            }
            let domain = ExplDomain::new(solver.clone(), sts.init_formula(), sts.target());
            let builder = ArgBuilder::<_, _, StsAction>::new(sts.lts(), domain);
            let checker = cegar(builder, waitlist, refiner(&sts, &solver), &cancel);
            report(checker.check(&ExplPrec::empty()), &refiner::<ExplState>(&sts, &solver), dot)?
        }
        DomainKind::Pred => {
            let domain = PredDomain::new(solver.clone(), sts.init_formula(), sts.target());
            let builder = ArgBuilder::<_, _, StsAction>::new(sts.lts(), domain);
            let result = match args.refiner {
                RefinerKind::Impact => ImpactChecker::new(builder, refiner::<PredState>(&sts, &solver))
                    .with_cancel(cancel.clone())
                    .check(&PredPrec::empty()),
                RefinerKind::Cegar => {
                    cegar(builder, waitlist, refiner(&sts, &solver), &cancel).check(&PredPrec::empty())
                }
            };
            report(result, &refiner::<PredState>(&sts, &solver), dot)?
        }
        DomainKind::Composite => {
            let mut tracked = Vec::new();
            for name in &args.track {
                match sts.vars().iter().find(|v| v.name() == name) {
                    Some(var) => tracked.push(var.clone()),
                    None => bail!("unknown variable `{name}` in --track"),
                }
            }
            let prec = CompositePrec(ExplPrec::new(tracked), PredPrec::empty());
            let domain = CompositeDomain::new(
                ExplDomain::new(solver.clone(), sts.init_formula(), sts.target()),
                PredDomain::new(solver.clone(), sts.init_formula(), sts.target()),
            )
            .with_strengthener(SolverStrengthener::new(solver.clone()));
            let builder = ArgBuilder::<_, _, StsAction>::new(sts.lts(), domain);
            let result = match args.refiner {
                RefinerKind::Impact => ImpactChecker::new(builder, refiner::<CompositeState<_, _>>(&sts, &solver))
                    .with_cancel(cancel.clone())
                    .check(&prec),
                RefinerKind::Cegar => cegar(builder, waitlist, refiner(&sts, &solver), &cancel).check(&prec),
            };
            report(result, &refiner::<CompositeState<ExplState, PredState>>(&sts, &solver), dot)?
        }
    };

    info!("All done in {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(code)
}

fn refiner<S: ExprState + 'static>(sts: &Sts, solver: &Rc<dyn Solver>) -> ExprRefiner<S> {
    let target = sts.target();
    ExprRefiner::new(solver.clone(), sts.init_formula(), move |_: &S| target.clone())
}

fn cegar<L, D, S>(
    builder: ArgBuilder<L, D, StsAction>,
    waitlist: WaitlistSupplier<NodeId>,
    refiner: ExprRefiner<S>,
    cancel: &CancelToken,
) -> CegarChecker<WaitlistBasedAbstractor<L, D, StsAction>, S>
where
    D: Domain<StsAction, State = S>,
    L: Lts<S, StsAction>,
    S: 'static,
{
    let abstractor = WaitlistBasedAbstractor::new(builder)
        .with_covering()
        .with_waitlist(waitlist)
        .with_cancel(cancel.clone());
    CegarChecker::new(abstractor, refiner).with_cancel(cancel.clone())
}

/// Prints the outcome and returns the exit code: 0 for SAFE, 1 for UNSAFE, 3 when
/// aborted.
fn report<S, A>(result: CheckResult<S, A>, refiner: &ExprRefiner<S>, dot: Option<&Path>) -> color_eyre::Result<ExitCode>
where
    S: ExprState + Display,
    A: ExprAction + Display,
{
    let status = match result {
        Ok(status) => status,
        Err(failure) => {
            if let Some(path) = dot {
                write_dot(&failure.arg, path)?;
            }
            return Err(eyre!("{failure}"));
        }
    };
    if let (Some(arg), Some(path)) = (status.arg(), dot) {
        write_dot(arg, path)?;
    }

    println!("{status}");
    match &status {
        SafetyStatus::Safe { arg } => {
            println!("ARG with {} nodes", arg.len());
            Ok(ExitCode::SUCCESS)
        }
        SafetyStatus::Unsafe { trace, .. } => {
            println!("Abstract counterexample:\n{trace}");
            if let TraceStatus::Feasible(witness) = refiner.check_trace(trace).map_err(|e| eyre!("{e}"))? {
                println!("Concrete witness:");
                for (i, valuation) in witness.iter().enumerate() {
                    println!("  {i}: {valuation}");
                }
            }
            Ok(ExitCode::from(1))
        }
        SafetyStatus::Aborted => Ok(ExitCode::from(3)),
    }
}

fn write_dot<S: Display, A: Display>(arg: &Arg<S, A>, path: &Path) -> color_eyre::Result<()> {
    std::fs::write(path, arg.to_dot()?).wrap_err_with(|| format!("cannot write {}", path.display()))?;
    info!("ARG written to {}", path.display());
    Ok(())
}
