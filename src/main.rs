//! Actuarial PV CLI
//!
//! Derive life-contingent quantities from asserted facts, with the
//! derivation trace printed alongside the answer.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Deserialize;

use actuarial_pv::{
    ClosedFormCalculator, ConstantForce, Interest, JsonFormatter, LifeTable, PlainFormatter,
    QuantityKey, RecursionEngine,
};

#[derive(Parser)]
#[command(name = "actuarial_pv", version, about = "Recursive actuarial derivation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run two worked exam-style derivations with printed traces
    Demo,
    /// Solve one quantity from a JSON facts file
    Solve(SolveArgs),
}

#[derive(Args)]
struct SolveArgs {
    /// JSON file with an array of facts
    #[arg(long)]
    facts: PathBuf,

    /// Annual effective interest rate
    #[arg(long)]
    interest: f64,

    /// Maximum recursion depth
    #[arg(long, default_value_t = 6)]
    depth: u32,

    /// Target family: q, p, e, E, A, IA, DA, a
    #[arg(long)]
    family: String,

    /// Attained age of the target
    #[arg(long)]
    age: i32,

    /// Term in years; omit for whole life
    #[arg(long)]
    term: Option<i32>,

    /// Deferral period in years
    #[arg(long, default_value_t = 0)]
    deferral: i32,

    /// Endowment insurance rather than death-benefit-only
    #[arg(long)]
    endowment: bool,

    /// Continuous basis
    #[arg(long)]
    continuous: bool,

    /// Moment: first, second, or variance
    #[arg(long, default_value = "first")]
    moment: String,

    /// Constant force of mortality for closed-form fallback
    #[arg(long)]
    mu: Option<f64>,

    /// Life table CSV (age,q) for closed-form fallback
    #[arg(long)]
    table: Option<PathBuf>,

    /// Emit the trace as JSON instead of plain text
    #[arg(long)]
    json: bool,
}

/// One asserted fact in the input file
#[derive(Debug, Deserialize)]
struct FactSpec {
    family: String,
    age: i32,
    #[serde(default)]
    term: Option<i32>,
    #[serde(default)]
    deferral: i32,
    #[serde(default)]
    endowment: bool,
    #[serde(default)]
    continuous: bool,
    #[serde(default)]
    moment: Option<String>,
    value: f64,
}

fn build_key(
    family: &str,
    age: i32,
    term: Option<i32>,
    deferral: i32,
    endowment: bool,
    continuous: bool,
    moment: &str,
) -> Result<QuantityKey> {
    let mut key = match (family, term) {
        ("q", Some(t)) => QuantityKey::mortality_term(age, t),
        ("q", None) => QuantityKey::mortality(age),
        ("p", Some(t)) => QuantityKey::survival_term(age, t),
        ("p", None) => QuantityKey::survival(age),
        ("e", Some(t)) => QuantityKey::lifetime_term(age, t),
        ("e", None) => QuantityKey::lifetime(age),
        ("E", Some(t)) => QuantityKey::pure_endowment(age, t),
        ("E", None) => bail!("pure endowment needs a term"),
        ("A", Some(t)) if endowment => QuantityKey::endowment_insurance(age, t),
        ("A", Some(t)) => QuantityKey::term_insurance(age, t),
        ("A", None) => QuantityKey::whole_life_insurance(age),
        ("IA", Some(t)) => QuantityKey::increasing_insurance(age, t),
        ("DA", Some(t)) => QuantityKey::decreasing_insurance(age, t),
        ("IA" | "DA", None) => bail!("varying insurance needs a term"),
        ("a", Some(t)) => QuantityKey::temporary_annuity(age, t),
        ("a", None) => QuantityKey::whole_life_annuity(age),
        (other, _) => bail!("unknown family {:?} (expected q, p, e, E, A, IA, DA, a)", other),
    };
    key = key.deferred(deferral);
    if continuous {
        key = key.continuous();
    }
    key = match moment {
        "first" | "" => key,
        "second" => key.second_moment(),
        "variance" => key.variance(),
        other => bail!("unknown moment {:?} (expected first, second, variance)", other),
    };
    Ok(key)
}

fn run_solve(args: &SolveArgs) -> Result<()> {
    let interest = Interest::from_rate(args.interest)?;
    let mut engine = RecursionEngine::new(interest).with_depth(args.depth);

    if let Some(mu) = args.mu {
        engine = engine.with_fallback(ClosedFormCalculator::new(ConstantForce::new(mu), interest));
    } else if let Some(path) = &args.table {
        let table = LifeTable::load_csv(path)
            .map_err(|e| anyhow!("loading life table {}: {}", path.display(), e))?;
        engine = engine.with_fallback(ClosedFormCalculator::new(table, interest));
    }

    let text = std::fs::read_to_string(&args.facts)
        .with_context(|| format!("reading facts file {}", args.facts.display()))?;
    let specs: Vec<FactSpec> = serde_json::from_str(&text)
        .with_context(|| format!("parsing facts file {}", args.facts.display()))?;
    for spec in &specs {
        let key = build_key(
            &spec.family,
            spec.age,
            spec.term,
            spec.deferral,
            spec.endowment,
            spec.continuous,
            spec.moment.as_deref().unwrap_or("first"),
        )?;
        engine.assert_fact(key, spec.value);
    }
    info!("loaded {} facts", engine.facts().len());

    let target = build_key(
        &args.family,
        args.age,
        args.term,
        args.deferral,
        args.endowment,
        args.continuous,
        &args.moment,
    )?;

    match engine.solve(&target) {
        Some(value) => {
            println!("{} = {:.8}", target, value);
            if args.json {
                println!("{}", engine.format_trace(&JsonFormatter { pretty: true }));
            } else if engine.last_trace().is_empty() {
                println!("(closed-form fallback, no derivation steps)");
            } else {
                print!("{}", engine.format_trace(&PlainFormatter));
            }
        }
        None => {
            println!("{}: unresolved at depth {}", target, args.depth);
        }
    }
    Ok(())
}

fn run_demo() -> Result<()> {
    println!("Actuarial PV demo");
    println!("=================\n");

    // Recover p_{x+2} from a 3-year annuity and term insurance on (x)
    println!("1) Given p_x = 0.975, a 3-year annuity-due paying 152.85 per");
    println!("   56.05 of premium, and 3-year term insurance of 152.85 per");
    println!("   1000, derive p_{{x+2}} at 6% interest.\n");

    let interest = Interest::from_rate(0.06)?;
    let mut engine = RecursionEngine::new(interest);
    engine
        .set_p(0, 0.975)
        .assert_fact(QuantityKey::temporary_annuity(0, 3), 152.85 / 56.05)
        .assert_fact(QuantityKey::term_insurance(0, 3), 152.85 / 1000.0);

    match engine.solve(&QuantityKey::survival(2)) {
        Some(p2) => {
            println!("   p(2) = {:.6}\n", p2);
            print!("{}", engine.format_trace(&PlainFormatter));
        }
        None => println!("   unresolved"),
    }

    // Recover q_61 from q_60 and a 3-year endowment insurance
    println!("\n2) Given q_60 = 0.01 and A_{{60:3}} = 0.86545 at 5% interest,");
    println!("   derive q_61.\n");

    let interest = Interest::from_rate(0.05)?;
    let mut engine = RecursionEngine::new(interest);
    engine
        .set_q(60, 0.01)
        .assert_fact(QuantityKey::endowment_insurance(60, 3), 0.86545);

    match engine.solve(&QuantityKey::mortality(61)) {
        Some(q61) => {
            println!("   q(61) = {:.6}\n", q61);
            print!("{}", engine.format_trace(&PlainFormatter));
        }
        None => println!("   unresolved"),
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match &cli.command {
        Command::Demo => run_demo(),
        Command::Solve(args) => run_solve(args),
    }
}
