use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use netsolve_data::mnist::convert_mnist;
use netsolve_data::LmdbSource;
use netsolve_train::{evaluate, snapshot, Solver, SolverConfig};

#[derive(Parser, Debug)]
#[command(name = "netsolve", about = "Train a classifier with a hand-written SGD loop", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train from LMDB sources and report test accuracy
    Train(TrainArgs),
    /// Import MNIST IDX files into an LMDB of datums
    ConvertMnist(ConvertArgs),
    /// Evaluate a snapshot on the test source
    Eval(EvalArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Solver file (TOML); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    train_source: Option<PathBuf>,
    #[arg(long, value_name = "DIR")]
    test_source: Option<PathBuf>,
    #[arg(long, value_name = "N")]
    max_iter: Option<usize>,
    #[arg(long, value_name = "N")]
    epochs: Option<usize>,
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    /// Resume from a snapshot
    #[arg(long, value_name = "FILE")]
    resume: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    #[arg(long, value_name = "FILE")]
    images: PathBuf,
    #[arg(long, value_name = "FILE")]
    labels: PathBuf,
    #[arg(long, value_name = "DIR")]
    output: PathBuf,
    /// LMDB map size in MiB
    #[arg(long = "map-size-mb", value_name = "MB", default_value_t = 1024)]
    map_size_mb: usize,
}

#[derive(Args, Debug)]
struct EvalArgs {
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
    #[arg(long, value_name = "FILE")]
    snapshot: PathBuf,
    #[arg(long, value_name = "DIR")]
    test_source: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<SolverConfig> {
    match path {
        Some(path) => SolverConfig::from_file(path)
            .with_context(|| format!("failed to load solver config {}", path.display())),
        None => Ok(SolverConfig::default()),
    }
}

fn open_source(path: &Path) -> Result<LmdbSource> {
    LmdbSource::open(path).with_context(|| format!("failed to open LMDB source {}", path.display()))
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.train_source.is_some() {
        config.train_source = args.train_source;
    }
    if args.test_source.is_some() {
        config.test_source = args.test_source;
    }
    if let Some(max_iter) = args.max_iter {
        config.max_iter = max_iter;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    config.validate().context("invalid solver settings")?;

    let train_path = config
        .train_source
        .clone()
        .ok_or_else(|| anyhow!("no train source: set train_source or pass --train-source"))?;
    let train = config.train_loader(open_source(&train_path)?)?;
    let test = match config.test_source.clone() {
        Some(path) => Some(config.test_loader(open_source(&path)?)?),
        None => {
            log::warn!("No test source configured; training without evaluation");
            None
        }
    };

    let net = config.build_net()?;
    let mut solver = Solver::new(net, train, test, config)?;
    if let Some(path) = &args.resume {
        solver
            .restore(path)
            .with_context(|| format!("failed to resume from {}", path.display()))?;
    }
    let summary = solver.solve()?;

    match summary.evaluations.last() {
        Some(eval) => println!(
            "iterations: {}, test accuracy: {:.4}, test loss: {:.6}",
            summary.iter, eval.mean_accuracy, eval.mean_loss
        ),
        None => println!(
            "iterations: {}, last train loss: {}",
            summary.iter,
            summary.last_loss.map_or("n/a".to_string(), |l| format!("{:.6}", l))
        ),
    }
    Ok(())
}

fn convert(args: ConvertArgs) -> Result<()> {
    let written = convert_mnist(&args.images, &args.labels, &args.output, args.map_size_mb << 20)
        .with_context(|| format!("failed to convert {}", args.images.display()))?;
    println!("wrote {} records to {}", written, args.output.display());
    Ok(())
}

fn eval(args: EvalArgs) -> Result<()> {
    let mut config = load_config(Some(&args.config))?;
    if args.test_source.is_some() {
        config.test_source = args.test_source;
    }
    let test_path = config
        .test_source
        .clone()
        .ok_or_else(|| anyhow!("no test source: set test_source or pass --test-source"))?;

    let mut net = config.build_net()?;
    let iter = snapshot::restore(&mut net, &args.snapshot)
        .with_context(|| format!("failed to restore {}", args.snapshot.display()))?;
    let mut loader = config.test_loader(open_source(&test_path)?)?;
    let report = evaluate(&mut net, &mut loader, config.test_iter)?;
    println!(
        "iteration {}: {} batches, accuracy = {:.4}, loss = {:.6}",
        iter, report.batches, report.mean_accuracy, report.mean_loss
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train(args) => train(args),
        Commands::ConvertMnist(args) => convert(args),
        Commands::Eval(args) => eval(args),
    }
}
