// src/main.rs
//
// CLI entrypoint: serve the prediction front end.
//
// - Profile precedence: --profile > GOVTUNE_PROFILE > smoke.
// - --cache / --model-dir / --seed override the env-derived config.
// - Prints one startup header (profile, cfg hash, cache, model dir).

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use govtune::config::{resolve_effective_profile, Config, TrainingProfile};
use govtune::logging::JsonlSink;
use govtune::ops::{serve, DEFAULT_ADDR};
use govtune::rl::TrainingController;
use govtune::{PredictionService, SampleCache};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ProfileArg {
    Smoke,
    Full,
}

impl From<ProfileArg> for TrainingProfile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Smoke => TrainingProfile::Smoke,
            ProfileArg::Full => TrainingProfile::Full,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "govtune",
    about = "Governance parameter tuning service",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve POST /predict/, GET /health and GET /metrics.
    Serve(ServeArgs),
}

#[derive(Debug, clap::Args)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, default_value = DEFAULT_ADDR)]
    addr: String,

    /// Training profile preset. If omitted, uses GOVTUNE_PROFILE (default smoke).
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Sample cache CSV path.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Directory for model artifacts.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Seed for search and learners.
    #[arg(long)]
    seed: Option<u64>,

    /// Verbosity: -v prints the resolved config.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let effective = resolve_effective_profile(args.profile.map(TrainingProfile::from));
    effective.log_startup();

    let mut cfg = Config::from_env_or_profile(effective.profile);
    if let Some(path) = args.cache {
        cfg.cache_path = Some(path);
    }
    if let Some(dir) = args.model_dir {
        cfg.model_dir = Some(dir);
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }

    println!(
        "govtune | cfg_hash=0x{:016x} | profile={} | batch_threshold={} | accept_threshold={} | trials={} | seed={} | cache={} | model_dir={}",
        cfg.fingerprint(),
        cfg.profile.as_str(),
        cfg.batch_threshold,
        cfg.acceptance_threshold,
        cfg.search_trials,
        cfg.seed,
        cfg.cache_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory".to_string()),
        cfg.model_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string()),
    );
    if args.verbose > 0 {
        eprintln!("{cfg:#?}");
    }

    let cache = SampleCache::open(cfg.cache_path.clone(), cfg.batch_threshold)?;
    let controller = TrainingController::with_linear_policy(cfg)
        .with_sink(Box::new(JsonlSink::from_env()));
    let service = PredictionService::new(cache, controller);

    serve(&args.addr, &service)
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Serve(a) => run_serve(a),
    }
}
