// src/bin/govtune_replay.rs
//
// Feed a CSV or JSONL file of snapshots through the prediction service
// offline and print one JSON response per input row.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;

use govtune::cache::read_snapshot_file;
use govtune::config::{resolve_effective_profile, Config, TrainingProfile};
use govtune::logging::JsonlSink;
use govtune::rl::TrainingController;
use govtune::{PredictionRequest, PredictionService, SampleCache};

struct ReplayArgs {
    input: PathBuf,
    profile: Option<TrainingProfile>,
    seed: Option<u64>,
    model_dir: Option<PathBuf>,
}

fn parse_args() -> Result<ReplayArgs, String> {
    let mut args = env::args().skip(1);
    let mut input: Option<PathBuf> = None;
    let mut profile = None;
    let mut seed = None;
    let mut model_dir = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" => {
                let val = args.next().ok_or("Missing value for --input")?;
                input = Some(PathBuf::from(val));
            }
            "--profile" => {
                let val = args.next().ok_or("Missing value for --profile")?;
                profile = Some(
                    TrainingProfile::parse(&val).ok_or(format!("Unknown profile: {val}"))?,
                );
            }
            "--seed" => {
                let val = args.next().ok_or("Missing value for --seed")?;
                seed = Some(val.parse::<u64>().map_err(|e| format!("Bad --seed: {e}"))?);
            }
            "--model-dir" => {
                let val = args.next().ok_or("Missing value for --model-dir")?;
                model_dir = Some(PathBuf::from(val));
            }
            "--help" | "-h" => {
                println!(
                    "USAGE: govtune_replay --input <PATH> [--profile smoke|full] [--seed N] [--model-dir DIR]"
                );
                std::process::exit(0);
            }
            _ => return Err(format!("Unknown argument: {arg}")),
        }
    }
    Ok(ReplayArgs {
        input: input.ok_or("Missing required --input <PATH>")?,
        profile,
        seed,
        model_dir,
    })
}

fn run(args: ReplayArgs) -> Result<()> {
    let effective = resolve_effective_profile(args.profile);
    effective.log_startup();

    let mut cfg = Config::from_env_or_profile(effective.profile);
    // Replays never touch the live cache file.
    cfg.cache_path = None;
    cfg.model_dir = args.model_dir;
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }

    let rows = read_snapshot_file(&args.input)?;
    eprintln!(
        "govtune_replay | input={} rows={} cfg_hash=0x{:016x}",
        args.input.display(),
        rows.len(),
        cfg.fingerprint()
    );

    let cache = SampleCache::in_memory(cfg.batch_threshold);
    let controller =
        TrainingController::with_linear_policy(cfg).with_sink(Box::new(JsonlSink::from_env()));
    let service = PredictionService::new(cache, controller);

    for row in rows {
        let response = service.predict(PredictionRequest::from(row)).to_response();
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("govtune_replay: {e:#}");
            ExitCode::FAILURE
        }
    }
}
