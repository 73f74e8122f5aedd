use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use govtune::artifacts::{ModelStore, OPTIMIZED_MODEL};
use govtune::metrics::{OnlineStats, StatsSummary};
use govtune::rl::{
    evaluate_policy, GovernanceEnv, HeuristicPolicy, LinearGaussianPolicy, Policy,
};

fn parse_u64(args: &[String], flag: &str, default: u64) -> u64 {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_str<'a>(args: &'a [String], flag: &str, default: &'a str) -> &'a str {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
        .unwrap_or(default)
}

#[derive(Serialize)]
struct EvalSummary {
    policy: String,
    version: String,
    returns: StatsSummary,
}

fn load_policy(kind: &str, model_dir: &str) -> Result<Box<dyn Policy>> {
    match kind {
        "heuristic" => Ok(Box::new(HeuristicPolicy::new())),
        "optimized" => {
            let store = ModelStore::new(model_dir);
            let blob = store.load(OPTIMIZED_MODEL)?;
            let policy = LinearGaussianPolicy::from_artifact(&blob)
                .with_context(|| format!("failed to decode {OPTIMIZED_MODEL}"))?;
            Ok(Box::new(policy))
        }
        other => bail!("unknown policy {other:?} (expected heuristic|optimized)"),
    }
}

fn run(args: &[String]) -> Result<()> {
    let kind = parse_str(args, "--policy", "heuristic");
    let model_dir = parse_str(args, "--model-dir", ".");
    let episodes = parse_u64(args, "--episodes", 15) as usize;
    let out_path = PathBuf::from(parse_str(args, "--out", "runs/govtune_eval/summary.json"));

    let policy = load_policy(kind, model_dir)?;
    let mut env = GovernanceEnv::default();
    let result = evaluate_policy(policy.as_ref(), &mut env, episodes);
    let stats: OnlineStats = result.returns.iter().copied().collect();

    let summary = EvalSummary {
        policy: kind.to_string(),
        version: policy.version().to_string(),
        returns: stats.summary(),
    };

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(&summary)?;
    fs::write(&out_path, payload)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    println!(
        "govtune_eval: policy={} episodes={} mean={:.4} std={:.4} wrote {}",
        kind,
        episodes,
        result.mean_reward,
        result.std_reward,
        out_path.display()
    );
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if let Err(err) = run(&args) {
        eprintln!("govtune_eval: {err:#}");
        std::process::exit(2);
    }
}
