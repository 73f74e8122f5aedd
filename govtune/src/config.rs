// src/config.rs
//
// Runtime configuration for the tuning service.
//
// `Config` is the single source of truth for thresholds, training budgets and
// file locations. Budgets come from a `TrainingProfile`; individual knobs can
// then be overridden from the environment (`Config::from_env_or_profile`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rl::env::EnvConfig;

/// Rows required before a retrain pass runs.
pub const DEFAULT_BATCH_THRESHOLD: usize = 32;

/// Minimum mean evaluation return for a model to be served.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 10.0;

/// Trials per hyperparameter search.
pub const DEFAULT_SEARCH_TRIALS: usize = 10;

pub const DEFAULT_CACHE_PATH: &str = "data_cache.csv";

/// Training budget presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingProfile {
    /// Small budgets; a retrain finishes in well under a second.
    Smoke,
    /// Production budgets.
    Full,
}

impl TrainingProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingProfile::Smoke => "smoke",
            TrainingProfile::Full => "full",
        }
    }

    /// Parse a profile name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<TrainingProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smoke" | "s" | "fast" => Some(TrainingProfile::Smoke),
            "full" | "f" | "prod" => Some(TrainingProfile::Full),
            _ => None,
        }
    }
}

/// Source of the effective profile.
///
/// Precedence (highest to lowest):
/// 1. CLI argument (--profile)
/// 2. GOVTUNE_PROFILE
/// 3. Default (Smoke)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

/// Resolved profile with its source for logging.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveProfile {
    pub profile: TrainingProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    /// Format: `effective_training_profile=<profile> source=<source>`
    pub fn log_startup(&self) {
        eprintln!(
            "effective_training_profile={} source={}",
            self.profile.as_str(),
            self.source.as_str()
        );
    }
}

pub fn resolve_effective_profile(cli_profile: Option<TrainingProfile>) -> EffectiveProfile {
    if let Some(p) = cli_profile {
        return EffectiveProfile {
            profile: p,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(env_val) = env::var("GOVTUNE_PROFILE") {
        if !env_val.is_empty() {
            if let Some(p) = TrainingProfile::parse(&env_val) {
                return EffectiveProfile {
                    profile: p,
                    source: ProfileSource::Env,
                };
            }
            eprintln!(
                "[config] WARN: invalid GOVTUNE_PROFILE={:?}; ignoring",
                env_val
            );
        }
    }

    EffectiveProfile {
        profile: TrainingProfile::Smoke,
        source: ProfileSource::Default,
    }
}

/// Step and episode budgets for one retrain pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingBudget {
    /// `fit` steps per valid row during warm start.
    pub warm_start_steps: u64,
    /// `fit` steps for the optimized model.
    pub optimized_steps: u64,
    /// Deterministic episodes for the acceptance evaluation.
    pub eval_episodes: usize,
    /// `fit` steps per search trial.
    pub trial_train_steps: u64,
    /// Deterministic episodes scoring a search trial.
    pub trial_eval_episodes: usize,
}

impl TrainingBudget {
    pub fn for_profile(profile: TrainingProfile) -> Self {
        match profile {
            TrainingProfile::Smoke => Self {
                warm_start_steps: 200,
                optimized_steps: 150,
                eval_episodes: 15,
                trial_train_steps: 150,
                trial_eval_episodes: 10,
            },
            TrainingProfile::Full => Self {
                warm_start_steps: 120_000,
                optimized_steps: 120_000,
                eval_episodes: 300,
                trial_train_steps: 1200,
                trial_eval_episodes: 10,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub profile: TrainingProfile,
    pub budget: TrainingBudget,
    pub batch_threshold: usize,
    pub acceptance_threshold: f64,
    pub search_trials: usize,
    /// Seeds the search sampler and every learner it builds.
    pub seed: u64,
    /// CSV mirror of the sample cache. None keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
    /// Directory for model artifacts. None disables persistence.
    pub model_dir: Option<PathBuf>,
    pub env: EnvConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile(TrainingProfile::Smoke)
    }
}

impl Config {
    pub fn for_profile(profile: TrainingProfile) -> Self {
        Self {
            profile,
            budget: TrainingBudget::for_profile(profile),
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            search_trials: DEFAULT_SEARCH_TRIALS,
            seed: 0,
            cache_path: Some(PathBuf::from(DEFAULT_CACHE_PATH)),
            model_dir: Some(PathBuf::from(".")),
            env: EnvConfig::default(),
        }
    }

    /// Profile defaults with GOVTUNE_* overrides applied.
    pub fn from_env_or_profile(profile: TrainingProfile) -> Self {
        let mut cfg = Config::for_profile(profile);

        override_from_env("GOVTUNE_BATCH_THRESHOLD", &mut cfg.batch_threshold);
        override_from_env("GOVTUNE_ACCEPT_THRESHOLD", &mut cfg.acceptance_threshold);
        override_from_env("GOVTUNE_SEARCH_TRIALS", &mut cfg.search_trials);
        override_from_env("GOVTUNE_SEED", &mut cfg.seed);

        if let Ok(raw) = env::var("GOVTUNE_CACHE_PATH") {
            cfg.cache_path = path_or_none(&raw);
            eprintln!("[config] GOVTUNE_CACHE_PATH = {raw:?} (overrode default)");
        }
        if let Ok(raw) = env::var("GOVTUNE_MODEL_DIR") {
            cfg.model_dir = path_or_none(&raw);
            eprintln!("[config] GOVTUNE_MODEL_DIR = {raw:?} (overrode default)");
        }

        if cfg.batch_threshold == 0 {
            eprintln!("[config] WARN: batch threshold 0 is not allowed; using 1");
            cfg.batch_threshold = 1;
        }

        cfg
    }

    /// FNV-1a over the Debug form, for the startup line.
    pub fn fingerprint(&self) -> u64 {
        fnv1a64(&format!("{self:?}"))
    }
}

/// Empty and "none"/"off" disable the location.
fn path_or_none(raw: &str) -> Option<PathBuf> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "off" => None,
        _ => Some(PathBuf::from(raw.trim())),
    }
}

fn override_from_env<T>(key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Ok(raw) = env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => {
            eprintln!("[config] {key} = {v:?} (overrode default)");
            *slot = v;
        }
        Err(_) => {
            eprintln!(
                "[config] WARN: could not parse {key} = {:?}; using default {:?}",
                raw, slot
            );
        }
    }
}

pub fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}
