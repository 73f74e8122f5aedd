// src/rl/search.rs
//
// Hyperparameter search over learner configurations.
//
// - SearchSpace: named parameter domains (continuous, optionally log-scaled,
//   or categorical)
// - TrialSearch: propose / report / best
// - RandomSearch: independent per-domain sampling from a seeded ChaCha8 stream
// - run_search: maximizes an objective over n trials
//
// A trial whose score is not finite is recorded as failed and never becomes
// the best trial.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::agent::{EntCoef, LearnerConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterDomain {
    Continuous { low: f64, high: f64, log_scale: bool },
    Categorical(Vec<ParameterValue>),
}

impl ParameterDomain {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match self {
            ParameterDomain::Continuous {
                low,
                high,
                log_scale: true,
            } => {
                let (lo, hi) = (low.ln(), high.ln());
                ParameterValue::Float(rng.gen_range(lo..=hi).exp().clamp(*low, *high))
            }
            ParameterDomain::Continuous {
                low,
                high,
                log_scale: false,
            } => ParameterValue::Float(rng.gen_range(*low..=*high)),
            ParameterDomain::Categorical(choices) => {
                choices[rng.gen_range(0..choices.len())].clone()
            }
        }
    }

    pub fn contains(&self, value: &ParameterValue) -> bool {
        match self {
            ParameterDomain::Continuous { low, high, .. } => value
                .as_f64()
                .map(|v| v >= *low && v <= *high)
                .unwrap_or(false),
            ParameterDomain::Categorical(choices) => choices.contains(value),
        }
    }
}

/// Named parameter domains, sampled in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpace {
    domains: BTreeMap<String, ParameterDomain>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, domain: ParameterDomain) -> &mut Self {
        if let ParameterDomain::Categorical(choices) = &domain {
            assert!(!choices.is_empty(), "categorical domain {name} is empty");
        }
        self.domains.insert(name.to_string(), domain);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDomain> {
        self.domains.get(name)
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// The learner search space.
    pub fn default_space() -> Self {
        use ParameterValue::{Bool, Float, Int, Str};

        let mut space = Self::new();
        space
            .add(
                "learning_rate",
                ParameterDomain::Continuous {
                    low: 1e-5,
                    high: 1e-3,
                    log_scale: true,
                },
            )
            .add(
                "batch_size",
                ParameterDomain::Categorical(vec![Int(64), Int(128), Int(256)]),
            )
            .add(
                "buffer_size",
                ParameterDomain::Categorical(vec![Int(10_000), Int(50_000), Int(100_000)]),
            )
            .add(
                "tau",
                ParameterDomain::Continuous {
                    low: 0.005,
                    high: 0.02,
                    log_scale: false,
                },
            )
            .add(
                "gamma",
                ParameterDomain::Continuous {
                    low: 0.95,
                    high: 0.9999,
                    log_scale: false,
                },
            )
            .add(
                "train_freq",
                ParameterDomain::Categorical(vec![Int(1), Int(4), Int(8)]),
            )
            .add(
                "gradient_steps",
                ParameterDomain::Categorical(vec![Int(1), Int(4), Int(8)]),
            )
            .add(
                "ent_coef",
                ParameterDomain::Categorical(vec![
                    Str("auto".to_string()),
                    Float(0.1),
                    Float(0.2),
                ]),
            )
            .add(
                "use_sde",
                ParameterDomain::Categorical(vec![Bool(false), Bool(true)]),
            );
        space
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BTreeMap<String, ParameterValue> {
        self.domains
            .iter()
            .map(|(name, domain)| (name.clone(), domain.sample(rng)))
            .collect()
    }
}

/// One proposed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: usize,
    pub params: BTreeMap<String, ParameterValue>,
}

impl Trial {
    pub fn params_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrial {
    pub trial: Trial,
    /// None for failed trials.
    pub score: Option<f64>,
    pub status: TrialStatus,
}

/// Sequential search strategy.
pub trait TrialSearch {
    fn propose(&mut self) -> Trial;
    fn report(&mut self, trial: &Trial, score: f64);
    /// Highest-scoring completed trial.
    fn best(&self) -> Option<&CompletedTrial>;
    fn history(&self) -> &[CompletedTrial];
}

/// Independent uniform sampling of every domain.
pub struct RandomSearch {
    space: SearchSpace,
    rng: ChaCha8Rng,
    next_id: usize,
    history: Vec<CompletedTrial>,
    best_idx: Option<usize>,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
            history: Vec::new(),
            best_idx: None,
        }
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }
}

impl TrialSearch for RandomSearch {
    fn propose(&mut self) -> Trial {
        let trial = Trial {
            id: self.next_id,
            params: self.space.sample(&mut self.rng),
        };
        self.next_id += 1;
        trial
    }

    fn report(&mut self, trial: &Trial, score: f64) {
        let completed = if score.is_finite() {
            CompletedTrial {
                trial: trial.clone(),
                score: Some(score),
                status: TrialStatus::Completed,
            }
        } else {
            CompletedTrial {
                trial: trial.clone(),
                score: None,
                status: TrialStatus::Failed,
            }
        };

        let idx = self.history.len();
        let improves = match (completed.score, self.best_idx) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(s), Some(b)) => self.history[b].score.map_or(true, |best| s > best),
        };
        self.history.push(completed);
        if improves {
            self.best_idx = Some(idx);
        }
    }

    fn best(&self) -> Option<&CompletedTrial> {
        self.best_idx.map(|i| &self.history[i])
    }

    fn history(&self) -> &[CompletedTrial] {
        &self.history
    }
}

/// Run `n_trials` trials, maximizing `objective`. Returns the best trial, if
/// any trial produced a finite score.
pub fn run_search<S, F>(sampler: &mut S, n_trials: usize, mut objective: F) -> Option<CompletedTrial>
where
    S: TrialSearch + ?Sized,
    F: FnMut(&Trial) -> f64,
{
    for _ in 0..n_trials {
        let trial = sampler.propose();
        let score = objective(&trial);
        sampler.report(&trial, score);
    }
    sampler.best().cloned()
}

impl LearnerConfig {
    /// Build a configuration from searched parameters. Names missing from
    /// `params` keep the value from `base`.
    pub fn from_params(params: &BTreeMap<String, ParameterValue>, base: &LearnerConfig) -> Result<Self> {
        let mut cfg = base.clone();
        for (name, value) in params {
            let bad = || anyhow!("parameter {name} has unexpected value {value:?}");
            match name.as_str() {
                "learning_rate" => cfg.learning_rate = value.as_f64().ok_or_else(bad)?,
                "batch_size" => cfg.batch_size = positive_usize(value).ok_or_else(bad)?,
                "buffer_size" => cfg.buffer_size = positive_usize(value).ok_or_else(bad)?,
                "tau" => cfg.tau = value.as_f64().ok_or_else(bad)?,
                "gamma" => cfg.gamma = value.as_f64().ok_or_else(bad)?,
                "train_freq" => cfg.train_freq = positive_usize(value).ok_or_else(bad)? as u64,
                "gradient_steps" => {
                    cfg.gradient_steps = positive_usize(value).ok_or_else(bad)? as u32
                }
                "ent_coef" => {
                    cfg.ent_coef = match value {
                        ParameterValue::Str(s) if s == "auto" => EntCoef::Auto,
                        v => EntCoef::Fixed(v.as_f64().ok_or_else(bad)?),
                    }
                }
                "use_sde" => cfg.use_sde = value.as_bool().ok_or_else(bad)?,
                other => bail!("unknown learner parameter {other}"),
            }
        }
        Ok(cfg)
    }
}

fn positive_usize(value: &ParameterValue) -> Option<usize> {
    value
        .as_i64()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
}
