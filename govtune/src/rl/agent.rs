// src/rl/agent.rs
//
// Linear Gaussian actor/critic learner.
//
// Design:
// - Features: snapshot normalized by the observation range, plus a bias
// - Actor: tanh(W . phi) gives the mean action in [-1, 1]^6, denormalized
//   onto the governance ranges; exploration std = exp(log_std)
// - Critic: linear state value with a Polyak-averaged target copy (tau)
// - Replay buffer of transitions (buffer_size), minibatches of batch_size,
//   train_freq / gradient_steps scheduling and a learning_starts warmup of
//   uniform random actions
// - Entropy: fixed coefficient or "auto" tuning towards -ACTION_DIM
// - use_sde: exploration noise held for the whole episode instead of
//   resampled every step
//
// All sampling uses a ChaCha8 stream seeded from the config.

use std::collections::VecDeque;
use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{RawAction, Snapshot, ACTION_BOUNDS, ACTION_DIM, OBS_DIM, OBS_HIGH};

use super::env::GovernanceEnv;
use super::policy::{FitSummary, Policy, TrainablePolicy};

pub const LINEAR_POLICY_VERSION: &str = "linear-gaussian-v1";

/// Feature dimension: normalized snapshot plus bias.
pub const FEATURE_DIM: usize = OBS_DIM + 1;

const LOG_STD_MIN: f64 = -5.0;
const LOG_STD_MAX: f64 = 1.0;
const LOG_ALPHA_MIN: f64 = -10.0;
const LOG_ALPHA_MAX: f64 = 2.0;
const INITIAL_LOG_STD: f64 = -0.5;

/// Entropy coefficient setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntCoef {
    /// Learned, starting at 1.0.
    Auto,
    Fixed(f64),
}

/// Learner hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub buffer_size: usize,
    /// Polyak coefficient for the target critic.
    pub tau: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Environment steps between training phases.
    pub train_freq: u64,
    /// Gradient updates per training phase.
    pub gradient_steps: u32,
    pub ent_coef: EntCoef,
    pub use_sde: bool,
    /// Steps of uniform random exploration at the start of each `fit`.
    pub learning_starts: u64,
    pub seed: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            batch_size: 256,
            buffer_size: 1_000_000,
            tau: 0.005,
            gamma: 0.99,
            train_freq: 1,
            gradient_steps: 1,
            ent_coef: EntCoef::Auto,
            use_sde: false,
            learning_starts: 100,
            seed: 0,
        }
    }
}

/// Normalized snapshot features with a trailing bias term.
pub fn features(obs: &Snapshot) -> [f64; FEATURE_DIM] {
    let mut phi = [1.0; FEATURE_DIM];
    for (i, (v, hi)) in obs.to_array().iter().zip(OBS_HIGH.iter()).enumerate() {
        phi[i] = if v.is_finite() {
            (v / hi).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
    phi
}

fn denormalize(unit: &[f64; ACTION_DIM]) -> RawAction {
    let mut raw = [0.0; ACTION_DIM];
    for (i, b) in ACTION_BOUNDS.iter().enumerate() {
        raw[i] = b.denormalize(unit[i]);
    }
    raw
}

#[derive(Debug, Clone)]
struct Transition {
    phi: [f64; FEATURE_DIM],
    unit_action: [f64; ACTION_DIM],
    reward: f64,
    next_phi: [f64; FEATURE_DIM],
    done: bool,
}

/// Fixed-capacity FIFO replay buffer.
#[derive(Debug, Clone)]
struct ReplayBuffer {
    capacity: usize,
    items: VecDeque<Transition>,
}

impl ReplayBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    fn push(&mut self, t: Transition) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(t);
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Serializable learned parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicyParams {
    pub version: String,
    pub config: LearnerConfig,
    pub actor_w: Vec<[f64; FEATURE_DIM]>,
    pub log_std: [f64; ACTION_DIM],
    pub critic_w: [f64; FEATURE_DIM],
    pub critic_target_w: [f64; FEATURE_DIM],
    pub log_alpha: f64,
    pub total_updates: u64,
}

/// Linear Gaussian actor/critic.
pub struct LinearGaussianPolicy {
    params: LinearPolicyParams,
    buffer: ReplayBuffer,
    rng: ChaCha8Rng,
    episode_noise: Option<[f64; ACTION_DIM]>,
}

impl LinearGaussianPolicy {
    pub fn new(config: LearnerConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let buffer = ReplayBuffer::new(config.buffer_size);
        let log_alpha = match config.ent_coef {
            EntCoef::Auto => 0.0,
            EntCoef::Fixed(v) => v.max(1e-12).ln(),
        };
        Self {
            params: LinearPolicyParams {
                version: LINEAR_POLICY_VERSION.to_string(),
                config,
                actor_w: vec![[0.0; FEATURE_DIM]; ACTION_DIM],
                log_std: [INITIAL_LOG_STD; ACTION_DIM],
                critic_w: [0.0; FEATURE_DIM],
                critic_target_w: [0.0; FEATURE_DIM],
                log_alpha,
                total_updates: 0,
            },
            buffer,
            rng,
            episode_noise: None,
        }
    }

    /// Rebuild a policy from an artifact produced by `to_artifact`.
    pub fn from_artifact(bytes: &[u8]) -> anyhow::Result<Self> {
        let params: LinearPolicyParams = serde_json::from_slice(bytes)?;
        anyhow::ensure!(
            params.actor_w.len() == ACTION_DIM,
            "actor weight rows: expected {}, got {}",
            ACTION_DIM,
            params.actor_w.len()
        );
        let mut policy = Self::new(params.config.clone());
        policy.params = params;
        Ok(policy)
    }

    pub fn params(&self) -> &LinearPolicyParams {
        &self.params
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.params.config
    }

    fn alpha(&self) -> f64 {
        self.params.log_alpha.exp()
    }

    fn mean_unit(&self, phi: &[f64; FEATURE_DIM]) -> [f64; ACTION_DIM] {
        let mut mu = [0.0; ACTION_DIM];
        for (j, row) in self.params.actor_w.iter().enumerate() {
            let z: f64 = row.iter().zip(phi.iter()).map(|(w, x)| w * x).sum();
            mu[j] = z.tanh();
        }
        mu
    }

    fn value(w: &[f64; FEATURE_DIM], phi: &[f64; FEATURE_DIM]) -> f64 {
        w.iter().zip(phi.iter()).map(|(a, b)| a * b).sum()
    }

    fn standard_normal(&mut self) -> f64 {
        // Box-Muller.
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn noise_vector(&mut self) -> [f64; ACTION_DIM] {
        let mut eps = [0.0; ACTION_DIM];
        for e in eps.iter_mut() {
            *e = self.standard_normal();
        }
        eps
    }

    fn sample_unit_action(&mut self, phi: &[f64; FEATURE_DIM], warmup: bool) -> [f64; ACTION_DIM] {
        if warmup {
            let mut a = [0.0; ACTION_DIM];
            for v in a.iter_mut() {
                *v = self.rng.gen_range(-1.0..=1.0);
            }
            return a;
        }

        let eps = if self.params.config.use_sde {
            match self.episode_noise {
                Some(n) => n,
                None => {
                    let n = self.noise_vector();
                    self.episode_noise = Some(n);
                    n
                }
            }
        } else {
            self.noise_vector()
        };

        let mu = self.mean_unit(phi);
        let mut a = [0.0; ACTION_DIM];
        for j in 0..ACTION_DIM {
            a[j] = (mu[j] + self.params.log_std[j].exp() * eps[j]).clamp(-1.0, 1.0);
        }
        a
    }

    fn train(&mut self, gradient_steps: u32) -> u64 {
        let batch_size = self.params.config.batch_size.max(1);
        if self.buffer.is_empty() {
            return 0;
        }

        let lr = self.params.config.learning_rate;
        let gamma = self.params.config.gamma;
        let tau = self.params.config.tau;
        let mut updates = 0;

        for _ in 0..gradient_steps {
            let idx: Vec<usize> = (0..batch_size)
                .map(|_| self.rng.gen_range(0..self.buffer.len()))
                .collect();

            // TD errors double as advantages.
            let mut deltas = Vec::with_capacity(batch_size);
            for &i in &idx {
                let t = &self.buffer.items[i];
                let bootstrap = if t.done {
                    0.0
                } else {
                    gamma * Self::value(&self.params.critic_target_w, &t.next_phi)
                };
                let target = t.reward + bootstrap;
                deltas.push(target - Self::value(&self.params.critic_w, &t.phi));
            }

            let n = deltas.len() as f64;
            let mean_delta = deltas.iter().sum::<f64>() / n;
            let std_delta = (deltas.iter().map(|d| (d - mean_delta).powi(2)).sum::<f64>() / n)
                .sqrt()
                .max(1e-8);

            let mut critic_grad = [0.0; FEATURE_DIM];
            let mut actor_grad = vec![[0.0; FEATURE_DIM]; ACTION_DIM];
            let mut log_std_grad = [0.0; ACTION_DIM];

            for (&i, &delta) in idx.iter().zip(deltas.iter()) {
                let t = &self.buffer.items[i];
                for k in 0..FEATURE_DIM {
                    critic_grad[k] += delta * t.phi[k] / n;
                }

                let adv = (delta - mean_delta) / std_delta;
                let mu = self.mean_unit(&t.phi);
                for j in 0..ACTION_DIM {
                    let sigma = self.params.log_std[j].exp();
                    let diff = t.unit_action[j] - mu[j];
                    let dlogp_dmu = diff / (sigma * sigma);
                    let dmu_dz = 1.0 - mu[j] * mu[j];
                    for k in 0..FEATURE_DIM {
                        actor_grad[j][k] += adv * dlogp_dmu * dmu_dz * t.phi[k] / n;
                    }
                    log_std_grad[j] += adv * (diff * diff / (sigma * sigma) - 1.0) / n;
                }
            }

            for k in 0..FEATURE_DIM {
                self.params.critic_w[k] += lr * critic_grad[k];
            }
            for j in 0..ACTION_DIM {
                for k in 0..FEATURE_DIM {
                    self.params.actor_w[j][k] += lr * actor_grad[j][k].clamp(-1.0, 1.0);
                }
            }

            // Entropy of a diagonal Gaussian grows by 1 per unit of log_std.
            let alpha = self.alpha();
            for j in 0..ACTION_DIM {
                let step = lr * (log_std_grad[j] + alpha);
                self.params.log_std[j] =
                    (self.params.log_std[j] + step).clamp(LOG_STD_MIN, LOG_STD_MAX);
            }

            if self.params.config.ent_coef == EntCoef::Auto {
                let target_entropy = -(ACTION_DIM as f64);
                let entropy: f64 = self
                    .params
                    .log_std
                    .iter()
                    .map(|ls| ls + 0.5 * (2.0 * PI * std::f64::consts::E).ln())
                    .sum();
                // d/d(log_alpha) of -log_alpha * (log_pi + target) with log_pi = -entropy.
                self.params.log_alpha = (self.params.log_alpha
                    - lr * (entropy - target_entropy))
                    .clamp(LOG_ALPHA_MIN, LOG_ALPHA_MAX);
            }

            for k in 0..FEATURE_DIM {
                self.params.critic_target_w[k] =
                    (1.0 - tau) * self.params.critic_target_w[k] + tau * self.params.critic_w[k];
            }

            self.params.total_updates += 1;
            updates += 1;
        }
        updates
    }
}

impl Policy for LinearGaussianPolicy {
    fn version(&self) -> &str {
        &self.params.version
    }

    fn act(&self, obs: &Snapshot) -> RawAction {
        denormalize(&self.mean_unit(&features(obs)))
    }
}

impl TrainablePolicy for LinearGaussianPolicy {
    fn fit(&mut self, env: &mut GovernanceEnv, total_steps: u64) -> FitSummary {
        let mut summary = FitSummary::default();
        let mut reward_sum = 0.0;
        let mut obs = env.observation();
        let train_freq = self.params.config.train_freq.max(1);
        let learning_starts = self.params.config.learning_starts;
        let gradient_steps = self.params.config.gradient_steps;

        for step in 0..total_steps {
            let phi = features(&obs);
            let unit = self.sample_unit_action(&phi, step < learning_starts);
            let result = env.step(&denormalize(&unit));

            reward_sum += result.reward;
            summary.steps += 1;

            let done = result.done();
            self.buffer.push(Transition {
                phi,
                unit_action: unit,
                reward: result.reward,
                next_phi: features(&result.observation),
                done: result.terminated,
            });

            obs = if done {
                summary.episodes_completed += 1;
                self.episode_noise = None;
                env.reset().0
            } else {
                result.observation
            };

            if step + 1 > learning_starts && (step + 1) % train_freq == 0 {
                summary.updates += self.train(gradient_steps);
            }
        }

        if summary.steps > 0 {
            summary.mean_step_reward = reward_sum / summary.steps as f64;
        }
        summary
    }

    fn to_artifact(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.params)?)
    }
}
