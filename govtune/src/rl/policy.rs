// src/rl/policy.rs
//
// Policy interfaces.
//
// - Policy: deterministic map from snapshot to raw action
// - TrainablePolicy: a Policy that can be fitted against the environment
//   and exported as an opaque artifact
// - HeuristicPolicy: proposes the reward's ideal targets directly
// - ConstantPolicy: always proposes the same raw action
//
// The environment clips whatever a policy proposes, so policies are free to
// emit out-of-range values.

use serde::{Deserialize, Serialize};

use crate::types::{ActionVector, RawAction, Snapshot};

use super::env::GovernanceEnv;
use super::reward::IdealTargets;

pub const HEURISTIC_POLICY_VERSION: &str = "heuristic-v1";
pub const CONSTANT_POLICY_VERSION: &str = "constant-v1";

/// Interface for all policy implementations.
pub trait Policy: Send {
    /// Version string for this policy implementation.
    fn version(&self) -> &str;

    /// Deterministic action for a snapshot. Same snapshot, same action.
    fn act(&self, obs: &Snapshot) -> RawAction;
}

/// Summary of one `fit` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Environment steps taken.
    pub steps: u64,
    /// Episodes that reached termination during the call.
    pub episodes_completed: u64,
    /// Gradient updates applied (0 for non-learning policies).
    pub updates: u64,
    /// Mean per-step reward seen while fitting.
    pub mean_step_reward: f64,
}

/// A policy that can learn from interaction.
pub trait TrainablePolicy: Policy {
    /// Interact with `env` for `total_steps` steps, starting from the
    /// environment's current state, resetting only after termination.
    fn fit(&mut self, env: &mut GovernanceEnv, total_steps: u64) -> FitSummary;

    /// Serialized parameters.
    fn to_artifact(&self) -> anyhow::Result<Vec<u8>>;
}

/// Step `env` with a fixed decision rule, resetting after each terminal step.
pub fn rollout_steps<F>(env: &mut GovernanceEnv, total_steps: u64, mut act: F) -> FitSummary
where
    F: FnMut(&Snapshot) -> RawAction,
{
    let mut summary = FitSummary::default();
    let mut reward_sum = 0.0;
    let mut obs = env.observation();

    for _ in 0..total_steps {
        let result = env.step(&act(&obs));
        reward_sum += result.reward;
        summary.steps += 1;
        obs = if result.done() {
            summary.episodes_completed += 1;
            env.reset().0
        } else {
            result.observation
        };
    }

    if summary.steps > 0 {
        summary.mean_step_reward = reward_sum / summary.steps as f64;
    }
    summary
}

/// Proposes the reward function's ideal targets for the observed snapshot.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPolicy;

impl HeuristicPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for HeuristicPolicy {
    fn version(&self) -> &str {
        HEURISTIC_POLICY_VERSION
    }

    fn act(&self, obs: &Snapshot) -> RawAction {
        // min_balance and voting_period targets depend on the applied delegate
        // count and block period; resolve those two first.
        let seed = IdealTargets::compute(obs, &ActionVector::from_raw(&[1.0; 6]));
        let provisional = ActionVector::from_raw(&[
            seed.num_delegates,
            1.0,
            60.0,
            0.0,
            1.0,
            seed.block_creation_period,
        ]);
        let t = IdealTargets::compute(obs, &provisional);
        [
            t.num_delegates,
            t.delegate_window,
            t.voting_period,
            t.decay_factor,
            t.min_balance,
            t.block_creation_period,
        ]
    }
}

#[derive(Serialize, Deserialize)]
struct StaticPolicyArtifact {
    kind: String,
    version: String,
    action: Option<RawAction>,
}

impl TrainablePolicy for HeuristicPolicy {
    fn fit(&mut self, env: &mut GovernanceEnv, total_steps: u64) -> FitSummary {
        let policy = self.clone();
        rollout_steps(env, total_steps, |obs| policy.act(obs))
    }

    fn to_artifact(&self) -> anyhow::Result<Vec<u8>> {
        let artifact = StaticPolicyArtifact {
            kind: "heuristic".to_string(),
            version: HEURISTIC_POLICY_VERSION.to_string(),
            action: None,
        };
        Ok(serde_json::to_vec(&artifact)?)
    }
}

/// Always proposes the same raw action.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPolicy {
    action: RawAction,
}

impl ConstantPolicy {
    pub fn new(action: RawAction) -> Self {
        Self { action }
    }
}

impl Policy for ConstantPolicy {
    fn version(&self) -> &str {
        CONSTANT_POLICY_VERSION
    }

    fn act(&self, _obs: &Snapshot) -> RawAction {
        self.action
    }
}

impl TrainablePolicy for ConstantPolicy {
    fn fit(&mut self, env: &mut GovernanceEnv, total_steps: u64) -> FitSummary {
        let action = self.action;
        rollout_steps(env, total_steps, |_| action)
    }

    fn to_artifact(&self) -> anyhow::Result<Vec<u8>> {
        let artifact = StaticPolicyArtifact {
            kind: "constant".to_string(),
            version: CONSTANT_POLICY_VERSION.to_string(),
            action: Some(self.action),
        };
        Ok(serde_json::to_vec(&artifact)?)
    }
}
