// src/rl/evaluation.rs
//
// Deterministic policy evaluation: run full episodes with `Policy::act` and
// summarize the episode returns.

use serde::{Deserialize, Serialize};

use crate::metrics::OnlineStats;

use super::env::GovernanceEnv;
use super::policy::Policy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub episodes: usize,
    pub mean_reward: f64,
    /// Population standard deviation of episode returns.
    pub std_reward: f64,
    pub returns: Vec<f64>,
}

/// Return of one episode from reset to termination.
pub fn run_episode<P: Policy + ?Sized>(policy: &P, env: &mut GovernanceEnv) -> f64 {
    let (mut obs, _) = env.reset();
    let mut total = 0.0;
    loop {
        let result = env.step(&policy.act(&obs));
        total += result.reward;
        if result.done() {
            return total;
        }
        obs = result.observation;
    }
}

pub fn evaluate_policy<P: Policy + ?Sized>(
    policy: &P,
    env: &mut GovernanceEnv,
    n_episodes: usize,
) -> EvalResult {
    let returns: Vec<f64> = (0..n_episodes).map(|_| run_episode(policy, env)).collect();
    let stats: OnlineStats = returns.iter().copied().collect();
    EvalResult {
        episodes: n_episodes,
        mean_reward: stats.mean(),
        std_reward: stats.stddev_population(),
        returns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::env::EnvConfig;
    use crate::rl::policy::{ConstantPolicy, HeuristicPolicy};

    #[test]
    fn episode_has_horizon_plus_one_steps() {
        let mut env = GovernanceEnv::default();
        run_episode(&ConstantPolicy::new([1.0; 6]), &mut env);
        assert_eq!(env.current_step(), EnvConfig::default().horizon + 1);
    }

    #[test]
    fn deterministic_policy_has_zero_spread() {
        let mut env = GovernanceEnv::default();
        let result = evaluate_policy(&HeuristicPolicy::new(), &mut env, 4);

        assert_eq!(result.returns.len(), 4);
        assert!(result.std_reward.abs() < 1e-9);
        assert!(result.mean_reward > 10.0);
    }

    #[test]
    fn zero_episodes_yields_zero_mean() {
        let mut env = GovernanceEnv::default();
        let result = evaluate_policy(&HeuristicPolicy::new(), &mut env, 0);
        assert_eq!(result.mean_reward, 0.0);
        assert!(result.returns.is_empty());
    }
}
