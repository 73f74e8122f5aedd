// src/rl/env.rs
//
// Gym-style governance environment.
//
// - reset() -> (observation, info)
// - step(raw action) -> (observation, reward, terminated, truncated, info)
//
// The chain snapshot is not advanced by any dynamics: a step scores the
// applied parameters against the current snapshot and only the step counter
// moves. Warm-start training swaps the snapshot in via `load_snapshot`.

use serde::{Deserialize, Serialize};

use crate::types::{ActionVector, RawAction, Snapshot};

use super::reward::{RewardComponents, RewardWeights};

/// Fixed episode horizon.
pub const DEFAULT_HORIZON: u64 = 100;

/// Configuration for the governance environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Step counter value at which a step reports `terminated`.
    pub horizon: u64,
    /// Snapshot restored by `reset`.
    pub initial: Snapshot,
    /// Reward factor weights.
    pub reward_weights: RewardWeights,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            initial: Snapshot::INITIAL,
            reward_weights: RewardWeights::default(),
        }
    }
}

/// Complete mutable environment state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub snapshot: Snapshot,
    pub current_step: u64,
}

/// Info returned from `reset`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Number of resets so far on this instance (1 after the first reset).
    pub episode: u64,
}

/// Additional information about a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Step counter after this step.
    pub step: u64,
    /// Parameters actually applied after clipping.
    pub applied: ActionVector,
    /// Clip reasons (empty when the raw action was already in range).
    pub clip_reasons: Vec<String>,
    /// Per-factor scores.
    pub reward_components: RewardComponents,
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// The (unchanged) snapshot.
    pub observation: Snapshot,
    pub reward: f64,
    pub terminated: bool,
    /// Always false: the horizon is the only end condition.
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Deterministic governance environment.
#[derive(Debug, Clone)]
pub struct GovernanceEnv {
    config: EnvConfig,
    state: EnvironmentState,
    episodes: u64,
    last_applied: Option<ActionVector>,
}

impl Default for GovernanceEnv {
    fn default() -> Self {
        Self::new(EnvConfig::default())
    }
}

impl GovernanceEnv {
    pub fn new(config: EnvConfig) -> Self {
        let state = EnvironmentState {
            snapshot: config.initial,
            current_step: 0,
        };
        Self {
            config,
            state,
            episodes: 0,
            last_applied: None,
        }
    }

    /// Restore the fixed initial snapshot and zero the step counter.
    pub fn reset(&mut self) -> (Snapshot, ResetInfo) {
        self.state = EnvironmentState {
            snapshot: self.config.initial,
            current_step: 0,
        };
        self.episodes += 1;
        self.last_applied = None;
        (
            self.state.snapshot,
            ResetInfo {
                episode: self.episodes,
            },
        )
    }

    /// Score a raw action against the current snapshot.
    pub fn step(&mut self, raw: &RawAction) -> StepResult {
        let clip = ActionVector::clip(raw);
        let snapshot = self.state.snapshot;

        let components = RewardComponents::from_state(&snapshot, &clip.applied);
        let reward = components.compute_reward(&self.config.reward_weights);

        let terminated = self.state.current_step >= self.config.horizon;

        self.state.current_step += 1;
        self.last_applied = Some(clip.applied);

        StepResult {
            observation: snapshot,
            reward,
            terminated,
            truncated: false,
            info: StepInfo {
                step: self.state.current_step,
                applied: clip.applied,
                clip_reasons: clip.reasons,
                reward_components: components,
            },
        }
    }

    /// Overwrite the snapshot fields, leaving the step counter alone.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        self.state.snapshot = snapshot;
    }

    pub fn observation(&self) -> Snapshot {
        self.state.snapshot
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn current_step(&self) -> u64 {
        self.state.current_step
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// One diagnostic line describing the last applied parameters.
    pub fn render(&self) -> String {
        match &self.last_applied {
            Some(a) => format!(
                "step={} voting_period={} num_delegates={} delegate_window={} tx_volume={}",
                self.state.current_step,
                a.voting_period,
                a.num_delegates,
                a.delegate_window,
                self.state.snapshot.tx_volume
            ),
            None => format!(
                "step={} (no action applied) tx_volume={}",
                self.state.current_step, self.state.snapshot.tx_volume
            ),
        }
    }

    pub fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_returns_initial_state() {
        let mut env = GovernanceEnv::default();
        let (obs, info) = env.reset();

        assert_eq!(obs, Snapshot::INITIAL);
        assert_eq!(env.current_step(), 0);
        assert_eq!(info.episode, 1);
    }

    #[test]
    fn test_step_does_not_move_snapshot() {
        let mut env = GovernanceEnv::default();
        env.reset();

        let result = env.step(&[10.0, 10.0, 100.0, 0.5, 10.0, 100.0]);

        assert_eq!(result.observation, Snapshot::INITIAL);
        assert_eq!(env.observation(), Snapshot::INITIAL);
        assert_eq!(result.info.step, 1);
        assert!(!result.terminated);
        assert!(!result.truncated);
    }

    #[test]
    fn test_load_snapshot_keeps_step_counter() {
        let mut env = GovernanceEnv::default();
        env.reset();
        for _ in 0..5 {
            env.step(&[1.0; 6]);
        }

        let row = Snapshot::from_array([1e8, 9e7, 1e6, 1000.0, 12.0, 300.0]);
        env.load_snapshot(row);

        assert_eq!(env.current_step(), 5);
        assert_eq!(env.observation(), row);
        assert_eq!(env.step(&[1.0; 6]).observation, row);
    }

    #[test]
    fn test_render_mentions_step() {
        let mut env = GovernanceEnv::default();
        env.reset();
        assert!(env.render().contains("no action applied"));
        env.step(&[7.0, 1.0, 60.0, 0.0, 1.0, 1.0]);
        assert!(env.render().contains("num_delegates=7"));
        env.close();
    }
}
