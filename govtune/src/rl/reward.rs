// src/rl/reward.rs
//
// Six-factor governance reward.
//
// Each factor compares an applied parameter against an ideal target derived
// from the current chain snapshot, producing a bounded relative-error score
// in [-1, 1]. The scalar reward is a convex combination of the six scores.
//
//   r = 0.20 * delegates + 0.15 * window + 0.15 * voting
//     + 0.15 * decay     + 0.20 * balance + 0.15 * block

use serde::{Deserialize, Serialize};

use crate::types::{ActionVector, Snapshot};

/// Lower clip for every sub-score. The upper bound is 1 by construction.
pub const SUB_SCORE_FLOOR: f64 = -1.0;

const SECONDS_PER_WEEK: f64 = 7.0 * 86_400.0;
const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// Ideal parameter targets for a snapshot.
///
/// `min_balance` depends on the applied delegate count, so targets are
/// computed against a concrete action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdealTargets {
    pub num_delegates: f64,
    pub delegate_window: f64,
    pub voting_period: f64,
    pub decay_factor: f64,
    pub min_balance: f64,
    pub block_creation_period: f64,
}

impl IdealTargets {
    pub fn compute(s: &Snapshot, action: &ActionVector) -> Self {
        let num_delegates = s.circulating_supply / 1e6 + s.votes_per_period / 100.0;

        // Wider windows become tolerable as vote activity and chain depth grow.
        let delegate_window = s.votes_per_period / 200.0 + s.block_height.max(0.0).ln_1p();

        // Shorter voting periods as participation grows.
        let voting_period = SECONDS_PER_WEEK
            / (1.0 + s.votes_per_period / 100.0 + action.block_creation_period as f64 / 1e6);

        // Less decay once the active delegate holds ~5% of supply.
        let decay_factor = 1.0 - (s.delegate_balance / (0.05 * s.total_supply + 1e-8)).min(1.0);

        // num_delegates >= 1 after clipping.
        let min_balance =
            (s.circulating_supply / action.num_delegates as f64 + s.delegate_balance) / 2.0;

        let block_creation_period = (SECONDS_PER_YEAR / (s.tx_volume / 1000.0 + 1.0)).max(1.0);

        Self {
            num_delegates,
            delegate_window,
            voting_period,
            decay_factor,
            min_balance,
            block_creation_period,
        }
    }
}

/// Per-factor scores for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    pub delegate_score: f64,
    pub window_score: f64,
    pub voting_score: f64,
    pub decay_score: f64,
    pub balance_score: f64,
    pub block_score: f64,
}

/// `1 - |actual - ideal| / (ideal + eps)`, clipped to [SUB_SCORE_FLOOR, 1].
pub fn relative_score(actual: f64, ideal: f64, eps: f64) -> f64 {
    let denom = ideal.abs() + eps;
    let raw = 1.0 - (actual - ideal).abs() / denom;
    if raw.is_finite() {
        raw.clamp(SUB_SCORE_FLOOR, 1.0)
    } else {
        SUB_SCORE_FLOOR
    }
}

impl RewardComponents {
    pub fn from_state(s: &Snapshot, action: &ActionVector) -> Self {
        let ideal = IdealTargets::compute(s, action);

        let decay_raw = 1.0 - (action.decay_factor - ideal.decay_factor).abs();
        let decay_score = if decay_raw.is_finite() {
            decay_raw.clamp(SUB_SCORE_FLOOR, 1.0)
        } else {
            SUB_SCORE_FLOOR
        };

        Self {
            delegate_score: relative_score(action.num_delegates as f64, ideal.num_delegates, 1.0),
            window_score: relative_score(
                action.delegate_window as f64,
                ideal.delegate_window,
                1.0,
            ),
            voting_score: relative_score(action.voting_period as f64, ideal.voting_period, 1.0),
            decay_score,
            balance_score: relative_score(action.min_balance, ideal.min_balance, 1e-8),
            block_score: relative_score(
                action.block_creation_period as f64,
                ideal.block_creation_period,
                1.0,
            ),
        }
    }

    pub fn as_array(&self) -> [f64; 6] {
        [
            self.delegate_score,
            self.window_score,
            self.voting_score,
            self.decay_score,
            self.balance_score,
            self.block_score,
        ]
    }

    /// Weighted scalar reward.
    pub fn compute_reward(&self, weights: &RewardWeights) -> f64 {
        self.as_array()
            .iter()
            .zip(weights.as_array().iter())
            .map(|(s, w)| s * w)
            .sum()
    }
}

/// Convex weighting of the six factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub delegates: f64,
    pub window: f64,
    pub voting: f64,
    pub decay: f64,
    pub balance: f64,
    pub block: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            delegates: 0.20,
            window: 0.15,
            voting: 0.15,
            decay: 0.15,
            balance: 0.20,
            block: 0.15,
        }
    }
}

impl RewardWeights {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.delegates,
            self.window,
            self.voting,
            self.decay,
            self.balance,
            self.block,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}
