// src/types.rs
//
// Core value types shared by the environment, cache, learner and service.
//
// - Snapshot: one observed chain state (six non-negative scalars)
// - ActionVector: six governance parameters, only ever built by clipping
// - RawAction: unclipped policy output
//
// Every clipping adjustment leaves a reason string.

use serde::{Deserialize, Serialize};

/// Number of snapshot fields (observation dimension).
pub const OBS_DIM: usize = 6;

/// Number of governance parameters (action dimension).
pub const ACTION_DIM: usize = 6;

/// Unclipped policy output in action order.
pub type RawAction = [f64; ACTION_DIM];

/// Observation range upper bounds, in snapshot field order.
/// The lower bound is 0 for every field.
pub const OBS_HIGH: [f64; OBS_DIM] = [1e9, 1e9, 1e8, 1e6, 1e9, 1e6];

/// Cache/CSV header, matching the request field names.
pub const SNAPSHOT_HEADER: [&str; OBS_DIM] = [
    "total_supply",
    "circ_supply",
    "balance",
    "votes",
    "height",
    "tx_volume",
];

/// One recorded observation of chain-state quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub total_supply: f64,
    pub circulating_supply: f64,
    pub delegate_balance: f64,
    pub votes_per_period: f64,
    pub block_height: f64,
    pub tx_volume: f64,
}

impl Snapshot {
    /// Fixed initial chain state used by `GovernanceEnv::reset`.
    pub const INITIAL: Snapshot = Snapshot {
        total_supply: 5e8,
        circulating_supply: 5e8,
        delegate_balance: 5e7,
        votes_per_period: 5e5,
        block_height: 0.0,
        tx_volume: 5e5,
    };

    pub fn from_array(v: [f64; OBS_DIM]) -> Self {
        Self {
            total_supply: v[0],
            circulating_supply: v[1],
            delegate_balance: v[2],
            votes_per_period: v[3],
            block_height: v[4],
            tx_volume: v[5],
        }
    }

    pub fn to_array(&self) -> [f64; OBS_DIM] {
        [
            self.total_supply,
            self.circulating_supply,
            self.delegate_balance,
            self.votes_per_period,
            self.block_height,
            self.tx_volume,
        ]
    }

    /// True when every field is finite. Non-finite rows never reach training.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// True when every field lies inside the documented observation range.
    pub fn within_observation_bounds(&self) -> bool {
        self.to_array()
            .iter()
            .zip(OBS_HIGH.iter())
            .all(|(v, hi)| *v >= 0.0 && *v <= *hi)
    }

    /// Parse one CSV row. Returns None on wrong arity or unparseable cells;
    /// "nan"/"inf" parse fine and are filtered later by `is_finite`.
    pub fn from_csv_row(line: &str) -> Option<Self> {
        let mut out = [0.0; OBS_DIM];
        let mut n = 0;
        for cell in line.trim().split(',') {
            if n == OBS_DIM {
                return None;
            }
            out[n] = cell.trim().parse::<f64>().ok()?;
            n += 1;
        }
        (n == OBS_DIM).then(|| Self::from_array(out))
    }

    pub fn to_csv_row(&self) -> String {
        self.to_array()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Declared range of one governance parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBounds {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    /// Integer-natured parameters are truncated after clamping.
    pub integer: bool,
}

/// Action ranges in action order.
pub const ACTION_BOUNDS: [ParamBounds; ACTION_DIM] = [
    ParamBounds {
        name: "num_delegates",
        min: 1.0,
        max: 100_000.0,
        integer: true,
    },
    ParamBounds {
        name: "delegate_window",
        min: 1.0,
        max: 1000.0,
        integer: true,
    },
    ParamBounds {
        name: "voting_period",
        min: 60.0,
        max: 31_536_000.0,
        integer: true,
    },
    ParamBounds {
        name: "decay_factor",
        min: 0.0,
        max: 1.0,
        integer: false,
    },
    ParamBounds {
        name: "min_balance",
        min: 1.0,
        max: 3600.0,
        integer: false,
    },
    ParamBounds {
        name: "block_creation_period",
        min: 1.0,
        max: 1_000_000.0,
        integer: true,
    },
];

impl ParamBounds {
    /// Clip one raw value. Returns the applied value and an optional reason.
    pub fn clip(&self, raw: f64) -> (f64, Option<String>) {
        if raw.is_nan() || raw == f64::NEG_INFINITY {
            return (self.min, Some(format!("{}_nan_or_inf", self.name)));
        }
        if raw == f64::INFINITY {
            return (self.max, Some(format!("{}_nan_or_inf", self.name)));
        }
        let clamped = raw.clamp(self.min, self.max);
        let applied = if self.integer {
            clamped.trunc()
        } else {
            clamped
        };
        let reason = ((raw - clamped).abs() > 1e-12).then(|| format!("{}_clamped", self.name));
        (applied, reason)
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max && (!self.integer || v.fract() == 0.0)
    }

    /// Map a value in [-1, 1] onto this range (no clipping of the result).
    pub fn denormalize(&self, unit: f64) -> f64 {
        let mid = 0.5 * (self.min + self.max);
        let half = 0.5 * (self.max - self.min);
        mid + unit * half
    }

    /// Map a value in this range onto [-1, 1].
    pub fn normalize(&self, v: f64) -> f64 {
        let half = 0.5 * (self.max - self.min);
        if half <= 0.0 {
            return 0.0;
        }
        let mid = 0.5 * (self.min + self.max);
        ((v - mid) / half).clamp(-1.0, 1.0)
    }
}

/// Governance parameters after clipping and type coercion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionVector {
    pub num_delegates: u32,
    pub delegate_window: u32,
    pub voting_period: u32,
    pub decay_factor: f64,
    pub min_balance: f64,
    pub block_creation_period: u32,
}

/// Result of clipping a raw action.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipResult {
    pub raw: RawAction,
    pub applied: ActionVector,
    pub reasons: Vec<String>,
}

impl ActionVector {
    /// Clip a raw action into the declared ranges. Never fails.
    pub fn clip(raw: &RawAction) -> ClipResult {
        let mut applied = [0.0; ACTION_DIM];
        let mut reasons = Vec::new();
        for (i, bounds) in ACTION_BOUNDS.iter().enumerate() {
            let (v, reason) = bounds.clip(raw[i]);
            applied[i] = v;
            reasons.extend(reason);
        }
        ClipResult {
            raw: *raw,
            applied: Self::from_clipped(&applied),
            reasons,
        }
    }

    /// Convenience wrapper when the reasons are not needed.
    pub fn from_raw(raw: &RawAction) -> Self {
        Self::clip(raw).applied
    }

    fn from_clipped(v: &[f64; ACTION_DIM]) -> Self {
        Self {
            num_delegates: v[0] as u32,
            delegate_window: v[1] as u32,
            voting_period: v[2] as u32,
            decay_factor: v[3],
            min_balance: v[4],
            block_creation_period: v[5] as u32,
        }
    }

    /// Fixed response order: num_delegates, delegate_window, voting_period,
    /// decay_factor, min_balance, block_creation_period.
    pub fn to_array(&self) -> [f64; ACTION_DIM] {
        [
            self.num_delegates as f64,
            self.delegate_window as f64,
            self.voting_period as f64,
            self.decay_factor,
            self.min_balance,
            self.block_creation_period as f64,
        ]
    }

    pub fn is_within_bounds(&self) -> bool {
        self.to_array()
            .iter()
            .zip(ACTION_BOUNDS.iter())
            .all(|(v, b)| b.contains(*v))
    }
}
