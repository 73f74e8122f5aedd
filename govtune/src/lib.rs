//! govtune core library.
//!
//! Tunes six DPoS governance parameters (delegate count, delegate window,
//! voting period, decay factor, minimum balance, block creation period) from
//! observed chain snapshots. The binaries are thin harnesses around these
//! components.
//!
//! # Flow
//!
//! - **Service** (`service`): every prediction request appends one snapshot
//!   to the sample cache. Below the batch threshold the answer is `pending`.
//! - **Cache** (`cache`): append-only rows with an optional CSV mirror,
//!   cleared after each retrain pass.
//! - **Controller** (`rl::trainer`): warm start on the cached rows,
//!   hyperparameter search, optimized fit, evaluation and accept/reject.
//! - **Environment** (`rl::env`): Gym-style reset/step with a six-factor
//!   reward scoring parameters against the snapshot.
//!
//! # Ambient stack
//!
//! - `config`: profile presets plus `GOVTUNE_*` env overrides
//! - `logging`: JSONL retrain telemetry sinks
//! - `metrics`: online statistics
//! - `ops`: Prometheus metrics and the HTTP front end
//! - `artifacts`: model blobs with SHA-256 manifests

pub mod artifacts;
pub mod cache;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod ops;
pub mod rl;
pub mod service;
pub mod types;

pub use artifacts::{ArtifactManifest, ModelStore, BASELINE_MODEL, OPTIMIZED_MODEL};
pub use cache::{AppendOutcome, SampleCache, TrainingBatch};
pub use config::{
    resolve_effective_profile, Config, EffectiveProfile, ProfileSource, TrainingBudget,
    TrainingProfile,
};
pub use logging::{JsonlSink, MemorySink, NoopSink, RetrainEvent, RetrainSink};
pub use metrics::{OnlineStats, StatsSummary};
pub use ops::ServiceMetrics;
pub use service::{PredictionOutcome, PredictionRequest, PredictionResponse, PredictionService};
pub use types::{ActionVector, ClipResult, ParamBounds, RawAction, Snapshot, ACTION_BOUNDS};
