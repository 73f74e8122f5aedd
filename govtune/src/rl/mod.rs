// src/rl/mod.rs
//
// Learning stack for governance-parameter tuning.
//
// Key components:
// - GovernanceEnv: Gym-style environment scoring parameters against a snapshot
// - Reward: six-factor relative-error reward
// - Policy / TrainablePolicy: decision and learning interfaces
// - LinearGaussianPolicy: the learned actor/critic
// - Search: seeded hyperparameter search over learner configurations
// - TrainingController: one retrain pass from cached rows to an outcome

pub mod agent;
pub mod env;
pub mod evaluation;
pub mod policy;
pub mod reward;
pub mod search;
pub mod trainer;

pub use agent::{EntCoef, LearnerConfig, LinearGaussianPolicy, LINEAR_POLICY_VERSION};
pub use env::{EnvConfig, EnvironmentState, GovernanceEnv, StepInfo, StepResult, DEFAULT_HORIZON};
pub use evaluation::{evaluate_policy, run_episode, EvalResult};
pub use policy::{
    ConstantPolicy, FitSummary, HeuristicPolicy, Policy, TrainablePolicy,
    CONSTANT_POLICY_VERSION, HEURISTIC_POLICY_VERSION,
};
pub use reward::{IdealTargets, RewardComponents, RewardWeights};
pub use search::{
    run_search, CompletedTrial, ParameterDomain, ParameterValue, RandomSearch, SearchSpace, Trial,
    TrialSearch, TrialStatus,
};
pub use trainer::{
    linear_policy_factory, PolicyFactory, RetrainOutcome, RetrainReport, TrainingController,
};
