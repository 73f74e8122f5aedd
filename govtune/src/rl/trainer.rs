// src/rl/trainer.rs
//
// Retrain pass: warm start -> baseline save -> search -> optimized fit ->
// optimized save -> evaluation -> accept/reject.
//
// The controller never fails: artifact I/O problems are logged and the pass
// continues, a search where every trial failed falls back to the baseline
// configuration, and non-finite evaluation results reject.

use serde::Serialize;

use crate::artifacts::{ModelStore, BASELINE_MODEL, OPTIMIZED_MODEL};
use crate::cache::TrainingBatch;
use crate::config::Config;
use crate::logging::{NoopSink, RetrainEvent, RetrainSink};
use crate::types::ActionVector;

use super::agent::{LearnerConfig, LinearGaussianPolicy};
use super::env::GovernanceEnv;
use super::evaluation::{evaluate_policy, EvalResult};
use super::policy::{FitSummary, TrainablePolicy};
use super::search::{run_search, CompletedTrial, RandomSearch, SearchSpace, TrialSearch};

/// Builds a model for a learner configuration.
pub type PolicyFactory = Box<dyn Fn(&LearnerConfig) -> Box<dyn TrainablePolicy> + Send>;

/// Factory for the linear Gaussian learner.
pub fn linear_policy_factory() -> PolicyFactory {
    Box::new(|cfg: &LearnerConfig| -> Box<dyn TrainablePolicy> {
        Box::new(LinearGaussianPolicy::new(cfg.clone()))
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrainOutcome {
    Rejected {
        mean_reward: f64,
        std_reward: f64,
    },
    Accepted {
        action: ActionVector,
        mean_reward: f64,
        std_reward: f64,
    },
}

impl RetrainOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RetrainOutcome::Rejected { .. } => "rejected",
            RetrainOutcome::Accepted { .. } => "accepted",
        }
    }

    pub fn mean_reward(&self) -> f64 {
        match self {
            RetrainOutcome::Rejected { mean_reward, .. }
            | RetrainOutcome::Accepted { mean_reward, .. } => *mean_reward,
        }
    }

    /// Six numbers in action order when accepted, empty otherwise.
    pub fn prediction(&self) -> Vec<f64> {
        match self {
            RetrainOutcome::Rejected { .. } => Vec::new(),
            RetrainOutcome::Accepted { action, .. } => action.to_array().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrainReport {
    pub outcome: RetrainOutcome,
    pub valid_rows: usize,
    pub dropped_rows: usize,
    pub warm_start: FitSummary,
    pub best_trial: Option<CompletedTrial>,
    pub learner_config: LearnerConfig,
    pub optimized_fit: FitSummary,
    pub evaluation: EvalResult,
}

pub struct TrainingController {
    config: Config,
    factory: PolicyFactory,
    store: Option<ModelStore>,
    sink: Box<dyn RetrainSink>,
    passes: u64,
}

impl TrainingController {
    pub fn new(config: Config, factory: PolicyFactory) -> Self {
        let store = config.model_dir.clone().map(ModelStore::new);
        Self {
            config,
            factory,
            store,
            sink: Box::new(NoopSink),
            passes: 0,
        }
    }

    /// Controller training the linear Gaussian learner.
    pub fn with_linear_policy(config: Config) -> Self {
        Self::new(config, linear_policy_factory())
    }

    pub fn with_sink(mut self, sink: Box<dyn RetrainSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn baseline_config(&self) -> LearnerConfig {
        LearnerConfig {
            seed: self.config.seed,
            ..LearnerConfig::default()
        }
    }

    fn fresh_env(&self) -> GovernanceEnv {
        let mut env = GovernanceEnv::new(self.config.env.clone());
        env.reset();
        env
    }

    fn save(&self, name: &str, model: &dyn TrainablePolicy) {
        let Some(store) = &self.store else {
            return;
        };
        let res = model
            .to_artifact()
            .and_then(|blob| store.save(name, &blob));
        match res {
            Ok(m) => eprintln!(
                "govtune | artifact saved | name={} bytes={} sha256={}",
                m.name, m.bytes, m.sha256
            ),
            Err(e) => eprintln!("govtune | WARN artifact save failed | name={name} err={e:#}"),
        }
    }

    /// Run one full retrain pass over an already validated batch.
    pub fn retrain(&mut self, batch: &TrainingBatch) -> RetrainReport {
        let valid = &batch.rows;
        let dropped = batch.dropped;
        let budget = self.config.budget;

        self.passes += 1;
        eprintln!(
            "govtune | retrain started | pass={} rows={} valid={} dropped={} profile={}",
            self.passes,
            batch.total(),
            valid.len(),
            dropped,
            self.config.profile.as_str()
        );
        self.sink.emit(&RetrainEvent::RetrainStarted {
            rows: batch.total(),
            valid_rows: valid.len(),
            dropped_rows: dropped,
        });

        // Warm start: each row replaces the snapshot, the step counter carries on.
        let baseline_cfg = self.baseline_config();
        let mut env = self.fresh_env();
        let mut baseline = (self.factory)(&baseline_cfg);
        let mut warm = FitSummary::default();
        let mut warm_reward = 0.0;
        for row in valid {
            env.load_snapshot(*row);
            let s = baseline.fit(&mut env, budget.warm_start_steps);
            warm.steps += s.steps;
            warm.episodes_completed += s.episodes_completed;
            warm.updates += s.updates;
            warm_reward += s.mean_step_reward * s.steps as f64;
        }
        if warm.steps > 0 {
            warm.mean_step_reward = warm_reward / warm.steps as f64;
        }
        self.sink.emit(&RetrainEvent::WarmStartCompleted {
            rows: valid.len(),
            steps: warm.steps,
            mean_step_reward: warm.mean_step_reward,
        });
        self.save(BASELINE_MODEL, baseline.as_ref());

        let best_trial = self.search(&baseline_cfg);
        let learner_config = match &best_trial {
            Some(best) => LearnerConfig::from_params(&best.trial.params, &baseline_cfg)
                .unwrap_or_else(|e| {
                    eprintln!("govtune | WARN best trial unusable | err={e:#}");
                    baseline_cfg.clone()
                }),
            None => {
                eprintln!("govtune | WARN every search trial failed; using baseline config");
                baseline_cfg.clone()
            }
        };

        let mut env = self.fresh_env();
        let mut model = (self.factory)(&learner_config);
        let optimized_fit = model.fit(&mut env, budget.optimized_steps);
        self.save(OPTIMIZED_MODEL, model.as_ref());

        let mut eval_env = self.fresh_env();
        let evaluation = evaluate_policy(model.as_ref(), &mut eval_env, budget.eval_episodes);
        eprintln!(
            "govtune | evaluated | episodes={} mean_reward={:.4} std_reward={:.4}",
            evaluation.episodes, evaluation.mean_reward, evaluation.std_reward
        );
        self.sink.emit(&RetrainEvent::Evaluated {
            episodes: evaluation.episodes,
            mean_reward: evaluation.mean_reward,
            std_reward: evaluation.std_reward,
        });

        let competent = evaluation.mean_reward.is_finite()
            && evaluation.mean_reward >= self.config.acceptance_threshold;
        let outcome = if competent {
            let target = valid.last().copied().unwrap_or(self.config.env.initial);
            RetrainOutcome::Accepted {
                action: ActionVector::from_raw(&model.act(&target)),
                mean_reward: evaluation.mean_reward,
                std_reward: evaluation.std_reward,
            }
        } else {
            RetrainOutcome::Rejected {
                mean_reward: evaluation.mean_reward,
                std_reward: evaluation.std_reward,
            }
        };

        eprintln!(
            "govtune | retrain finished | pass={} status={} mean_reward={:.4} threshold={}",
            self.passes,
            outcome.status(),
            outcome.mean_reward(),
            self.config.acceptance_threshold
        );
        self.sink.emit(&RetrainEvent::RetrainFinished {
            status: outcome.status(),
            mean_reward: outcome.mean_reward(),
            action: match &outcome {
                RetrainOutcome::Accepted { action, .. } => Some(*action),
                RetrainOutcome::Rejected { .. } => None,
            },
        });

        RetrainReport {
            outcome,
            valid_rows: valid.len(),
            dropped_rows: dropped,
            warm_start: warm,
            best_trial,
            learner_config,
            optimized_fit,
            evaluation,
        }
    }

    fn search(&mut self, base: &LearnerConfig) -> Option<CompletedTrial> {
        let budget = self.config.budget;
        let env_config = self.config.env.clone();
        let factory = &self.factory;
        let sink = &mut self.sink;

        let mut sampler = RandomSearch::new(
            SearchSpace::default_space(),
            self.config.seed.wrapping_add(self.passes),
        );

        let best = run_search(&mut sampler, self.config.search_trials, |trial| {
            let score = match LearnerConfig::from_params(&trial.params, base) {
                Ok(cfg) => {
                    let mut env = GovernanceEnv::new(env_config.clone());
                    env.reset();
                    let mut model = factory(&cfg);
                    model.fit(&mut env, budget.trial_train_steps);
                    evaluate_policy(model.as_ref(), &mut env, budget.trial_eval_episodes)
                        .mean_reward
                }
                Err(e) => {
                    eprintln!("govtune | WARN trial {} invalid | err={e:#}", trial.id);
                    f64::NAN
                }
            };
            sink.emit(&RetrainEvent::TrialCompleted {
                trial: trial.id,
                score: score.is_finite().then_some(score),
                params: trial.params_json(),
            });
            score
        });

        if let Some(b) = &best {
            eprintln!(
                "govtune | search finished | trials={} best_trial={} best_score={:.4}",
                sampler.history().len(),
                b.trial.id,
                b.score.unwrap_or(f64::NAN)
            );
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::rl::policy::{ConstantPolicy, HeuristicPolicy, Policy};
    use crate::types::Snapshot;
    use std::sync::{Arc, Mutex};

    fn quick_config() -> Config {
        let mut cfg = Config::default();
        cfg.budget.warm_start_steps = 20;
        cfg.budget.optimized_steps = 20;
        cfg.budget.eval_episodes = 2;
        cfg.budget.trial_train_steps = 10;
        cfg.budget.trial_eval_episodes = 1;
        cfg.search_trials = 3;
        cfg.cache_path = None;
        cfg.model_dir = None;
        cfg
    }

    fn heuristic_factory() -> PolicyFactory {
        Box::new(|_: &LearnerConfig| -> Box<dyn TrainablePolicy> {
            Box::new(HeuristicPolicy::new())
        })
    }

    /// Sink that can be inspected after being moved into the controller.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<MemorySink>>);

    impl RetrainSink for SharedSink {
        fn emit(&mut self, event: &RetrainEvent) {
            self.0.lock().unwrap().emit(event);
        }
    }

    #[test]
    fn events_follow_pass_order() {
        let sink = SharedSink::default();
        let mut controller = TrainingController::new(quick_config(), heuristic_factory())
            .with_sink(Box::new(sink.clone()));

        controller.retrain(&TrainingBatch::from_rows(&[Snapshot::INITIAL]));

        let events = sink.0.lock().unwrap().events.clone();
        assert_eq!(events.len(), 1 + 1 + 3 + 1 + 1);
        assert!(matches!(events[0], RetrainEvent::RetrainStarted { .. }));
        assert!(matches!(events[1], RetrainEvent::WarmStartCompleted { steps: 20, .. }));
        assert!(matches!(events[2], RetrainEvent::TrialCompleted { trial: 0, .. }));
        assert!(matches!(events[6], RetrainEvent::RetrainFinished { status: "accepted", .. }));
    }

    #[test]
    fn constant_policy_is_rejected() {
        let factory: PolicyFactory = Box::new(|_: &LearnerConfig| -> Box<dyn TrainablePolicy> {
            Box::new(ConstantPolicy::new([50_000.0, 500.0, 1e6, 0.5, 1800.0, 500_000.0]))
        });
        let mut controller = TrainingController::new(quick_config(), factory);
        let report = controller.retrain(&TrainingBatch::from_rows(&[Snapshot::INITIAL; 3]));

        assert_eq!(report.outcome.status(), "rejected");
        assert!(report.outcome.prediction().is_empty());
        assert!(report.evaluation.mean_reward < 10.0);
    }

    #[test]
    fn no_valid_rows_predicts_for_initial_snapshot() {
        let mut controller = TrainingController::new(quick_config(), heuristic_factory());
        let nan = Snapshot::from_array([f64::NAN; 6]);
        let report = controller.retrain(&TrainingBatch::from_rows(&[nan, nan]));

        assert_eq!(report.valid_rows, 0);
        assert_eq!(report.dropped_rows, 2);
        assert_eq!(report.warm_start.steps, 0);

        let expected = ActionVector::from_raw(&HeuristicPolicy::new().act(&Snapshot::INITIAL));
        match report.outcome {
            RetrainOutcome::Accepted { action, .. } => assert_eq!(action, expected),
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn empty_search_falls_back_to_baseline_config() {
        let mut cfg = quick_config();
        cfg.search_trials = 0;
        cfg.seed = 5;
        let mut controller = TrainingController::new(cfg, heuristic_factory());
        let report = controller.retrain(&TrainingBatch::from_rows(&[Snapshot::INITIAL]));

        assert!(report.best_trial.is_none());
        assert_eq!(
            report.learner_config,
            LearnerConfig {
                seed: 5,
                ..LearnerConfig::default()
            }
        );
        assert_eq!(report.outcome.status(), "accepted");
    }

    #[test]
    fn artifacts_written_when_store_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = quick_config();
        cfg.model_dir = Some(dir.path().to_path_buf());
        let mut controller = TrainingController::new(cfg, heuristic_factory());
        controller.retrain(&TrainingBatch::from_rows(&[Snapshot::INITIAL]));

        let store = ModelStore::new(dir.path());
        assert!(store.load(BASELINE_MODEL).is_ok());
        assert!(store.load(OPTIMIZED_MODEL).is_ok());
    }
}
