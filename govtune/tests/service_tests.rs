// tests/service_tests.rs
//
// End-to-end behaviour of the prediction service:
// - 31 appends stay pending, the 32nd triggers a retrain
// - forced rejection / acceptance via stub policies
// - the cache is cleared (memory and file) after every retrain pass
// - malformed rows never reach training

use std::fs;
use std::sync::Arc;
use std::thread;

use govtune::rl::{
    ConstantPolicy, HeuristicPolicy, LearnerConfig, Policy, PolicyFactory, TrainablePolicy,
    TrainingController,
};
use govtune::{
    ActionVector, Config, PredictionOutcome, PredictionRequest, PredictionService, SampleCache,
    Snapshot,
};

fn quick_config() -> Config {
    let mut cfg = Config::default();
    cfg.budget.warm_start_steps = 5;
    cfg.budget.optimized_steps = 10;
    cfg.budget.eval_episodes = 2;
    cfg.budget.trial_train_steps = 5;
    cfg.budget.trial_eval_episodes = 1;
    cfg.search_trials = 2;
    cfg.cache_path = None;
    cfg.model_dir = None;
    cfg
}

fn heuristic_factory() -> PolicyFactory {
    Box::new(|_: &LearnerConfig| -> Box<dyn TrainablePolicy> { Box::new(HeuristicPolicy::new()) })
}

fn constant_factory() -> PolicyFactory {
    Box::new(|_: &LearnerConfig| -> Box<dyn TrainablePolicy> {
        Box::new(ConstantPolicy::new([
            50_000.0, 500.0, 1_000_000.0, 0.5, 1800.0, 500_000.0,
        ]))
    })
}

fn service(cfg: Config, factory: PolicyFactory) -> PredictionService {
    let cache = SampleCache::open(cfg.cache_path.clone(), cfg.batch_threshold).unwrap();
    PredictionService::new(cache, TrainingController::new(cfg, factory))
}

fn row(i: usize) -> PredictionRequest {
    PredictionRequest {
        total_supply: 5e8,
        circ_supply: 4e8 + i as f64,
        balance: 5e7,
        votes: 5e5,
        height: i as f64,
        tx_volume: 5e5,
    }
}

#[test]
fn test_31_pending_then_32nd_retrains() {
    let svc = service(quick_config(), heuristic_factory());

    for i in 0..31 {
        let out = svc.predict(row(i));
        assert_eq!(out, PredictionOutcome::Pending, "request {i}");
        assert!(out.prediction().is_empty());
    }
    assert_eq!(svc.cached_rows(), 31);
    assert_eq!(svc.metrics().retrains(), 0);

    let out = svc.predict(row(31));
    assert_ne!(out, PredictionOutcome::Pending);
    assert_eq!(svc.metrics().retrains(), 1);
    assert_eq!(svc.cached_rows(), 0);
    assert_eq!(svc.last_report().unwrap().valid_rows, 32);
}

#[test]
fn test_forced_rejection_clears_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_cache.csv");
    let mut cfg = quick_config();
    cfg.cache_path = Some(path.clone());
    let svc = service(cfg, constant_factory());

    let mut last = PredictionOutcome::Pending;
    for i in 0..32 {
        last = svc.predict(row(i));
    }

    assert_eq!(last.status(), "rejected");
    assert!(last.prediction().is_empty());
    assert_eq!(svc.cached_rows(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_forced_acceptance_returns_in_range_action() {
    let svc = service(quick_config(), heuristic_factory());

    let mut last = PredictionOutcome::Pending;
    for i in 0..32 {
        last = svc.predict(row(i));
    }

    let response = last.to_response();
    assert_eq!(response.status, "accepted");
    assert_eq!(response.prediction.len(), 6);

    // Prediction targets the latest row.
    let latest = Snapshot::from(row(31));
    let expected = ActionVector::from_raw(&HeuristicPolicy::new().act(&latest));
    assert_eq!(response.prediction, expected.to_array().to_vec());
    assert!(expected.is_within_bounds());
    assert_eq!(svc.cached_rows(), 0);
}

#[test]
fn test_second_batch_starts_from_empty_cache() {
    let mut cfg = quick_config();
    cfg.batch_threshold = 4;
    let svc = service(cfg, heuristic_factory());

    for i in 0..4 {
        svc.predict(row(i));
    }
    assert_eq!(svc.cached_rows(), 0);
    for i in 0..3 {
        assert_eq!(svc.predict(row(i)), PredictionOutcome::Pending);
    }
    assert_eq!(svc.cached_rows(), 3);
    assert_ne!(svc.predict(row(3)), PredictionOutcome::Pending);
    assert_eq!(svc.metrics().retrains(), 2);
}

#[test]
fn test_malformed_rows_excluded_from_training() {
    let mut cfg = quick_config();
    cfg.batch_threshold = 4;
    let svc = service(cfg, heuristic_factory());

    svc.predict(row(0));
    svc.predict(PredictionRequest {
        votes: f64::NAN,
        ..row(1)
    });
    svc.predict(PredictionRequest {
        height: f64::INFINITY,
        ..row(2)
    });
    let out = svc.predict(row(3));

    let report = svc.last_report().unwrap();
    assert_eq!(report.valid_rows, 2);
    assert_eq!(report.dropped_rows, 2);
    assert_eq!(report.warm_start.steps, 2 * 5);
    assert_eq!(out.status(), "accepted");
}

#[test]
fn test_recovered_file_rows_count_toward_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_cache.csv");
    let mut lines = vec!["total_supply,circ_supply,balance,votes,height,tx_volume".to_string()];
    for i in 0..30 {
        lines.push(Snapshot::from(row(i)).to_csv_row());
    }
    lines.push("garbage,row".to_string());
    fs::write(&path, lines.join("\n") + "\n").unwrap();

    let mut cfg = quick_config();
    cfg.cache_path = Some(path.clone());
    let svc = service(cfg, heuristic_factory());
    assert_eq!(svc.cached_rows(), 30);

    assert_eq!(svc.predict(row(30)), PredictionOutcome::Pending);
    assert_ne!(svc.predict(row(31)), PredictionOutcome::Pending);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_concurrent_requests_retrain_once_per_batch() {
    let mut cfg = quick_config();
    cfg.batch_threshold = 8;
    let svc = Arc::new(service(cfg, heuristic_factory()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let svc = Arc::clone(&svc);
            thread::spawn(move || {
                (0..4)
                    .map(|i| svc.predict(row(t * 4 + i)))
                    .filter(|o| *o != PredictionOutcome::Pending)
                    .count()
            })
        })
        .collect();
    let triggered: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(triggered, 2);
    assert_eq!(svc.metrics().retrains(), 2);
    assert_eq!(svc.cached_rows(), 0);
}
