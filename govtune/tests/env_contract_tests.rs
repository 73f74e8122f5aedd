// tests/env_contract_tests.rs
//
// Gym-style contract of the governance environment:
// - reset is deterministic and history-independent
// - termination exactly when the pre-step counter reaches the horizon
// - truncation never happens
// - every applied action lies inside the declared ranges
// - reward is finite and bounded for in-range snapshots

use govtune::rl::{
    ConstantPolicy, EnvConfig, GovernanceEnv, HeuristicPolicy, Policy, DEFAULT_HORIZON,
};
use govtune::{ActionVector, Snapshot, ACTION_BOUNDS};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[test]
fn test_reset_is_history_independent() {
    let mut env = GovernanceEnv::default();
    let (first, _) = env.reset();

    for _ in 0..37 {
        env.step(&[3.0, 9.0, 120.0, 0.1, 5.0, 60.0]);
    }
    env.load_snapshot(Snapshot::from_array([1.0; 6]));

    let (second, info) = env.reset();
    assert_eq!(first, second);
    assert_eq!(second, Snapshot::INITIAL);
    assert_eq!(env.current_step(), 0);
    assert_eq!(info.episode, 2);
}

#[test]
fn test_termination_exactly_at_horizon() {
    let mut env = GovernanceEnv::default();
    env.reset();

    for k in 0..DEFAULT_HORIZON {
        let r = env.step(&[1.0; 6]);
        assert!(!r.terminated, "terminated early at counter {k}");
        assert!(!r.truncated);
    }
    assert_eq!(env.current_step(), DEFAULT_HORIZON);

    let last = env.step(&[1.0; 6]);
    assert!(last.terminated);
    assert!(!last.truncated);
    assert_eq!(last.info.step, DEFAULT_HORIZON + 1);
}

#[test]
fn test_custom_horizon() {
    let mut env = GovernanceEnv::new(EnvConfig {
        horizon: 3,
        ..EnvConfig::default()
    });
    env.reset();
    let dones: Vec<bool> = (0..4).map(|_| env.step(&[1.0; 6]).terminated).collect();
    assert_eq!(dones, vec![false, false, false, true]);
}

#[test]
fn test_adversarial_actions_are_clipped_into_range() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let specials = [
        f64::NAN,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::MAX,
        f64::MIN,
        -0.0,
        1e-300,
    ];

    let mut env = GovernanceEnv::default();
    env.reset();
    for i in 0..500 {
        let mut raw = [0.0; 6];
        for v in raw.iter_mut() {
            *v = if rng.gen_bool(0.3) {
                specials[rng.gen_range(0..specials.len())]
            } else {
                rng.gen_range(-1e9..1e9)
            };
        }
        let r = env.step(&raw);
        let applied = r.info.applied.to_array();
        for (v, b) in applied.iter().zip(ACTION_BOUNDS.iter()) {
            assert!(
                *v >= b.min && *v <= b.max,
                "iteration {i}: {} = {v} outside [{}, {}]",
                b.name,
                b.min,
                b.max
            );
        }
        assert!(r.reward.is_finite());
        assert!((-1.0..=1.0).contains(&r.reward));
        if r.done() {
            env.reset();
        }
    }
}

#[test]
fn test_reward_bounded_over_observation_space() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let weights = EnvConfig::default().reward_weights;
    for _ in 0..1000 {
        let s = Snapshot::from_array([
            rng.gen_range(0.0..1e9),
            rng.gen_range(0.0..1e9),
            rng.gen_range(0.0..1e8),
            rng.gen_range(0.0..1e6),
            rng.gen_range(0.0..1e9),
            rng.gen_range(0.0..1e6),
        ]);
        assert!(s.within_observation_bounds());
        let a = ActionVector::from_raw(&[
            rng.gen_range(1.0..1e5),
            rng.gen_range(1.0..1e3),
            rng.gen_range(60.0..3.1536e7),
            rng.gen_range(0.0..1.0),
            rng.gen_range(1.0..3600.0),
            rng.gen_range(1.0..1e6),
        ]);
        let r = govtune::rl::RewardComponents::from_state(&s, &a).compute_reward(&weights);
        assert!(r.is_finite());
        assert!((-1.0..=1.0).contains(&r));
    }
}

#[test]
fn test_identical_episodes_give_identical_returns() {
    let run = || {
        let mut env = GovernanceEnv::default();
        let (mut obs, _) = env.reset();
        let policy = HeuristicPolicy::new();
        let mut rewards = Vec::new();
        loop {
            let r = env.step(&policy.act(&obs));
            rewards.push(r.reward);
            if r.done() {
                break;
            }
            obs = r.observation;
        }
        rewards
    };
    let a = run();
    let b = run();
    assert_eq!(a.len() as u64, DEFAULT_HORIZON + 1);
    assert_eq!(a, b);
}

#[test]
fn test_reward_components_reported() {
    let mut env = GovernanceEnv::default();
    env.reset();
    let policy = ConstantPolicy::new([5500.0, 1000.0, 120.0, 0.0, 3600.0, 62946.0]);
    let r = env.step(&policy.act(&Snapshot::INITIAL));
    let c = r.info.reward_components;

    assert_eq!(c.delegate_score, 1.0);
    assert_eq!(c.decay_score, 1.0);
    assert!(r.info.clip_reasons.is_empty());
    let weighted = c.compute_reward(&EnvConfig::default().reward_weights);
    assert!((weighted - r.reward).abs() < 1e-12);
}
