//! Transition Engine Tests
//!
//! Critical invariants tested:
//! - Pity grows by base × rate per failed attempt unit, resets on success
//! - Chance is non-decreasing between successes
//! - Weighted destinations follow the bucket allocation

use tier_ladder_engine::config::AccumulationRate;
use tier_ladder_engine::models::{TierCatalog, TierChain, TierDefinition};
use tier_ladder_engine::transition::{AttemptOutcome, TransitionEngine, TransitionState};
use tier_ladder_engine::RngManager;

// ============================================================================
// Test Helpers
// ============================================================================

fn linear(n: usize) -> TierChain {
    let names: Vec<String> = (0..n).map(|i| format!("t{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    TierChain::build(&TierCatalog::linear(&refs), 0.0).unwrap()
}

/// normal -> uncommon (p=0.9) -> rare (p=0.5) -> legendary
fn weighted() -> TierChain {
    let catalog = TierCatalog::new(vec![
        TierDefinition::new("normal", Some("uncommon")),
        TierDefinition::new("uncommon", Some("rare")).with_continue_probability(0.9),
        TierDefinition::new("rare", Some("legendary")).with_continue_probability(0.5),
        TierDefinition::new("legendary", None),
    ]);
    TierChain::build(&catalog, 0.0).unwrap()
}

fn fresh(tier: usize) -> TransitionState {
    TransitionState {
        tier,
        chance: 0.01,
        attempts: 0,
    }
}

// ============================================================================
// Pity
// ============================================================================

#[test]
fn test_pity_follows_base_plus_n_times_rate() {
    let engine = TransitionEngine::new(0.01, AccumulationRate::Low, &linear(3));
    let mut rng = RngManager::new(31337);
    let mut state = fresh(0);

    // Chance reaches 1.0 after 495 failures, so a success is guaranteed
    for failures in 0..=495u32 {
        let expected = 0.01 + f64::from(failures) * 0.002;
        assert!(
            (state.chance - expected).abs() < 1e-9,
            "after {} failures: {} != {}",
            failures,
            state.chance,
            expected
        );
        match engine.attempt(&mut state, 1, &mut rng) {
            AttemptOutcome::Advanced { to } => {
                assert_eq!(to, 1);
                assert_eq!(state.chance, 0.01, "chance resets on leaving the tier");
                return;
            }
            AttemptOutcome::Failed => {}
        }
    }
    panic!("effective chance of 1.0 must succeed");
}

#[test]
fn test_chance_non_decreasing_between_successes() {
    let engine = TransitionEngine::new(0.01, AccumulationRate::High, &linear(6));
    let mut rng = RngManager::new(5);
    let mut state = fresh(0);
    let mut previous = state.chance;

    for _ in 0..2000 {
        let tier_before = state.tier;
        match engine.attempt(&mut state, 3, &mut rng) {
            AttemptOutcome::Advanced { to } => {
                assert!(to > tier_before);
                previous = state.chance;
            }
            AttemptOutcome::Failed => {
                assert!(state.chance >= previous);
                previous = state.chance;
            }
        }
    }
}

#[test]
fn test_rate_off_keeps_base_chance() {
    let engine = TransitionEngine::new(0.01, AccumulationRate::Off, &linear(3));
    let mut rng = RngManager::new(8);
    let mut state = fresh(0);
    for _ in 0..50 {
        if engine.attempt(&mut state, 1, &mut rng) == AttemptOutcome::Failed {
            assert_eq!(state.chance, 0.01);
        }
    }
}

#[test]
fn test_batched_grant_counts_attempt_units() {
    let engine = TransitionEngine::new(0.01, AccumulationRate::Low, &linear(3));
    let mut rng = RngManager::new(8);
    let mut state = fresh(0);
    engine.attempt(&mut state, 40, &mut rng);
    assert_eq!(state.attempts, 40);
}

// ============================================================================
// Resolve
// ============================================================================

#[test]
fn test_resolve_chains_successes_to_terminal() {
    let engine = TransitionEngine::new(1.0, AccumulationRate::Low, &linear(5));
    let mut rng = RngManager::new(3);
    let resolution = engine.resolve(fresh(0), 1, &mut rng);
    assert_eq!(resolution.origin, 0);
    assert_eq!(resolution.state.tier, 4);
    assert_eq!(resolution.successes, 4);
}

#[test]
fn test_terminal_state_is_untouched() {
    let engine = TransitionEngine::new(0.5, AccumulationRate::High, &linear(3));
    let mut rng = RngManager::new(3);
    let resolution = engine.resolve(fresh(2), 10, &mut rng);
    assert!(!resolution.advanced());
    assert_eq!(resolution.state, fresh(2));
}

// ============================================================================
// Weighted destinations
// ============================================================================

#[test]
fn test_weighted_distribution_over_100k_draws() {
    let chain = weighted();
    assert!(chain.is_weighted());
    let engine = TransitionEngine::new(0.01, AccumulationRate::Low, &chain);
    let mut rng = RngManager::new(4242);

    let draws = 100_000;
    let mut counts = [0usize; 4];
    for _ in 0..draws {
        counts[engine.sample_destination(0, &mut rng)] += 1;
    }

    let share = |tier: usize| counts[tier] as f64 / draws as f64;
    assert_eq!(counts[0], 0);
    assert!((share(1) - 0.10).abs() < 0.01, "uncommon {}", share(1));
    assert!((share(2) - 0.45).abs() < 0.01, "rare {}", share(2));
    assert!((share(3) - 0.45).abs() < 0.01, "legendary {}", share(3));
}

#[test]
fn test_simple_chain_steps_one_tier() {
    let engine = TransitionEngine::new(0.01, AccumulationRate::Low, &linear(4));
    let mut rng = RngManager::new(1);
    for source in 0..3 {
        assert_eq!(engine.sample_destination(source, &mut rng), source + 1);
    }
}
