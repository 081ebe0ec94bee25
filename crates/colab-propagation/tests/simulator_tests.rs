//! Simulator runs - randomized operation sequences against the invariant checks
//!
//! Run with: cargo test --package colab-propagation --test simulator_tests

use colab_propagation::test_harness::{run_simulator, run_simulator_with, TestHarness};
use colab_propagation::{EngineConfig, SimulatorConfig};
use proptest::prelude::*;
use std::time::Instant;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_random_sequences_keep_invariants(
        seed in any::<u64>(),
        max_cards in 2..12usize,
    ) {
        let report = run_simulator(SimulatorConfig {
            seed,
            total_operations: 150,
            max_cards,
            stop_on_first_violation: true,
        });
        prop_assert!(report.passed(), "{}", report.generate_text());
        prop_assert!(report.final_card_count <= max_cards);
    }
}

#[test]
fn test_same_seed_same_run() {
    let config = SimulatorConfig {
        seed: 11,
        total_operations: 200,
        ..SimulatorConfig::default()
    };
    let first = run_simulator(config.clone());
    let second = run_simulator(config);

    assert_eq!(first.stats.operations_by_type, second.stats.operations_by_type);
    assert_eq!(first.stats.failed_operations, second.stats.failed_operations);
    assert_eq!(first.integrity, second.integrity);
}

#[test]
fn test_every_operation_kind_is_generated() {
    let report = run_simulator(SimulatorConfig {
        seed: 5,
        total_operations: 2000,
        max_cards: 25,
        stop_on_first_violation: false,
    });
    assert!(report.passed(), "{}", report.generate_text());
    for name in ["CreateCard", "MoveCard", "RemoveCard", "Publish", "Discard", "Restore", "Delete"] {
        assert!(
            report.stats.operations_by_type.get(name).copied().unwrap_or(0) > 0,
            "{name} never generated"
        );
    }
    assert!(report.integrity.is_some());
}

#[test]
fn test_tight_depth_limit_keeps_store_consistent() {
    // cascades past the limit fail and roll back, so the store itself stays whole
    let report = run_simulator_with(
        SimulatorConfig {
            seed: 9,
            total_operations: 500,
            max_cards: 20,
            stop_on_first_violation: false,
        },
        EngineConfig::new().with_max_cascade_depth(4),
    );
    assert!(report.stats.failed_operations > 0);
    assert!(report.integrity.is_some());
}

#[test]
fn test_certification_over_seeds() {
    let start = Instant::now();
    let report = TestHarness::run_certification(4, 300);
    println!("  Certified {} seeds in {:.2}s", report.seeds_tested, start.elapsed().as_secs_f64());

    assert_eq!(report.seeds_tested, 4);
    assert!(report.passed(), "failed seeds: {:?}", report.failed_seeds);
    assert_eq!(report.total_violations, 0);
}
