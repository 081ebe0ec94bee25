// Test harness module
// Randomized simulator and the reference walkthrough

pub mod scenario;
pub mod simulator;

pub use scenario::{run_scenario, EntryState, ScenarioReport, ScenarioStep};
pub use simulator::*;

use crate::config::SimulatorConfig;

/// Runs the simulator over many seeds
pub struct TestHarness;

impl TestHarness {
    /// Run seeds `0..seeds` with `operations` steps each
    #[must_use]
    pub fn run_certification(seeds: u64, operations: u64) -> CertificationReport {
        tracing::info!("Running certification over {seeds} seeds");

        let mut failed_seeds = Vec::new();
        let mut total_violations = 0;
        for seed in 0..seeds {
            let report = run_simulator(SimulatorConfig {
                seed,
                total_operations: operations,
                stop_on_first_violation: false,
                ..SimulatorConfig::default()
            });
            if !report.passed() {
                failed_seeds.push(seed);
            }
            total_violations += report.violations.len();
        }

        CertificationReport {
            seeds_tested: seeds,
            failed_seeds,
            total_violations,
        }
    }
}

/// Report from certification
#[derive(Debug, Clone)]
pub struct CertificationReport {
    pub seeds_tested: u64,
    pub failed_seeds: Vec<u64>,
    pub total_violations: usize,
}

impl CertificationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failed_seeds.is_empty()
    }
}
