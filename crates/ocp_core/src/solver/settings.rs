//! Solver tuning knobs that are part of the algorithm itself, not the cost
//! model: the PDIP barrier schedule, step-size tolerances, and filter
//! margin are tuning parameters of the method rather than weight
//! configuration. Shaped the way
//! `fork_core::equilibrium::NewtonSettings` groups Newton-loop knobs
//! (`max_steps`, `damping`, `tolerance`) into one `Default`-able struct.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverSettings {
    pub max_iterations: usize,
    pub kkt_tolerance: f64,
    pub barrier: f64,
    pub fraction_to_boundary_rate: f64,
    pub regularization_epsilon: f64,
    pub max_complementarity_violation: f64,
    pub filter_margin: f64,
    pub min_step_size: f64,
    pub step_size_reduction_rate: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            kkt_tolerance: 1e-8,
            barrier: 1e-4,
            fraction_to_boundary_rate: 0.995,
            regularization_epsilon: 1e-8,
            max_complementarity_violation: 1e-3,
            filter_margin: 1e-5,
            min_step_size: 1e-4,
            step_size_reduction_rate: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_their_valid_ranges() {
        let settings = SolverSettings::default();
        assert!(settings.fraction_to_boundary_rate > 0.0 && settings.fraction_to_boundary_rate < 1.0);
        assert!(settings.step_size_reduction_rate > 0.0 && settings.step_size_reduction_rate < 1.0);
        assert!(settings.max_iterations > 0);
    }
}
