//! Free-function primal-dual interior-point helpers shared by every
//! constraint component. Grounded directly on
//! `original_source/include/idocp/constraints/pdipm.hxx`; names kept close
//! to the original so the correspondence is easy to check, bodies adapted
//! to work over a `&mut [f64]`/`&[f64]` pair instead of Eigen arrays.

/// Lifts every entry of `slack` to at least `barrier`, then sets
/// `dual = barrier / slack` elementwise.
pub fn set_slack_and_dual_positive(barrier: f64, slack: &mut [f64], dual: &mut [f64]) {
    debug_assert!(barrier > 0.0);
    for s in slack.iter_mut() {
        while *s < barrier {
            *s += barrier;
        }
    }
    for (d, s) in dual.iter_mut().zip(slack.iter()) {
        *d = barrier / s;
    }
}

/// `duality = slack .* dual - barrier`.
pub fn compute_duality(barrier: f64, slack: &[f64], dual: &[f64], duality: &mut [f64]) {
    for i in 0..slack.len() {
        duality[i] = slack[i] * dual[i] - barrier;
    }
}

/// `ddual = -(dual .* dslack + duality) ./ slack`.
pub fn compute_dual_direction(slack: &[f64], dual: &[f64], dslack: &[f64], duality: &[f64], ddual: &mut [f64]) {
    for i in 0..slack.len() {
        ddual[i] = -(dual[i] * dslack[i] + duality[i]) / slack[i];
    }
}

/// `min(1, min_{i: candidate in (0,1)} candidate)` where
/// `candidate_i = -fraction_rate * vec_i / dvec_i`. An index whose
/// candidate falls outside `(0, 1)` does not constrain the step at all,
/// per the original's
/// `if (fraction_to_boundary > 0 && fraction_to_boundary < 1)` guard.
pub fn fraction_to_boundary(fraction_rate: f64, vec: &[f64], dvec: &[f64]) -> f64 {
    debug_assert!(fraction_rate > 0.0 && fraction_rate <= 1.0);
    let mut min_step = 1.0f64;
    for i in 0..vec.len() {
        let candidate = -fraction_rate * (vec[i] / dvec[i]);
        if candidate > 0.0 && candidate < 1.0 && candidate < min_step {
            min_step = candidate;
        }
    }
    debug_assert!(min_step > 0.0 && min_step <= 1.0);
    min_step
}

/// `-barrier * sum(log(vec))`, the log-barrier cost contribution.
pub fn cost_barrier(barrier: f64, vec: &[f64]) -> f64 {
    debug_assert!(barrier > 0.0);
    -barrier * vec.iter().map(|v| v.ln()).sum::<f64>()
}
