//! Stack of inequality constraints sharing one barrier parameter (spec
//! §4.6), generalizing
//! `original_source/include/idocp/constraints/constraints.hpp`'s
//! `std::vector<shared_ptr<ConstraintComponentBase>>` into a
//! `Vec<ConstraintComponent>` of the sum type in [`components`].

pub mod components;
pub mod data;
pub mod pdipm;

pub use components::{ConstraintComponent, ContactDistance, FrictionCone, JointAxis, JointBound};
pub use data::ConstraintComponentData;

use crate::contact_status::ContactStatus;
use crate::kkt::{KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};

/// Per-stage data for every pushed component, in the same order.
#[derive(Debug, Clone, Default)]
pub struct ConstraintsData {
    entries: Vec<ConstraintComponentData>,
}

#[derive(Debug, Clone)]
pub struct Constraints {
    barrier: f64,
    fraction_to_boundary_rate: f64,
    components: Vec<ConstraintComponent>,
}

impl Constraints {
    pub fn new(barrier: f64, fraction_to_boundary_rate: f64) -> Self {
        debug_assert!(barrier > 0.0);
        debug_assert!(fraction_to_boundary_rate > 0.0 && fraction_to_boundary_rate <= 1.0);
        Self {
            barrier,
            fraction_to_boundary_rate,
            components: Vec::new(),
        }
    }

    pub fn push(&mut self, component: ConstraintComponent) {
        self.components.push(component);
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Allocates each entry at its maximum possible dimension
    /// ([`ConstraintComponent::max_dimc`]) and then narrows it to `cs`'s
    /// current dimension, so a later [`set_contact_status`](Self::set_contact_status)
    /// call can only move the logical length within storage that is
    /// already large enough, never exceed it.
    pub fn create_data(&self, cs: &ContactStatus) -> ConstraintsData {
        ConstraintsData {
            entries: self
                .components
                .iter()
                .map(|c| {
                    let mut entry = ConstraintComponentData::new(c.max_dimc(cs));
                    entry.resize(c.dimc(cs));
                    entry
                })
                .collect(),
        }
    }

    /// Resizes each entry's dimension to the current contact status
    /// (friction-cone and contact-distance components only).
    pub fn set_contact_status(&self, data: &mut ConstraintsData, cs: &ContactStatus) {
        for (c, entry) in self.components.iter().zip(data.entries.iter_mut()) {
            entry.resize(c.dimc(cs));
        }
    }

    pub fn is_feasible(&self, s: &SplitSolution) -> bool {
        self.components.iter().all(|c| c.is_feasible(s))
    }

    pub fn set_slack_and_dual<R: RobotModel>(&self, robot: &R, data: &mut ConstraintsData, dtau: f64, s: &SplitSolution) {
        for (c, entry) in self.components.iter().zip(data.entries.iter_mut()) {
            c.set_slack_and_dual(robot, self.barrier, dtau, s, entry);
        }
    }

    pub fn augment_dual_residual<R: RobotModel>(&self, robot: &R, data: &ConstraintsData, dtau: f64, residual: &mut KktResidual) {
        for (c, entry) in self.components.iter().zip(data.entries.iter()) {
            c.augment_dual_residual(robot, dtau, entry, residual);
        }
    }

    pub fn condense_slack_and_dual<R: RobotModel>(
        &self,
        robot: &R,
        data: &mut ConstraintsData,
        dtau: f64,
        s: &SplitSolution,
        matrix: &mut KktMatrix,
        residual: &mut KktResidual,
    ) {
        for (c, entry) in self.components.iter().zip(data.entries.iter_mut()) {
            c.condense_slack_and_dual(robot, self.barrier, dtau, s, entry, matrix, residual);
        }
    }

    pub fn compute_slack_and_dual_direction<R: RobotModel>(
        &self,
        robot: &R,
        data: &mut ConstraintsData,
        dtau: f64,
        d: &SplitDirection,
    ) {
        for (c, entry) in self.components.iter().zip(data.entries.iter_mut()) {
            c.compute_slack_and_dual_direction(robot, dtau, entry, d);
        }
    }

    pub fn max_slack_step_size(&self, data: &ConstraintsData) -> f64 {
        data.entries
            .iter()
            .map(|e| {
                let slack: Vec<f64> = e.slack.as_view().iter().cloned().collect();
                let dslack: Vec<f64> = e.dslack.as_view().iter().cloned().collect();
                pdipm::fraction_to_boundary(self.fraction_to_boundary_rate, &slack, &dslack)
            })
            .fold(1.0, f64::min)
    }

    pub fn max_dual_step_size(&self, data: &ConstraintsData) -> f64 {
        data.entries
            .iter()
            .map(|e| {
                let dual: Vec<f64> = e.dual.as_view().iter().cloned().collect();
                let ddual: Vec<f64> = e.ddual.as_view().iter().cloned().collect();
                pdipm::fraction_to_boundary(self.fraction_to_boundary_rate, &dual, &ddual)
            })
            .fold(1.0, f64::min)
    }

    pub fn update_slack(&self, data: &mut ConstraintsData, step_size: f64) {
        for e in data.entries.iter_mut() {
            let updated: Vec<f64> = e
                .slack
                .as_view()
                .iter()
                .zip(e.dslack.as_view().iter())
                .map(|(s, ds)| s + step_size * ds)
                .collect();
            e.slack.as_view_mut().copy_from_slice(&updated);
        }
    }

    pub fn update_dual(&self, data: &mut ConstraintsData, step_size: f64) {
        for e in data.entries.iter_mut() {
            let updated: Vec<f64> = e
                .dual
                .as_view()
                .iter()
                .zip(e.ddual.as_view().iter())
                .map(|(z, dz)| z + step_size * dz)
                .collect();
            e.dual.as_view_mut().copy_from_slice(&updated);
        }
    }

    pub fn cost_slack_barrier(&self, data: &ConstraintsData) -> f64 {
        data.entries
            .iter()
            .map(|e| {
                let slack: Vec<f64> = e.slack.as_view().iter().cloned().collect();
                pdipm::cost_barrier(self.barrier, &slack)
            })
            .sum()
    }

    /// Barrier cost evaluated after a trial step of `step_size` along
    /// `dslack`, without mutating `data` (used by the filter line search).
    pub fn cost_slack_barrier_trial(&self, data: &ConstraintsData, step_size: f64) -> f64 {
        data.entries
            .iter()
            .map(|e| {
                let trial: Vec<f64> = e
                    .slack
                    .as_view()
                    .iter()
                    .zip(e.dslack.as_view().iter())
                    .map(|(s, ds)| s + step_size * ds)
                    .collect();
                pdipm::cost_barrier(self.barrier, &trial)
            })
            .sum()
    }

    pub fn residual_l1_norm(&self, data: &ConstraintsData) -> f64 {
        self.components
            .iter()
            .zip(data.entries.iter())
            .map(|(c, e)| c.residual_norms(e).0)
            .sum()
    }

    pub fn squared_kkt_error_norm(&self, data: &ConstraintsData) -> f64 {
        self.components
            .iter()
            .zip(data.entries.iter())
            .map(|(c, e)| c.residual_norms(e).1)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    fn lower_bound(dimc: usize, sign: f64, value: f64) -> ConstraintComponent {
        ConstraintComponent::JointBound(JointBound {
            axis: JointAxis::Q,
            bound: DVector::from_element(dimc, value),
            sign,
        })
    }

    #[test]
    fn empty_constraints_stack_has_zero_cost_and_is_feasible() {
        let stack = Constraints::new(1e-3, 0.995);
        let s = SplitSolution::new(2, 2, 0, 0);
        assert!(stack.is_feasible(&s));
        let cs = ContactStatus::new(0);
        let data = stack.create_data(&cs);
        assert_eq!(stack.cost_slack_barrier(&data), 0.0);
    }

    #[test]
    fn joint_lower_bound_rejects_violating_iterate() {
        let mut stack = Constraints::new(1e-3, 0.995);
        stack.push(lower_bound(2, 1.0, 0.0));
        let mut s = SplitSolution::new(2, 2, 0, 0);
        s.q.as_view_mut().copy_from(&DVector::from_vec(vec![-1.0, 1.0]));
        assert!(!stack.is_feasible(&s));
    }

    #[test]
    fn fraction_to_boundary_step_sizes_stay_in_unit_interval() {
        let mut stack = Constraints::new(1e-3, 0.995);
        stack.push(lower_bound(2, 1.0, 0.0));
        let cs = ContactStatus::new(0);
        let mut data = stack.create_data(&cs);
        data.entries[0].slack.as_view_mut().copy_from_slice(&[1.0, 1.0]);
        data.entries[0].dslack.as_view_mut().copy_from_slice(&[-2.0, -0.1]);
        let step = stack.max_slack_step_size(&data);
        assert!(step > 0.0 && step <= 1.0);
    }
}
