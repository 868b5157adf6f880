//! A single interior stage of the horizon: owns the robot clone and every
//! piece of per-stage scratch state, and sequences cost, dynamics, and
//! constraint assembly into one `KktMatrix`/`KktResidual` pair. No source
//! file in the corpus carries this exact
//! sequencing — `original_source/include/idocp/ocp/ocp.hpp` names the
//! `split_OCPs_` vector but its `.hxx` assembly body is not in the pack —
//! so the call order below follows the dependency order the pieces
//! themselves impose: cost and the state equation populate the blocks that
//! `RobotDynamics::condense` and the constraint condensation then add into.

use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

use crate::complementarity::ContactComplementarity;
use crate::constraints::{Constraints, ConstraintsData};
use crate::contact_status::ContactStatus;
use crate::cost::QuadraticCost;
use crate::dynamics::{RobotDynamics, StateEquation};
use crate::kkt::{KktMatrix, KktResidual};
use crate::riccati::RiccatiGain;
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};

fn add_scaled(mut out: DVectorViewMut<'_, f64>, dir: DVectorView<'_, f64>, step: f64) {
    for i in 0..out.len() {
        out[i] += step * dir[i];
    }
}

pub struct SplitOCP<R: RobotModel> {
    robot: R,
    state_equation: StateEquation,
    robot_dynamics: RobotDynamics,
    complementarity: ContactComplementarity,
    constraints_data: ConstraintsData,
    matrix: KktMatrix,
    residual: KktResidual,
}

impl<R: RobotModel> SplitOCP<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        robot: R,
        nv: usize,
        max_dimf: usize,
        dim_passive: usize,
        cs: &ContactStatus,
        constraints: &Constraints,
        max_complementarity_violation: f64,
        barrier: f64,
        fraction_to_boundary_rate: f64,
    ) -> Self {
        Self {
            state_equation: StateEquation,
            robot_dynamics: RobotDynamics::new(nv, max_dimf, dim_passive),
            complementarity: ContactComplementarity::new(cs, max_complementarity_violation, barrier, fraction_to_boundary_rate),
            constraints_data: constraints.create_data(cs),
            matrix: KktMatrix::new(nv, max_dimf, dim_passive),
            residual: KktResidual::new(nv, max_dimf, dim_passive),
            robot,
        }
    }

    pub fn robot(&self) -> &R {
        &self.robot
    }

    pub fn robot_mut(&mut self) -> &mut R {
        &mut self.robot
    }

    pub fn matrix(&self) -> &KktMatrix {
        &self.matrix
    }

    pub fn residual(&self) -> &KktResidual {
        &self.residual
    }

    pub fn set_contact_status(&mut self, nv: usize, dim_passive: usize, cs: &ContactStatus, constraints: &Constraints) {
        self.robot.set_contact_status(&(0..cs.max_points()).map(|i| cs.is_active(i)).collect::<Vec<_>>());
        self.robot_dynamics.set_contact_status(cs);
        self.complementarity.set_contact_status(cs);
        constraints.set_contact_status(&mut self.constraints_data, cs);
        self.matrix.set_contact_status(nv, dim_passive, cs);
        self.residual.set_contact_status(dim_passive, cs);
    }

    pub fn is_feasible(&self, constraints: &Constraints, s: &SplitSolution) -> bool {
        constraints.is_feasible(s) && self.complementarity.is_feasible(s)
    }

    /// Seeds the slack/dual variables of every inequality component (spec
    /// §4.15: called once before the first iteration).
    pub fn initialize_constraints(&mut self, constraints: &Constraints, dtau: f64, s: &SplitSolution) {
        constraints.set_slack_and_dual(&self.robot, &mut self.constraints_data, dtau, s);
        self.complementarity.set_slack_and_dual(&self.robot, dtau, s);
    }

    /// Populates `G, C_af, Qafqv, Cqv, la, lf, C, Fqq, Fqv` by running
    /// cost, state-equation, inverse-dynamics, and
    /// constraint/complementarity condensation in sequence into this
    /// stage's own `matrix`/`residual`.
    pub fn linearize(
        &mut self,
        cost: &QuadraticCost,
        constraints: &Constraints,
        cs: &ContactStatus,
        dtau: f64,
        s: &SplitSolution,
        s_next: &SplitSolution,
    ) {
        self.matrix.set_zero();
        self.residual.set_zero();

        let q = s.q.as_view().clone_owned();
        let v = s.v.as_view().clone_owned();
        let a = s.a.as_view().clone_owned();
        self.robot.update_kinematics(&q, &v, &a);

        cost.add_gradient(dtau, &self.robot, s, &mut self.residual);
        cost.add_hessian(dtau, &self.robot, &s.q.as_view(), &mut self.matrix);

        self.state_equation
            .linearize_forward_euler(&self.robot, dtau, s, s_next, &mut self.matrix, &mut self.residual);
        self.robot_dynamics.linearize(&mut self.robot, cs, s, &mut self.residual, &mut self.matrix);

        constraints.augment_dual_residual(&self.robot, &self.constraints_data, dtau, &mut self.residual);
        self.complementarity.augment_dual_residual(dtau, &mut self.residual);

        constraints.condense_slack_and_dual(&self.robot, &mut self.constraints_data, dtau, s, &mut self.matrix, &mut self.residual);
        self.complementarity.condense_slack_and_dual(&self.robot, dtau, s, &mut self.matrix, &mut self.residual);

        self.robot_dynamics.condense(cost, dtau, &mut self.residual, &mut self.matrix);
    }

    /// `du = du_dq*dq + du_dv*dv + du_da*da + du_df*df - u_res`, recovered
    /// once the Riccati-gain `(da, df)` are known.
    pub fn compute_condensed_primal_direction(&self, d: &mut SplitDirection) {
        self.robot_dynamics.compute_condensed_direction(&self.residual, d);
    }

    pub fn compute_condensed_dual_direction(&mut self, constraints: &Constraints, dtau: f64, d: &SplitDirection) {
        constraints.compute_slack_and_dual_direction(&self.robot, &mut self.constraints_data, dtau, d);
        self.complementarity.compute_slack_and_dual_direction(&self.robot, dtau, d);
    }

    pub fn max_primal_step_size(&self, constraints: &Constraints) -> f64 {
        constraints
            .max_slack_step_size(&self.constraints_data)
            .min(self.complementarity.max_slack_step_size(None))
    }

    pub fn max_dual_step_size(&self, constraints: &Constraints) -> f64 {
        constraints
            .max_dual_step_size(&self.constraints_data)
            .min(self.complementarity.max_dual_step_size(None))
    }

    /// Updates `(q, v, a, u, f)` and the costates `(lmd, gmm, mu)` along
    /// `step * d`. `q` is retracted on the configuration manifold; every
    /// other block is a plain vector-space update.
    pub fn update_primal(&self, s: &mut SplitSolution, step: f64, d: &SplitDirection) {
        let q = s.q.as_view().clone_owned();
        let dq = d.dq.as_view().clone_owned();
        let q_new = self.robot.integrate_configuration(&q, &dq, step);
        s.q.as_view_mut().copy_from(&q_new);

        add_scaled(s.v.as_view_mut(), d.dv.as_view(), step);
        add_scaled(s.a.as_view_mut(), d.da.as_view(), step);
        add_scaled(s.u.as_view_mut(), d.du.as_view(), step);
        add_scaled(s.lmd.as_view_mut(), d.dlmd.as_view(), step);
        add_scaled(s.gmm.as_view_mut(), d.dgmm.as_view(), step);
        if s.f.len() > 0 {
            add_scaled(s.f.as_view_mut(), d.df.as_view(), step);
        }
        if s.mu.len() > 0 {
            add_scaled(s.mu.as_view_mut(), d.dmu.as_view(), step);
        }
    }

    pub fn update_dual(&mut self, constraints: &Constraints, primal_step: f64, dual_step: f64) {
        constraints.update_slack(&mut self.constraints_data, primal_step);
        constraints.update_dual(&mut self.constraints_data, dual_step);
        self.complementarity.update_slack(primal_step);
        self.complementarity.update_dual(dual_step);
    }

    /// `(cost, constraint violation)` pair the line search filter accepts or
    /// rejects.
    pub fn cost_and_violation(&self, cost: &QuadraticCost, constraints: &Constraints, dtau: f64, s: &SplitSolution) -> (f64, f64) {
        let stage_cost = cost.l(dtau, &self.robot, s) + constraints.cost_slack_barrier(&self.constraints_data);
        let violation = self.residual.violation_l1_norm()
            + self.robot_dynamics.l1_norm(dtau, &self.residual)
            + constraints.residual_l1_norm(&self.constraints_data)
            + self.complementarity.residual_l1_norm();
        (stage_cost, violation)
    }

    /// `(Kuq, Kuv)`: the torque feedback gain folding in the Riccati
    /// `(a, f)` feedback, read by an `OcpSolver` that wants the controller
    /// gain at a stage without re-deriving it from `(du_dq, du_da, ...)`.
    pub fn state_feedback_gain(&self, gain: &RiccatiGain) -> (DMatrix<f64>, DMatrix<f64>) {
        let kaq = gain.kaq.view().clone_owned();
        let kav = gain.kav.view().clone_owned();
        let kfq = gain.kfq.view().clone_owned();
        let kfv = gain.kfv.view().clone_owned();
        self.robot_dynamics.state_feedback_gain(&kaq, &kav, &kfq, &kfv)
    }

    pub fn squared_kkt_error_norm(&self, constraints: &Constraints, dtau: f64) -> f64 {
        self.residual.squared_kkt_error_norm()
            + self.robot_dynamics.squared_norm(dtau, &self.residual)
            + constraints.squared_kkt_error_norm(&self.constraints_data)
            + self.complementarity.squared_kkt_error_norm()
    }
}
