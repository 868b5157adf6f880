//! Stage `N`: no torque, contact force, or equality-constraint block, only
//! the terminal cost `phi(q, v)`. The terminal factorization
//! `P_N = diag(Qqq, Qvv)` is exactly
//! [`RiccatiFactorization::set_terminal`](crate::riccati::RiccatiFactorization::set_terminal)'s
//! input).

use crate::cost::QuadraticCost;
use crate::kkt::{KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};

pub struct TerminalOCP<R: RobotModel> {
    robot: R,
    matrix: KktMatrix,
    residual: KktResidual,
}

impl<R: RobotModel> TerminalOCP<R> {
    pub fn new(robot: R, nv: usize) -> Self {
        Self {
            robot,
            matrix: KktMatrix::new(nv, 0, 0),
            residual: KktResidual::new(nv, 0, 0),
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

    pub fn linearize(&mut self, cost: &QuadraticCost, s: &SplitSolution) {
        self.matrix.set_zero();
        self.residual.set_zero();
        cost.add_terminal_gradient(
            &self.robot,
            &s.q.as_view(),
            &s.v.as_view(),
            self.residual.lq.as_view_mut(),
            self.residual.lv.as_view_mut(),
        );
        cost.add_terminal_hessian(&self.robot, &s.q.as_view(), self.matrix.qqq.view_mut(), self.matrix.qvv.view_mut());
    }

    pub fn terminal_cost(&self, cost: &QuadraticCost, s: &SplitSolution) -> f64 {
        cost.phi(&self.robot, &s.q.as_view(), &s.v.as_view())
    }

    pub fn squared_kkt_error_norm(&self) -> f64 {
        self.residual.squared_kkt_error_norm()
    }

    pub fn update_primal(&self, s: &mut SplitSolution, step: f64, d: &SplitDirection) {
        let q = s.q.as_view().clone_owned();
        let dq = d.dq.as_view().clone_owned();
        let q_new = self.robot.integrate_configuration(&q, &dq, step);
        s.q.as_view_mut().copy_from(&q_new);

        let dv = d.dv.as_view();
        let mut v = s.v.as_view_mut();
        for i in 0..v.len() {
            v[i] += step * dv[i];
        }

        let dlmd = d.dlmd.as_view();
        let mut lmd = s.lmd.as_view_mut();
        for i in 0..lmd.len() {
            lmd[i] += step * dlmd[i];
        }
        let dgmm = d.dgmm.as_view();
        let mut gmm = s.gmm.as_view_mut();
        for i in 0..gmm.len() {
            gmm[i] += step * dgmm[i];
        }
    }
}
