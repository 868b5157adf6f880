//! Discrete-time state transition residual and its manifold Jacobians.
//! Grounded on
//! `original_source/test/ocp/state_equation_test.cpp`'s exact expected
//! values, since the corpus kept the test but not the `.hxx` body.

use crate::kkt::{KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::SplitSolution;

/// Stateless; every method takes the stage's own data explicitly so it can
/// run on any worker without owning anything itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEquation;

impl StateEquation {
    /// `Fq = q \ominus q_next + dtau*v`, `Fv = v - v_next + dtau*a`, plus the
    /// adjoint-gradient terms coupling this stage's multipliers to the next
    /// stage's. `Fqq`/`Fqv` are written into `matrix` for the Riccati pass to
    /// reuse.
    pub fn linearize_forward_euler<R: RobotModel>(
        &self,
        robot: &R,
        dtau: f64,
        s: &SplitSolution,
        s_next: &SplitSolution,
        matrix: &mut KktMatrix,
        residual: &mut KktResidual,
    ) {
        let q = s.q.as_view().clone_owned();
        let v = s.v.as_view().clone_owned();
        let q_next = s_next.q.as_view().clone_owned();

        let qdiff = robot.subtract_configuration(&q, &q_next);
        let mut fq = residual.fq.as_view_mut();
        for i in 0..fq.len() {
            fq[i] = qdiff[i] + dtau * v[i];
        }

        let a = s.a.as_view();
        let v_next = s_next.v.as_view();
        let mut fv = residual.fv.as_view_mut();
        for i in 0..fv.len() {
            fv[i] = v[i] + dtau * a[i] - v_next[i];
        }

        let lmd = s.lmd.as_view();
        let gmm = s.gmm.as_view();
        let lmd_next = s_next.lmd.as_view();
        let gmm_next = s_next.gmm.as_view();
        let mut lq = residual.lq.as_view_mut();
        let mut lv = residual.lv.as_view_mut();
        let mut la = residual.la.as_view_mut();
        for i in 0..lq.len() {
            lq[i] += lmd_next[i] - lmd[i];
            lv[i] += dtau * lmd_next[i] + gmm_next[i] - gmm[i];
            la[i] += dtau * gmm_next[i];
        }

        let fqq = robot.d_subtract_dq_a(&q, &q_next);
        let fqv = robot.d_integrate_dv(&q, &v, dtau);
        matrix.fqq.view_mut().copy_from(&fqq);
        matrix.fqv.view_mut().copy_from(&fqv);
    }

    /// `Fq = q_prev \ominus q + dtau*v`, `Fv = v_prev - v + dtau*a`. The
    /// terminal stage has no `s_next`/`lmd_next`/`gmm_next`: pass `None`.
    pub fn linearize_backward_euler<R: RobotModel>(
        &self,
        robot: &R,
        dtau: f64,
        s_prev: &SplitSolution,
        s: &SplitSolution,
        s_next: Option<&SplitSolution>,
        matrix: &mut KktMatrix,
        residual: &mut KktResidual,
    ) {
        let q_prev = s_prev.q.as_view().clone_owned();
        let q = s.q.as_view().clone_owned();
        let v = s.v.as_view().clone_owned();

        let qdiff = robot.subtract_configuration(&q_prev, &q);
        let mut fq = residual.fq.as_view_mut();
        for i in 0..fq.len() {
            fq[i] = qdiff[i] + dtau * v[i];
        }

        let a = s.a.as_view();
        let v_prev = s_prev.v.as_view();
        let mut fv = residual.fv.as_view_mut();
        for i in 0..fv.len() {
            fv[i] = v_prev[i] - v[i] + dtau * a[i];
        }

        let lmd = s.lmd.as_view();
        let gmm = s.gmm.as_view();
        let lmd_next = s_next.map(|sn| sn.lmd.as_view());
        let gmm_next = s_next.map(|sn| sn.gmm.as_view());
        let mut lq = residual.lq.as_view_mut();
        let mut lv = residual.lv.as_view_mut();
        let mut la = residual.la.as_view_mut();
        for i in 0..lq.len() {
            let lmd_next_i = lmd_next.as_ref().map(|v| v[i]).unwrap_or(0.0);
            let gmm_next_i = gmm_next.as_ref().map(|v| v[i]).unwrap_or(0.0);
            lq[i] += lmd_next_i + lmd[i];
            lv[i] += dtau * lmd[i] - gmm[i] + gmm_next_i;
            la[i] += dtau * gmm[i];
        }

        let fqq = robot.d_subtract_dq_b(&q_prev, &q);
        let fqv = robot.d_integrate_dv(&q, &v, dtau);
        matrix.fqq.view_mut().copy_from(&fqq);
        matrix.fqv.view_mut().copy_from(&fqv);
    }

    pub fn violation_l1_norm(&self, residual: &KktResidual) -> f64 {
        residual.violation_l1_norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact_status::ContactStatus;
    use nalgebra::{DMatrix, DVector};

    #[derive(Clone)]
    struct EuclideanRobot {
        nv: usize,
    }

    impl RobotModel for EuclideanRobot {
        fn dimq(&self) -> usize {
            self.nv
        }
        fn dimv(&self) -> usize {
            self.nv
        }
        fn dim_passive(&self) -> usize {
            0
        }
        fn max_point_contacts(&self) -> usize {
            0
        }
        fn has_floating_base(&self) -> bool {
            false
        }
        fn integrate_configuration(&self, q: &DVector<f64>, v: &DVector<f64>, dt: f64) -> DVector<f64> {
            q + dt * v
        }
        fn d_integrate_dq(&self, q: &DVector<f64>, _v: &DVector<f64>, _dt: f64) -> DMatrix<f64> {
            DMatrix::identity(q.len(), q.len())
        }
        fn d_integrate_dv(&self, q: &DVector<f64>, _v: &DVector<f64>, dt: f64) -> DMatrix<f64> {
            DMatrix::identity(q.len(), q.len()) * dt
        }
        fn subtract_configuration(&self, q_a: &DVector<f64>, q_b: &DVector<f64>) -> DVector<f64> {
            q_a - q_b
        }
        fn d_subtract_dq_a(&self, q_a: &DVector<f64>, _q_b: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::identity(q_a.len(), q_a.len())
        }
        fn d_subtract_dq_b(&self, q_a: &DVector<f64>, _q_b: &DVector<f64>) -> DMatrix<f64> {
            -DMatrix::<f64>::identity(q_a.len(), q_a.len())
        }
        fn normalize_configuration(&self, _q: &mut DVector<f64>) {}
        fn generate_feasible_configuration(&self) -> DVector<f64> {
            DVector::zeros(self.nv)
        }
        fn update_kinematics(&mut self, _q: &DVector<f64>, _v: &DVector<f64>, _a: &DVector<f64>) {}
        fn set_contact_points_by_current_kinematics(&mut self) {}
        fn set_contact_status(&mut self, _active: &[bool]) {}
        fn compute_baumgarte_residual(&self, _out: &mut DVector<f64>) {}
        fn compute_baumgarte_derivatives(&self, _dq: &mut DMatrix<f64>, _dv: &mut DMatrix<f64>, _da: &mut DMatrix<f64>) {}
        fn rnea(&mut self, _q: &DVector<f64>, _v: &DVector<f64>, _a: &DVector<f64>, _tau_out: &mut DVector<f64>) {}
        fn rnea_derivatives(
            &mut self,
            _q: &DVector<f64>,
            _v: &DVector<f64>,
            _a: &DVector<f64>,
            _dq: &mut DMatrix<f64>,
            _dv: &mut DMatrix<f64>,
            _da: &mut DMatrix<f64>,
        ) {
        }
        fn d_rnea_d_fext(&self, _out: &mut DMatrix<f64>) {}
        fn set_contact_forces(&mut self, _f: &DVector<f64>) {}
        fn joint_effort_limit(&self) -> &DVector<f64> {
            unimplemented!()
        }
        fn joint_velocity_limit(&self) -> &DVector<f64> {
            unimplemented!()
        }
        fn lower_joint_position_limit(&self) -> &DVector<f64> {
            unimplemented!()
        }
        fn upper_joint_position_limit(&self) -> &DVector<f64> {
            unimplemented!()
        }
        fn contact_distance(&self, _out: &mut DVector<f64>) {}
        fn contact_distance_derivative(&self, _out: &mut DMatrix<f64>) {}
    }

    fn fixture(nv: usize) -> (EuclideanRobot, SplitSolution, SplitSolution, KktMatrix, KktResidual) {
        let robot = EuclideanRobot { nv };
        let s = SplitSolution::new(nv, nv, 0, 0);
        let s_next = SplitSolution::new(nv, nv, 0, 0);
        let matrix = KktMatrix::new(nv, 0, 0);
        let residual = KktResidual::new(nv, 0, 0);
        (robot, s, s_next, matrix, residual)
    }

    #[test]
    fn forward_euler_residual_matches_closed_form() {
        let nv = 3;
        let (robot, mut s, mut s_next, mut matrix, mut residual) = fixture(nv);
        s.q.as_view_mut().copy_from(&DVector::from_vec(vec![0.1, 0.2, 0.3]));
        s.v.as_view_mut().copy_from(&DVector::from_vec(vec![1.0, -1.0, 0.5]));
        s.a.as_view_mut().copy_from(&DVector::from_vec(vec![0.0, 0.0, 0.0]));
        s_next.q.as_view_mut().copy_from(&DVector::from_vec(vec![0.2, 0.0, 0.35]));
        s_next.v.as_view_mut().copy_from(&DVector::from_vec(vec![1.0, -1.0, 0.5]));

        let dtau = 0.1;
        let eq = StateEquation;
        eq.linearize_forward_euler(&robot, dtau, &s, &s_next, &mut matrix, &mut residual);

        let expected_fq = &s.q.as_view().clone_owned() + dtau * s.v.as_view() - s_next.q.as_view();
        assert!((residual.fq.as_view() - expected_fq.as_view()).abs().max() < 1e-12);
        let identity = DMatrix::<f64>::identity(nv, nv);
        assert!((matrix.fqq.view().clone_owned() - identity).abs().max() < 1e-12);
    }

    #[test]
    fn violation_l1_norm_is_fq_fv_sum() {
        let nv = 2;
        let (robot, mut s, mut s_next, mut matrix, mut residual) = fixture(nv);
        s.q.as_view_mut().copy_from(&DVector::from_vec(vec![1.0, 1.0]));
        s.v.as_view_mut().copy_from(&DVector::from_vec(vec![2.0, -2.0]));
        let dtau = 0.2;
        let eq = StateEquation;
        eq.linearize_forward_euler(&robot, dtau, &s, &s_next, &mut matrix, &mut residual);
        let expected = residual.fq.as_view().iter().map(|v| v.abs()).sum::<f64>()
            + residual.fv.as_view().iter().map(|v| v.abs()).sum::<f64>();
        assert!((eq.violation_l1_norm(&residual) - expected).abs() < 1e-12);
        let _ = &mut s_next;
    }
}
