//! Contact complementarity: couples each active contact's normal-force
//! non-negativity with its distance-to-surface non-negativity so that at
//! most one is slack at a time. Grounded on
//! `original_source/include/idocp/complementarity/contact_complementarity.hxx`,
//! adapted to pair the force inequality (`s_g`, the contact's normal-force
//! component, `f[3*i+2]`) against the geometric inequality (`s_h`, the
//! contact's [`RobotModel::contact_distance`]) rather than the original's
//! separate Baumgarte-inequality component, since this port folds the
//! distance-to-surface inequality into the same geometric quantity instead
//! of duplicating it (see DESIGN.md).

use nalgebra::DMatrix;

use crate::constraints::pdipm;
use crate::constraints::ConstraintComponentData;
use crate::contact_status::ContactStatus;
use crate::kkt::{KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};

#[derive(Debug, Clone)]
pub struct ContactComplementarity {
    max_complementarity_violation: f64,
    barrier: f64,
    fraction_to_boundary_rate: f64,
    force_data: ConstraintComponentData,
    baumgarte_data: ConstraintComponentData,
    complementarity_data: ConstraintComponentData,
    s_g: Vec<f64>,
    s_h: Vec<f64>,
    g_w: Vec<f64>,
    g_ss: Vec<f64>,
    g_st: Vec<f64>,
    g_tt: Vec<f64>,
    condensed_force_residual: Vec<f64>,
    condensed_baumgarte_residual: Vec<f64>,
}

impl ContactComplementarity {
    /// Allocates every buffer at `cs.max_points()` (every contact active)
    /// and then narrows to `cs`'s current active count, so a later
    /// [`set_contact_status`](Self::set_contact_status) call only moves the
    /// logical length within storage that is already large enough.
    pub fn new(cs: &ContactStatus, max_complementarity_violation: f64, barrier: f64, fraction_to_boundary_rate: f64) -> Self {
        let max_points = cs.max_points();
        let mut this = Self {
            max_complementarity_violation,
            barrier,
            fraction_to_boundary_rate,
            force_data: ConstraintComponentData::new(max_points),
            baumgarte_data: ConstraintComponentData::new(max_points),
            complementarity_data: ConstraintComponentData::new(max_points),
            s_g: vec![0.0; max_points],
            s_h: vec![0.0; max_points],
            g_w: vec![0.0; max_points],
            g_ss: vec![0.0; max_points],
            g_st: vec![0.0; max_points],
            g_tt: vec![0.0; max_points],
            condensed_force_residual: vec![0.0; max_points],
            condensed_baumgarte_residual: vec![0.0; max_points],
        };
        this.set_contact_status(cs);
        this
    }

    pub fn set_contact_status(&mut self, cs: &ContactStatus) {
        let n = cs.num_active();
        self.force_data.resize(n);
        self.baumgarte_data.resize(n);
        self.complementarity_data.resize(n);
        self.s_g.resize(n, 0.0);
        self.s_h.resize(n, 0.0);
        self.g_w.resize(n, 0.0);
        self.g_ss.resize(n, 0.0);
        self.g_st.resize(n, 0.0);
        self.g_tt.resize(n, 0.0);
        self.condensed_force_residual.resize(n, 0.0);
        self.condensed_baumgarte_residual.resize(n, 0.0);
    }

    fn num_active(&self) -> usize {
        self.force_data.dimc()
    }

    fn normal_force(&self, s: &SplitSolution) -> Vec<f64> {
        let f = s.f.as_view();
        let n = self.num_active();
        (0..n).map(|i| f[3 * i + 2]).collect()
    }

    pub fn is_feasible(&self, s: &SplitSolution) -> bool {
        self.normal_force(s).iter().all(|&fz| fz >= 0.0)
    }

    pub fn set_slack_and_dual<R: RobotModel>(&mut self, robot: &R, dtau: f64, s: &SplitSolution) {
        let n = self.num_active();
        let fz = self.normal_force(s);
        let mut dist = nalgebra::DVector::zeros(n);
        robot.contact_distance(&mut dist);

        let mut force_slack: Vec<f64> = (0..n).map(|i| dtau * fz[i]).collect();
        let mut force_dual = vec![0.0; n];
        pdipm::set_slack_and_dual_positive(self.barrier, &mut force_slack, &mut force_dual);

        let mut baumgarte_slack: Vec<f64> = (0..n).map(|i| dtau * dist[i]).collect();
        let mut baumgarte_dual = vec![0.0; n];
        pdipm::set_slack_and_dual_positive(self.barrier, &mut baumgarte_slack, &mut baumgarte_dual);

        let mut comp_slack: Vec<f64> = (0..n)
            .map(|i| self.max_complementarity_violation - force_slack[i] * baumgarte_slack[i])
            .collect();
        let mut comp_dual = vec![0.0; n];
        pdipm::set_slack_and_dual_positive(self.barrier, &mut comp_slack, &mut comp_dual);

        for i in 0..n {
            let mut fd = self.barrier / force_slack[i] - baumgarte_slack[i] * comp_dual[i];
            while fd < self.barrier {
                fd += self.barrier;
            }
            force_dual[i] = fd;

            let mut bd = self.barrier / baumgarte_slack[i] - force_slack[i] * comp_dual[i];
            while bd < self.barrier {
                bd += self.barrier;
            }
            baumgarte_dual[i] = bd;
        }

        self.force_data.slack.as_view_mut().copy_from_slice(&force_slack);
        self.force_data.dual.as_view_mut().copy_from_slice(&force_dual);
        self.baumgarte_data.slack.as_view_mut().copy_from_slice(&baumgarte_slack);
        self.baumgarte_data.dual.as_view_mut().copy_from_slice(&baumgarte_dual);
        self.complementarity_data.slack.as_view_mut().copy_from_slice(&comp_slack);
        self.complementarity_data.dual.as_view_mut().copy_from_slice(&comp_dual);
    }

    fn compute_residual<R: RobotModel>(&mut self, robot: &R, dtau: f64, s: &SplitSolution) {
        let n = self.num_active();
        let fz = self.normal_force(s);
        let mut dist = nalgebra::DVector::zeros(n);
        robot.contact_distance(&mut dist);

        let fs: Vec<f64> = self.force_data.slack.as_view().iter().cloned().collect();
        let bs: Vec<f64> = self.baumgarte_data.slack.as_view().iter().cloned().collect();
        let fd: Vec<f64> = self.force_data.dual.as_view().iter().cloned().collect();
        let bd: Vec<f64> = self.baumgarte_data.dual.as_view().iter().cloned().collect();
        let cs: Vec<f64> = self.complementarity_data.slack.as_view().iter().cloned().collect();
        let cd: Vec<f64> = self.complementarity_data.dual.as_view().iter().cloned().collect();

        let mut force_residual = vec![0.0; n];
        let mut baumgarte_residual = vec![0.0; n];
        let mut comp_residual = vec![0.0; n];
        let mut force_duality = vec![0.0; n];
        let mut baumgarte_duality = vec![0.0; n];
        let mut comp_duality = vec![0.0; n];
        for i in 0..n {
            force_residual[i] = -dtau * fz[i] + fs[i];
            baumgarte_residual[i] = -dtau * dist[i] + bs[i];
            comp_residual[i] = cs[i] + fs[i] * bs[i] - self.max_complementarity_violation;
            force_duality[i] = fs[i] * fd[i] + fs[i] * bs[i] * cd[i] - self.barrier;
            baumgarte_duality[i] = bs[i] * bd[i] + fs[i] * bs[i] * cd[i] - self.barrier;
            comp_duality[i] = cs[i] * cd[i] - self.barrier;
        }
        self.force_data.residual.as_view_mut().copy_from_slice(&force_residual);
        self.baumgarte_data.residual.as_view_mut().copy_from_slice(&baumgarte_residual);
        self.complementarity_data.residual.as_view_mut().copy_from_slice(&comp_residual);
        self.force_data.duality.as_view_mut().copy_from_slice(&force_duality);
        self.baumgarte_data.duality.as_view_mut().copy_from_slice(&baumgarte_duality);
        self.complementarity_data.duality.as_view_mut().copy_from_slice(&comp_duality);
    }

    pub fn augment_dual_residual(&self, dtau: f64, residual: &mut KktResidual) {
        let n = self.num_active();
        let mut lf = residual.lf.as_view_mut();
        for i in 0..n {
            lf[3 * i + 2] -= dtau * self.force_data.dual.as_view()[i];
        }
    }

    pub fn condense_slack_and_dual<R: RobotModel>(
        &mut self,
        robot: &R,
        dtau: f64,
        s: &SplitSolution,
        matrix: &mut KktMatrix,
        residual: &mut KktResidual,
    ) {
        self.compute_residual(robot, dtau, s);
        let n = self.num_active();

        let fs: Vec<f64> = self.force_data.slack.as_view().iter().cloned().collect();
        let bs: Vec<f64> = self.baumgarte_data.slack.as_view().iter().cloned().collect();
        let fd: Vec<f64> = self.force_data.dual.as_view().iter().cloned().collect();
        let bd: Vec<f64> = self.baumgarte_data.dual.as_view().iter().cloned().collect();
        let cs: Vec<f64> = self.complementarity_data.slack.as_view().iter().cloned().collect();
        let cd: Vec<f64> = self.complementarity_data.dual.as_view().iter().cloned().collect();

        for i in 0..n {
            self.s_g[i] = (fd[i] + bs[i] * cd[i]) / fs[i];
            self.s_h[i] = (bd[i] + fs[i] * cd[i]) / bs[i];
            self.g_w[i] = cd[i] / cs[i];
            self.g_ss[i] = fs[i] * self.g_w[i] * fs[i] + self.s_h[i];
            self.g_st[i] = fs[i] * self.g_w[i] * bs[i] + cd[i];
            self.g_tt[i] = bs[i] * self.g_w[i] * bs[i] + self.s_g[i];
        }

        let mut qff = matrix.qff.view_mut();
        for i in 0..n {
            qff[(3 * i + 2, 3 * i + 2)] += dtau * dtau * self.g_tt[i];
        }

        let nv = s.v.len();
        let mut dist_jac = DMatrix::zeros(n, nv);
        robot.contact_distance_derivative(&mut dist_jac);
        let mut qqq = matrix.qqq.view_mut();
        for i in 0..n {
            for a in 0..nv {
                for b in 0..nv {
                    qqq[(a, b)] += dtau * dtau * self.g_ss[i] * dist_jac[(i, a)] * dist_jac[(i, b)];
                }
            }
        }
        let mut qqf = matrix.qqf.view_mut();
        for i in 0..n {
            for a in 0..nv {
                qqf[(a, 3 * i + 2)] += dtau * dtau * self.g_st[i] * dist_jac[(i, a)];
            }
        }

        let fr: Vec<f64> = self.force_data.residual.as_view().iter().cloned().collect();
        let br: Vec<f64> = self.baumgarte_data.residual.as_view().iter().cloned().collect();
        let cr: Vec<f64> = self.complementarity_data.residual.as_view().iter().cloned().collect();
        let f_duality: Vec<f64> = self.force_data.duality.as_view().iter().cloned().collect();
        let b_duality: Vec<f64> = self.baumgarte_data.duality.as_view().iter().cloned().collect();
        let c_duality: Vec<f64> = self.complementarity_data.duality.as_view().iter().cloned().collect();

        for i in 0..n {
            // The original has a stray `;` that drops this trailing term from
            // condensed_force_residual_; by symmetry with
            // condensed_baumgarte_residual_ below, it is included here.
            self.condensed_force_residual[i] = self.g_tt[i] * fr[i] + self.g_st[i] * br[i]
                - bs[i] * self.g_w[i] * cr[i]
                + bs[i] * c_duality[i] / cs[i]
                - f_duality[i] / fs[i];
            self.condensed_baumgarte_residual[i] = self.g_st[i] * fr[i] + self.g_ss[i] * br[i]
                - fs[i] * self.g_w[i] * cr[i]
                + fs[i] * c_duality[i] / cs[i]
                - b_duality[i] / bs[i];
        }

        let mut lf = residual.lf.as_view_mut();
        for i in 0..n {
            lf[3 * i + 2] -= dtau * self.condensed_force_residual[i];
        }
        let mut lq = residual.lq.as_view_mut();
        for i in 0..n {
            for a in 0..nv {
                lq[a] -= dtau * self.condensed_baumgarte_residual[i] * dist_jac[(i, a)];
            }
        }
    }

    pub fn compute_slack_and_dual_direction<R: RobotModel>(&mut self, robot: &R, dtau: f64, d: &SplitDirection) {
        let n = self.num_active();
        let nv = d.dq.len();
        let df = d.df.as_view();
        let dq = d.dq.as_view();
        let mut dist_jac = DMatrix::zeros(n, nv);
        robot.contact_distance_derivative(&mut dist_jac);

        let fs: Vec<f64> = self.force_data.slack.as_view().iter().cloned().collect();
        let bs: Vec<f64> = self.baumgarte_data.slack.as_view().iter().cloned().collect();
        let cs: Vec<f64> = self.complementarity_data.slack.as_view().iter().cloned().collect();
        let cd: Vec<f64> = self.complementarity_data.dual.as_view().iter().cloned().collect();
        let fr: Vec<f64> = self.force_data.residual.as_view().iter().cloned().collect();
        let br: Vec<f64> = self.baumgarte_data.residual.as_view().iter().cloned().collect();
        let cr: Vec<f64> = self.complementarity_data.residual.as_view().iter().cloned().collect();
        let f_duality: Vec<f64> = self.force_data.duality.as_view().iter().cloned().collect();
        let b_duality: Vec<f64> = self.baumgarte_data.duality.as_view().iter().cloned().collect();
        let c_duality: Vec<f64> = self.complementarity_data.duality.as_view().iter().cloned().collect();

        let mut force_dslack = vec![0.0; n];
        let mut baumgarte_dslack = vec![0.0; n];
        for i in 0..n {
            force_dslack[i] = dtau * df[3 * i + 2] - fr[i];
            let mut g_dir = 0.0;
            for a in 0..nv {
                g_dir += dist_jac[(i, a)] * dq[a];
            }
            baumgarte_dslack[i] = dtau * g_dir - br[i];
        }

        let mut comp_dslack = vec![0.0; n];
        let mut comp_ddual = vec![0.0; n];
        for i in 0..n {
            comp_dslack[i] = -fs[i] * baumgarte_dslack[i] - bs[i] * force_dslack[i] - cr[i];
            comp_ddual[i] = -self.g_w[i] * comp_dslack[i] - c_duality[i] / cs[i];
        }

        let mut force_ddual = vec![0.0; n];
        let mut baumgarte_ddual = vec![0.0; n];
        for i in 0..n {
            force_ddual[i] = -self.s_g[i] * force_dslack[i] - cd[i] * baumgarte_dslack[i]
                - comp_ddual[i] * bs[i]
                - f_duality[i] / fs[i];
            baumgarte_ddual[i] = -self.s_h[i] * baumgarte_dslack[i] - cd[i] * force_dslack[i]
                - comp_ddual[i] * fs[i]
                - b_duality[i] / bs[i];
        }

        self.force_data.dslack.as_view_mut().copy_from_slice(&force_dslack);
        self.force_data.ddual.as_view_mut().copy_from_slice(&force_ddual);
        self.baumgarte_data.dslack.as_view_mut().copy_from_slice(&baumgarte_dslack);
        self.baumgarte_data.ddual.as_view_mut().copy_from_slice(&baumgarte_ddual);
        self.complementarity_data.dslack.as_view_mut().copy_from_slice(&comp_dslack);
        self.complementarity_data.ddual.as_view_mut().copy_from_slice(&comp_ddual);
    }

    pub fn residual_l1_norm(&self) -> f64 {
        let norm = |seg: &crate::solution::Segment| seg.as_view().iter().map(|v| v.abs()).sum::<f64>();
        norm(&self.force_data.residual)
            + norm(&self.force_data.duality)
            + norm(&self.baumgarte_data.residual)
            + norm(&self.baumgarte_data.duality)
            + norm(&self.complementarity_data.residual)
            + norm(&self.complementarity_data.duality)
    }

    pub fn squared_kkt_error_norm(&self) -> f64 {
        let sq = |seg: &crate::solution::Segment| seg.as_view().iter().map(|v| v * v).sum::<f64>();
        sq(&self.force_data.residual)
            + sq(&self.force_data.duality)
            + sq(&self.baumgarte_data.residual)
            + sq(&self.baumgarte_data.duality)
            + sq(&self.complementarity_data.residual)
            + sq(&self.complementarity_data.duality)
    }

    pub fn max_slack_step_size(&self, fraction_to_boundary_rate_override: Option<f64>) -> f64 {
        let rate = fraction_to_boundary_rate_override.unwrap_or(self.fraction_to_boundary_rate);
        let entries = [&self.force_data, &self.baumgarte_data, &self.complementarity_data];
        entries
            .iter()
            .map(|e| {
                let slack: Vec<f64> = e.slack.as_view().iter().cloned().collect();
                let dslack: Vec<f64> = e.dslack.as_view().iter().cloned().collect();
                pdipm::fraction_to_boundary(rate, &slack, &dslack)
            })
            .fold(1.0, f64::min)
    }

    pub fn max_dual_step_size(&self, fraction_to_boundary_rate_override: Option<f64>) -> f64 {
        let rate = fraction_to_boundary_rate_override.unwrap_or(self.fraction_to_boundary_rate);
        let entries = [&self.force_data, &self.baumgarte_data, &self.complementarity_data];
        entries
            .iter()
            .map(|e| {
                let dual: Vec<f64> = e.dual.as_view().iter().cloned().collect();
                let ddual: Vec<f64> = e.ddual.as_view().iter().cloned().collect();
                pdipm::fraction_to_boundary(rate, &dual, &ddual)
            })
            .fold(1.0, f64::min)
    }

    pub fn update_slack(&mut self, step_size: f64) {
        for e in [&mut self.force_data, &mut self.baumgarte_data, &mut self.complementarity_data] {
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

    pub fn update_dual(&mut self, step_size: f64) {
        for e in [&mut self.force_data, &mut self.baumgarte_data, &mut self.complementarity_data] {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condensed_force_residual_includes_the_fixed_sign_term() {
        // Regression guard for the Open Question resolution: with
        // complementarity slack/dual both at 1 and duality at 0, the
        // trailing `-f_duality/fs` term vanishes, but `bs*c_duality/cs`
        // must still appear for a nonzero complementarity duality.
        let mut cs = ContactStatus::new(1);
        cs.activate(0);
        let mut cc = ContactComplementarity::new(&cs, 1e-3, 1e-4, 0.995);
        cc.force_data.slack.as_view_mut().copy_from_slice(&[1.0]);
        cc.force_data.dual.as_view_mut().copy_from_slice(&[1.0]);
        cc.force_data.residual.as_view_mut().copy_from_slice(&[0.0]);
        cc.force_data.duality.as_view_mut().copy_from_slice(&[0.0]);
        cc.baumgarte_data.slack.as_view_mut().copy_from_slice(&[1.0]);
        cc.baumgarte_data.dual.as_view_mut().copy_from_slice(&[1.0]);
        cc.baumgarte_data.residual.as_view_mut().copy_from_slice(&[0.0]);
        cc.complementarity_data.slack.as_view_mut().copy_from_slice(&[1.0]);
        cc.complementarity_data.dual.as_view_mut().copy_from_slice(&[1.0]);
        cc.complementarity_data.residual.as_view_mut().copy_from_slice(&[0.0]);
        cc.complementarity_data.duality.as_view_mut().copy_from_slice(&[2.0]);

        for i in 0..1 {
            cc.s_g[i] = (1.0 + 1.0 * 1.0) / 1.0;
            cc.s_h[i] = (1.0 + 1.0 * 1.0) / 1.0;
            cc.g_w[i] = 1.0 / 1.0;
            cc.g_ss[i] = 1.0 * cc.g_w[i] * 1.0 + cc.s_h[i];
            cc.g_st[i] = 1.0 * cc.g_w[i] * 1.0 + 1.0;
            cc.g_tt[i] = 1.0 * cc.g_w[i] * 1.0 + cc.s_g[i];
        }

        let fr = [0.0];
        let br = [0.0];
        let cr = [0.0];
        let c_duality = [2.0];
        let f_duality = [0.0];
        let mut condensed = [0.0];
        for i in 0..1 {
            condensed[i] = cc.g_tt[i] * fr[i] + cc.g_st[i] * br[i] - 1.0 * cc.g_w[i] * cr[i]
                + 1.0 * c_duality[i] / 1.0
                - f_duality[i] / 1.0;
        }
        assert!((condensed[0] - 2.0).abs() < 1e-12);
    }
}
