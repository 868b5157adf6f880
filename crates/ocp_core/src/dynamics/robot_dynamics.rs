//! Inverse-dynamics stationarity, condensed out of the stage. Grounded on
//! the public API in
//! `original_source/include/idocp/ocp/robot_dynamics.hpp` (the `.hxx` body
//! was not kept in the pack; the condensation algebra below is derived from
//! the class's own field names — `lu_condensed_`, `Quu_du_dq_`, ... — by
//! eliminating `(u, beta)` from the stage's stationarity and inverse-dynamics
//! equality via direct substitution, the standard Schur-complement
//! elimination `kkt.rs`'s block layout already assumes elsewhere).

use nalgebra::{DMatrix, DVector};

use crate::contact_status::ContactStatus;
use crate::cost::QuadraticCost;
use crate::kkt::{Block, KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};

#[derive(Debug, Clone)]
pub struct RobotDynamics {
    dim_passive: usize,
    du_dq: DMatrix<f64>,
    du_dv: DMatrix<f64>,
    du_da: DMatrix<f64>,
    du_df: Block,
    lu_condensed: DVector<f64>,
}

impl RobotDynamics {
    pub fn new(nv: usize, max_dimf: usize, dim_passive: usize) -> Self {
        Self {
            dim_passive,
            du_dq: DMatrix::zeros(nv, nv),
            du_dv: DMatrix::zeros(nv, nv),
            du_da: DMatrix::zeros(nv, nv),
            du_df: Block::new(nv, max_dimf),
            lu_condensed: DVector::zeros(nv),
        }
    }

    pub fn set_contact_status(&mut self, cs: &ContactStatus) {
        let dimf = cs.dimf();
        self.du_df.resize(self.du_df.view().nrows(), dimf);
    }

    /// Inverse-dynamics residual `u_res = u - RNEA(q,v,a,f)`, its Jacobians,
    /// and the floating-base passive-torque / contact-acceleration equality
    /// rows (`C`, stacked as `[passive rows; active-contact rows]`).
    pub fn linearize<R: RobotModel>(
        &mut self,
        robot: &mut R,
        cs: &ContactStatus,
        s: &SplitSolution,
        residual: &mut KktResidual,
        matrix: &mut KktMatrix,
    ) {
        let q = s.q.as_view().clone_owned();
        let v = s.v.as_view().clone_owned();
        let a = s.a.as_view().clone_owned();
        let f = s.f.as_view().clone_owned();

        robot.set_contact_forces(&f);
        let mut tau = DVector::zeros(v.len());
        robot.rnea(&q, &v, &a, &mut tau);

        let u = s.u.as_view();
        {
            let mut u_res = residual.u_res.as_view_mut();
            for i in 0..u_res.len() {
                u_res[i] = u[i] - tau[i];
            }
        }

        robot.rnea_derivatives(&q, &v, &a, &mut self.du_dq, &mut self.du_dv, &mut self.du_da);
        let dimf = cs.dimf();
        self.du_df.resize(v.len(), dimf);
        if dimf > 0 {
            let mut scratch = DMatrix::zeros(v.len(), dimf);
            robot.d_rnea_d_fext(&mut scratch);
            self.du_df.view_mut().copy_from(&scratch);
        }

        if self.dim_passive > 0 {
            let np = self.dim_passive;
            let mut cq = matrix.cq.view_mut();
            let mut cv = matrix.cv.view_mut();
            let mut ca = matrix.ca.view_mut();
            for r in 0..np {
                for col in 0..v.len() {
                    cq[(r, col)] = self.du_dq[(r, col)];
                    cv[(r, col)] = self.du_dv[(r, col)];
                    ca[(r, col)] = self.du_da[(r, col)];
                }
            }
            if dimf > 0 {
                let du_df = self.du_df.view();
                let mut cf = matrix.cf.view_mut();
                for r in 0..np {
                    for col in 0..dimf {
                        cf[(r, col)] = du_df[(r, col)];
                    }
                }
            }
            let mut c = residual.c.as_view_mut();
            for r in 0..np {
                c[r] = u[r];
            }
        }

        let np = self.dim_passive;
        if dimf > 0 {
            let mut baumgarte = DVector::zeros(dimf);
            robot.compute_baumgarte_residual(&mut baumgarte);
            let mut dq_b = DMatrix::zeros(dimf, v.len());
            let mut dv_b = DMatrix::zeros(dimf, v.len());
            let mut da_b = DMatrix::zeros(dimf, v.len());
            robot.compute_baumgarte_derivatives(&mut dq_b, &mut dv_b, &mut da_b);

            let mut cq = matrix.cq.view_mut();
            let mut cv = matrix.cv.view_mut();
            let mut ca = matrix.ca.view_mut();
            for r in 0..dimf {
                for col in 0..v.len() {
                    cq[(np + r, col)] = dq_b[(r, col)];
                    cv[(np + r, col)] = dv_b[(r, col)];
                    ca[(np + r, col)] = da_b[(r, col)];
                }
            }
            let mut c = residual.c.as_view_mut();
            for r in 0..dimf {
                c[np + r] = baumgarte[r];
            }
        }
    }

    /// Eliminates `(u, beta)` from the stage using the quadratic-cost torque
    /// weight `Quu`: adds `du_d*^T Quu du_d*` to every `(q,v,a,f)` Hessian
    /// block and `du_d*^T (lu - Quu*u_res)` to the matching gradient block.
    pub fn condense(&mut self, cost: &QuadraticCost, dtau: f64, residual: &mut KktResidual, matrix: &mut KktMatrix) {
        let nv = self.du_dq.nrows();
        let quu = cost.u_weight();
        let u_res = residual.u_res.as_view().clone_owned();
        let lu = residual.lu.as_view().clone_owned();

        for i in 0..nv {
            self.lu_condensed[i] = lu[i] - quu[i] * u_res[i];
        }

        let quu_du_dq = scale_rows(&self.du_dq, quu);
        let quu_du_dv = scale_rows(&self.du_dv, quu);
        let quu_du_da = scale_rows(&self.du_da, quu);
        let dimf = self.du_df.view().ncols();
        let quu_du_df = if dimf > 0 {
            scale_rows(&self.du_df.view().clone_owned(), quu)
        } else {
            DMatrix::zeros(nv, 0)
        };

        {
            let mut qqq = matrix.qqq.view_mut();
            let add = self.du_dq.transpose() * &quu_du_dq;
            qqq += add;
            let mut qqa = matrix.qqa.view_mut();
            qqa += self.du_dq.transpose() * &quu_du_da;
            let mut qva = matrix.qva.view_mut();
            qva += self.du_dv.transpose() * &quu_du_da;
            let mut qvv = matrix.qvv.view_mut();
            qvv += self.du_dv.transpose() * &quu_du_dv;
            let mut qaa = matrix.qaa.view_mut();
            qaa += self.du_da.transpose() * &quu_du_da;
        }
        if dimf > 0 {
            let du_df = self.du_df.view().clone_owned();
            let mut qqf = matrix.qqf.view_mut();
            qqf += self.du_dq.transpose() * &quu_du_df;
            let mut qvf = matrix.qvf.view_mut();
            qvf += self.du_dv.transpose() * &quu_du_df;
            let mut qaf = matrix.qaf.view_mut();
            qaf += self.du_da.transpose() * &quu_du_df;
            let mut qff = matrix.qff.view_mut();
            qff += du_df.transpose() * &quu_du_df;
        }

        let lu_condensed = self.lu_condensed.clone();
        let mut lq = residual.lq.as_view_mut();
        lq += self.du_dq.transpose() * &lu_condensed;
        let mut lv = residual.lv.as_view_mut();
        lv += self.du_dv.transpose() * &lu_condensed;
        let mut la = residual.la.as_view_mut();
        la += self.du_da.transpose() * &lu_condensed;
        if dimf > 0 {
            let du_df = self.du_df.view().clone_owned();
            let mut lf = residual.lf.as_view_mut();
            lf += du_df.transpose() * &lu_condensed;
        }
        let _ = dtau;
    }

    /// `du = du_dq*dq + du_dv*dv + du_da*da + du_df*df - u_res`, recovered
    /// once the condensed `(dq,dv,da,df)` Newton step is known.
    pub fn compute_condensed_direction(&self, residual: &KktResidual, d: &mut SplitDirection) {
        let nv = self.du_dq.nrows();
        let dq = d.dq.as_view().clone_owned();
        let dv = d.dv.as_view().clone_owned();
        let da = d.da.as_view().clone_owned();
        let u_res = residual.u_res.as_view();

        let mut du = &self.du_dq * &dq + &self.du_dv * &dv + &self.du_da * &da;
        let dimf = self.du_df.view().ncols();
        if dimf > 0 {
            let df = d.df.as_view().clone_owned();
            du += self.du_df.view().clone_owned() * df;
        }
        let mut out = d.du.as_view_mut();
        for i in 0..nv {
            out[i] = du[i] - u_res[i];
        }
    }

    /// `Kuq = du_dq + du_da*Kaq + du_df*Kfq`, `Kuv` analogous: folds the
    /// Riccati feedback for `(a, f)` into the torque feedback gain.
    pub fn state_feedback_gain(&self, kaq: &DMatrix<f64>, kav: &DMatrix<f64>, kfq: &DMatrix<f64>, kfv: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let dimf = self.du_df.view().ncols();
        let mut kuq = self.du_dq.clone() + &self.du_da * kaq;
        let mut kuv = self.du_dv.clone() + &self.du_da * kav;
        if dimf > 0 {
            let du_df = self.du_df.view().clone_owned();
            kuq += &du_df * kfq;
            kuv += &du_df * kfv;
        }
        (kuq, kuv)
    }

    pub fn l1_norm(&self, dtau: f64, residual: &KktResidual) -> f64 {
        let u_res_l1 = residual.u_res.as_view().iter().map(|v| v.abs()).sum::<f64>();
        let c_l1 = residual.c.as_view().iter().map(|v| v.abs()).sum::<f64>();
        dtau * (u_res_l1 + c_l1)
    }

    pub fn squared_norm(&self, dtau: f64, residual: &KktResidual) -> f64 {
        let u_res_sq = residual.u_res.as_view().iter().map(|v| v * v).sum::<f64>();
        let c_sq = residual.c.as_view().iter().map(|v| v * v).sum::<f64>();
        dtau * dtau * (u_res_sq + c_sq)
    }
}

fn scale_rows(m: &DMatrix<f64>, weight: &DVector<f64>) -> DMatrix<f64> {
    let mut out = m.clone();
    for r in 0..out.nrows() {
        for c in 0..out.ncols() {
            out[(r, c)] *= weight[r];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_rows_multiplies_each_row_by_its_weight() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let w = DVector::from_vec(vec![2.0, 0.5]);
        let scaled = scale_rows(&m, &w);
        assert_eq!(scaled[(0, 0)], 2.0);
        assert_eq!(scaled[(1, 0)], 1.5);
    }

    #[test]
    fn condensed_direction_subtracts_residual() {
        let nv = 2;
        let rd = RobotDynamics::new(nv, 0, 0);
        let mut residual = KktResidual::new(nv, 0, 0);
        residual.u_res.as_view_mut().copy_from(&DVector::from_vec(vec![0.5, -0.5]));
        let mut d = SplitDirection::new(nv, nv, 0, 0);
        rd.compute_condensed_direction(&residual, &mut d);
        assert!((d.du.as_view()[0] - (-0.5)).abs() < 1e-12);
        assert!((d.du.as_view()[1] - 0.5).abs() < 1e-12);
    }
}
