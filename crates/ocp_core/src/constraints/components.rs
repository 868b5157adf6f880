//! Concrete inequality components as a sum type, replacing the original's
//! deep class hierarchy of constraint subclasses. Each variant carries just
//! the data the original's corresponding subclass stored as fields
//! (`qmin_`, `dimc_`, ...); the shared capability set is implemented as one
//! `match` per method rather than a vtable, since the kind set is closed
//! and known at compile time.

use nalgebra::{DMatrix, DVector};

use crate::contact_status::ContactStatus;
use crate::kkt::{KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};

use super::data::ConstraintComponentData;
use super::pdipm;

/// Which stage segment a joint-bound component reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointAxis {
    Q,
    V,
    U,
}

/// One-sided affine joint bound: `sign * (x_tail[i] - bound[i]) >= 0`.
/// `sign = 1` encodes a lower limit (`bound = qmin`), `sign = -1` an upper
/// limit (`bound = qmax`), matching
/// `original_source/src/constraints/joint_position_lower_limit.cpp`
/// generalized to `v` and `u` and to the opposite sign.
#[derive(Debug, Clone)]
pub struct JointBound {
    pub axis: JointAxis,
    pub bound: DVector<f64>,
    pub sign: f64,
}

impl JointBound {
    pub fn dimc(&self) -> usize {
        self.bound.len()
    }

    fn tail(&self, s: &SplitSolution) -> DVector<f64> {
        let seg = match self.axis {
            JointAxis::Q => &s.q,
            JointAxis::V => &s.v,
            JointAxis::U => &s.u,
        };
        let n = seg.len();
        let k = self.dimc();
        seg.as_view().rows(n - k, k).clone_owned()
    }

    fn tail_direction(&self, d: &SplitDirection) -> DVector<f64> {
        let seg = match self.axis {
            JointAxis::Q => &d.dq,
            JointAxis::V => &d.dv,
            JointAxis::U => &d.du,
        };
        let n = seg.len();
        let k = self.dimc();
        seg.as_view().rows(n - k, k).clone_owned()
    }

    fn residual_block_mut<'a>(&self, residual: &'a mut KktResidual) -> nalgebra::DVectorViewMut<'a, f64> {
        let seg = match self.axis {
            JointAxis::Q => &mut residual.lq,
            JointAxis::V => &mut residual.lv,
            JointAxis::U => &mut residual.lu,
        };
        let n = seg.len();
        let k = self.dimc();
        seg.as_view_mut().rows_mut(n - k, k)
    }
}

/// Linearized (pyramidal) friction cone facets, `mu*fz ± fx >= 0` and
/// `mu*fz ± fy >= 0` per active contact: four half-space facets
/// approximating the circular cone, in place of the original's
/// normal-force-only non-negativity check
/// (`original_source/include/idocp/contact_complementarity/contact_normal_force.hxx`).
#[derive(Debug, Clone)]
pub struct FrictionCone {
    pub mu: f64,
}

impl FrictionCone {
    const FACETS: usize = 4;

    fn facet(mu: f64, k: usize) -> [f64; 3] {
        match k {
            0 => [-1.0, 0.0, mu],
            1 => [1.0, 0.0, mu],
            2 => [0.0, -1.0, mu],
            _ => [0.0, 1.0, mu],
        }
    }

    pub fn dimc(cs: &ContactStatus) -> usize {
        Self::FACETS * cs.num_active()
    }
}

/// Contact-point distance to its supporting surface, via
/// [`RobotModel::contact_distance`].
#[derive(Debug, Clone)]
pub struct ContactDistance;

impl ContactDistance {
    pub fn dimc(cs: &ContactStatus) -> usize {
        cs.num_active()
    }
}

#[derive(Debug, Clone)]
pub enum ConstraintComponent {
    JointBound(JointBound),
    FrictionCone(FrictionCone),
    ContactDistance(ContactDistance),
}

impl ConstraintComponent {
    pub fn dimc(&self, cs: &ContactStatus) -> usize {
        match self {
            Self::JointBound(b) => b.dimc(),
            Self::FrictionCone(_) => FrictionCone::dimc(cs),
            Self::ContactDistance(_) => ContactDistance::dimc(cs),
        }
    }

    /// Upper bound on [`dimc`](Self::dimc) over every contact status `cs`
    /// could ever take on (i.e. with every contact active): the size to
    /// allocate storage at so later activation never needs a reallocation,
    /// only a logical [`ConstraintComponentData::resize`].
    pub fn max_dimc(&self, cs: &ContactStatus) -> usize {
        match self {
            Self::JointBound(b) => b.dimc(),
            Self::FrictionCone(_) => FrictionCone::FACETS * cs.max_points(),
            Self::ContactDistance(_) => cs.max_points(),
        }
    }

    /// Strict primal feasibility, used to reject an initial iterate before
    /// slack lifting. `ContactDistance` always reports feasible
    /// here since evaluating it needs `&mut RobotModel` for kinematics,
    /// which this read-only check does not have; its true feasibility is
    /// recovered by slack lifting in `set_slack_and_dual` regardless.
    pub fn is_feasible(&self, s: &SplitSolution) -> bool {
        match self {
            Self::JointBound(b) => {
                let tail = b.tail(s);
                (0..b.dimc()).all(|i| b.sign * (tail[i] - b.bound[i]) >= 0.0)
            }
            Self::FrictionCone(fc) => {
                let f = s.f.as_view();
                let n = f.len() / 3;
                (0..n).all(|i| {
                    let base = 3 * i;
                    (0..FrictionCone::FACETS).all(|k| {
                        let c = FrictionCone::facet(fc.mu, k);
                        c[0] * f[base] + c[1] * f[base + 1] + c[2] * f[base + 2] >= 0.0
                    })
                })
            }
            Self::ContactDistance(_) => true,
        }
    }

    pub fn set_slack_and_dual<R: RobotModel>(
        &self,
        robot: &R,
        barrier: f64,
        dtau: f64,
        s: &SplitSolution,
        data: &mut ConstraintComponentData,
    ) {
        let mut slack_vec = vec![0.0; data.dimc()];
        match self {
            Self::JointBound(b) => {
                let tail = b.tail(s);
                for i in 0..b.dimc() {
                    slack_vec[i] = dtau * b.sign * (tail[i] - b.bound[i]);
                }
            }
            Self::FrictionCone(fc) => {
                let f = s.f.as_view();
                let n = f.len() / 3;
                for i in 0..n {
                    let base = 3 * i;
                    for k in 0..FrictionCone::FACETS {
                        let c = FrictionCone::facet(fc.mu, k);
                        let g = c[0] * f[base] + c[1] * f[base + 1] + c[2] * f[base + 2];
                        slack_vec[FrictionCone::FACETS * i + k] = dtau * g;
                    }
                }
            }
            Self::ContactDistance(_) => {
                let mut dist = DVector::zeros(data.dimc());
                robot.contact_distance(&mut dist);
                for i in 0..data.dimc() {
                    slack_vec[i] = dtau * dist[i];
                }
            }
        }
        let mut dual_vec = vec![0.0; slack_vec.len()];
        pdipm::set_slack_and_dual_positive(barrier, &mut slack_vec, &mut dual_vec);
        data.slack.as_view_mut().copy_from_slice(&slack_vec);
        data.dual.as_view_mut().copy_from_slice(&dual_vec);
    }

    pub fn augment_dual_residual<R: RobotModel>(&self, robot: &R, dtau: f64, data: &ConstraintComponentData, residual: &mut KktResidual) {
        let dual: Vec<f64> = data.dual.as_view().iter().cloned().collect();
        match self {
            Self::JointBound(b) => {
                let mut block = b.residual_block_mut(residual);
                for i in 0..b.dimc() {
                    block[i] -= b.sign * dtau * dual[i];
                }
            }
            Self::FrictionCone(fc) => {
                let n = dual.len() / FrictionCone::FACETS;
                let mut lf = residual.lf.as_view_mut();
                for i in 0..n {
                    let base = 3 * i;
                    for k in 0..FrictionCone::FACETS {
                        let c = FrictionCone::facet(fc.mu, k);
                        let dk = dual[FrictionCone::FACETS * i + k];
                        lf[base] -= dtau * dk * c[0];
                        lf[base + 1] -= dtau * dk * c[1];
                        lf[base + 2] -= dtau * dk * c[2];
                    }
                }
            }
            Self::ContactDistance(_) => {
                let dimc = dual.len();
                let nv = residual.lq.len();
                let mut jac = DMatrix::zeros(dimc, nv);
                robot.contact_distance_derivative(&mut jac);
                let mut lq = residual.lq.as_view_mut();
                for i in 0..dimc {
                    for a in 0..nv {
                        lq[a] -= dtau * dual[i] * jac[(i, a)];
                    }
                }
            }
        }
    }

    pub fn condense_slack_and_dual<R: RobotModel>(
        &self,
        robot: &R,
        barrier: f64,
        dtau: f64,
        s: &SplitSolution,
        data: &mut ConstraintComponentData,
        matrix: &mut KktMatrix,
        residual: &mut KktResidual,
    ) {
        let dimc = data.dimc();
        let slack: Vec<f64> = data.slack.as_view().iter().cloned().collect();
        let dual: Vec<f64> = data.dual.as_view().iter().cloned().collect();
        let mut residual_buf = vec![0.0; dimc];
        let mut duality_buf = vec![0.0; dimc];

        match self {
            Self::JointBound(b) => {
                let tail = b.tail(s);
                for i in 0..dimc {
                    let g = b.sign * (tail[i] - b.bound[i]);
                    residual_buf[i] = slack[i] - dtau * g;
                    duality_buf[i] = slack[i] * dual[i] - barrier;
                }
                if b.axis != JointAxis::U {
                    let block = match b.axis {
                        JointAxis::Q => &mut matrix.qqq,
                        JointAxis::V => &mut matrix.qvv,
                        JointAxis::U => unreachable!(),
                    };
                    let n = block.view().nrows();
                    let mut diag = block.view_mut();
                    for i in 0..dimc {
                        diag[(n - dimc + i, n - dimc + i)] += dtau * dtau * dual[i] / slack[i];
                    }
                }
                // The U axis's diagonal contribution is folded into Quu by
                // RobotDynamics during torque condensation instead of into
                // KktMatrix directly, since Quu is not a KktMatrix field.
                let mut lx = b.residual_block_mut(residual);
                for i in 0..dimc {
                    lx[i] -= b.sign * dtau * (dual[i] * residual_buf[i] - duality_buf[i]) / slack[i];
                }
            }
            Self::FrictionCone(fc) => {
                let f = s.f.as_view();
                let n = f.len() / 3;
                for i in 0..n {
                    let base = 3 * i;
                    for k in 0..FrictionCone::FACETS {
                        let idx = FrictionCone::FACETS * i + k;
                        let c = FrictionCone::facet(fc.mu, k);
                        let g = c[0] * f[base] + c[1] * f[base + 1] + c[2] * f[base + 2];
                        residual_buf[idx] = slack[idx] - dtau * g;
                        duality_buf[idx] = slack[idx] * dual[idx] - barrier;
                    }
                }
                let mut qff = matrix.qff.view_mut();
                let mut lf = residual.lf.as_view_mut();
                for i in 0..n {
                    let base = 3 * i;
                    for k in 0..FrictionCone::FACETS {
                        let idx = FrictionCone::FACETS * i + k;
                        let c = FrictionCone::facet(fc.mu, k);
                        let coeff = dtau * dtau * dual[idx] / slack[idx];
                        for a in 0..3 {
                            for bb in 0..3 {
                                qff[(base + a, base + bb)] += coeff * c[a] * c[bb];
                            }
                        }
                        let grad_coeff = dtau * (dual[idx] * residual_buf[idx] - duality_buf[idx]) / slack[idx];
                        lf[base] -= grad_coeff * c[0];
                        lf[base + 1] -= grad_coeff * c[1];
                        lf[base + 2] -= grad_coeff * c[2];
                    }
                }
            }
            Self::ContactDistance(_) => {
                let nv = s.v.len();
                let mut dist = DVector::zeros(dimc);
                let mut jac = DMatrix::zeros(dimc, nv);
                robot.contact_distance(&mut dist);
                robot.contact_distance_derivative(&mut jac);
                for i in 0..dimc {
                    residual_buf[i] = slack[i] - dtau * dist[i];
                    duality_buf[i] = slack[i] * dual[i] - barrier;
                }
                let mut qqq = matrix.qqq.view_mut();
                for i in 0..dimc {
                    let coeff = dtau * dtau * dual[i] / slack[i];
                    for a in 0..nv {
                        for bcol in 0..nv {
                            qqq[(a, bcol)] += coeff * jac[(i, a)] * jac[(i, bcol)];
                        }
                    }
                }
                let mut lq = residual.lq.as_view_mut();
                for i in 0..dimc {
                    let grad_coeff = dtau * (dual[i] * residual_buf[i] - duality_buf[i]) / slack[i];
                    for a in 0..nv {
                        lq[a] -= grad_coeff * jac[(i, a)];
                    }
                }
            }
        }

        data.residual.as_view_mut().copy_from_slice(&residual_buf);
        data.duality.as_view_mut().copy_from_slice(&duality_buf);
    }

    pub fn compute_slack_and_dual_direction<R: RobotModel>(
        &self,
        robot: &R,
        dtau: f64,
        data: &mut ConstraintComponentData,
        d: &SplitDirection,
    ) {
        let dimc = data.dimc();
        let residual: Vec<f64> = data.residual.as_view().iter().cloned().collect();
        let slack: Vec<f64> = data.slack.as_view().iter().cloned().collect();
        let dual: Vec<f64> = data.dual.as_view().iter().cloned().collect();
        let duality: Vec<f64> = data.duality.as_view().iter().cloned().collect();
        let mut dslack = vec![0.0; dimc];

        match self {
            Self::JointBound(b) => {
                let ddir = b.tail_direction(d);
                for i in 0..dimc {
                    dslack[i] = b.sign * dtau * ddir[i] - residual[i];
                }
            }
            Self::FrictionCone(fc) => {
                let df = d.df.as_view();
                let n = df.len() / 3;
                for i in 0..n {
                    let base = 3 * i;
                    for k in 0..FrictionCone::FACETS {
                        let c = FrictionCone::facet(fc.mu, k);
                        let g_dir = c[0] * df[base] + c[1] * df[base + 1] + c[2] * df[base + 2];
                        dslack[FrictionCone::FACETS * i + k] = dtau * g_dir - residual[FrictionCone::FACETS * i + k];
                    }
                }
            }
            Self::ContactDistance(_) => {
                let dq = d.dq.as_view();
                let nv = dq.len();
                let mut jac = DMatrix::zeros(dimc, nv);
                robot.contact_distance_derivative(&mut jac);
                for i in 0..dimc {
                    let mut g_dir = 0.0;
                    for a in 0..nv {
                        g_dir += jac[(i, a)] * dq[a];
                    }
                    dslack[i] = dtau * g_dir - residual[i];
                }
            }
        }

        let mut ddual = vec![0.0; dimc];
        pdipm::compute_dual_direction(&slack, &dual, &dslack, &duality, &mut ddual);
        data.dslack.as_view_mut().copy_from_slice(&dslack);
        data.ddual.as_view_mut().copy_from_slice(&ddual);
    }

    /// `(residual L1 + duality L1, residual squared + duality squared)`.
    pub fn residual_norms(&self, data: &ConstraintComponentData) -> (f64, f64) {
        let residual = data.residual.as_view();
        let duality = data.duality.as_view();
        let mut l1 = 0.0;
        let mut sq = 0.0;
        for i in 0..residual.len() {
            l1 += residual[i].abs() + duality[i].abs();
            sq += residual[i] * residual[i] + duality[i] * duality[i];
        }
        (l1, sq)
    }
}
