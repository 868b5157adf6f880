//! Stage and terminal cost.
//!
//! A [`CostFunction`] is a sum of [`CostComponent`]s. Each component adds
//! its contribution into the caller's [`KktResidual`]/[`KktMatrix`] blocks;
//! none of them may zero an existing entry first, so assembly order across
//! components never matters. Grounded on
//! `original_source/include/idocp/cost/contact_cost.hpp`'s quadratic
//! `l(dtau, f) = 0.5 * dtau * (f - f_ref)^T W (f - f_ref)` shape, generalized
//! here to every stage block.

use nalgebra::DVector;

use crate::contact_status::ContactStatus;
use crate::kkt::{KktMatrix, KktResidual};
use crate::robot_model::RobotModel;
use crate::solution::SplitSolution;

/// Diagonal quadratic weights and references for one stage block, e.g.
/// `0.5 * dtau * (x - x_ref)^T diag(weight) (x - x_ref)`. `weight` and
/// `reference` are allocated at this block's maximum dimension (`max_dimf`
/// for the contact-force term); every loop below is bounded by `out`/`x`'s
/// *active* length, never by `weight.len()`, so a partially activated
/// contact set only narrows the destination block, not this term's own
/// storage.
#[derive(Debug, Clone)]
pub struct QuadraticTerm {
    pub weight: DVector<f64>,
    pub reference: DVector<f64>,
}

impl QuadraticTerm {
    pub fn new(weight: DVector<f64>, reference: DVector<f64>) -> Self {
        debug_assert_eq!(weight.len(), reference.len());
        Self { weight, reference }
    }

    pub fn zero(dim: usize) -> Self {
        Self {
            weight: DVector::zeros(dim),
            reference: DVector::zeros(dim),
        }
    }

    fn value(&self, dtau: f64, x: &nalgebra::DVectorView<'_, f64>) -> f64 {
        let mut acc = 0.0;
        for i in 0..x.len() {
            let d = x[i] - self.reference[i];
            acc += self.weight[i] * d * d;
        }
        0.5 * dtau * acc
    }

    fn add_gradient(&self, dtau: f64, x: &nalgebra::DVectorView<'_, f64>, mut out: nalgebra::DVectorViewMut<'_, f64>) {
        let n = out.len();
        for i in 0..n {
            out[i] += dtau * self.weight[i] * (x[i] - self.reference[i]);
        }
    }

    fn add_hessian(&self, dtau: f64, mut out: nalgebra::DMatrixViewMut<'_, f64>) {
        let n = out.nrows();
        for i in 0..n {
            out[(i, i)] += dtau * self.weight[i];
        }
    }
}

/// The configuration-space term. Unlike every other [`QuadraticTerm`] this
/// one is not Euclidean: `reference` is a full configuration (`dimq`, one
/// longer than `weight`'s `dimv` for a floating base's quaternion), and the
/// residual is the manifold difference
/// [`RobotModel::subtract_configuration`] rather than `q - reference`, so
/// its gradient and Hessian route through the model's `d_subtract_dq_a`
/// Jacobian instead of being read off `weight` directly. The Hessian is the
/// Gauss-Newton approximation `J^T diag(weight) J`, dropping the curvature
/// term of the (twice-differentiable but here not re-differentiated)
/// subtraction map.
#[derive(Debug, Clone)]
pub struct ConfigurationCostTerm {
    pub weight: DVector<f64>,
    pub reference: DVector<f64>,
}

impl ConfigurationCostTerm {
    pub fn new(weight: DVector<f64>, reference: DVector<f64>) -> Self {
        Self { weight, reference }
    }

    fn residual<R: RobotModel>(&self, robot: &R, q: &nalgebra::DVectorView<'_, f64>) -> DVector<f64> {
        robot.subtract_configuration(&q.clone_owned(), &self.reference)
    }

    fn value<R: RobotModel>(&self, dtau: f64, robot: &R, q: &nalgebra::DVectorView<'_, f64>) -> f64 {
        let r = self.residual(robot, q);
        let mut acc = 0.0;
        for i in 0..r.len() {
            acc += self.weight[i] * r[i] * r[i];
        }
        0.5 * dtau * acc
    }

    fn add_gradient<R: RobotModel>(
        &self,
        dtau: f64,
        robot: &R,
        q: &nalgebra::DVectorView<'_, f64>,
        mut out: nalgebra::DVectorViewMut<'_, f64>,
    ) {
        let r = self.residual(robot, q);
        let jac = robot.d_subtract_dq_a(&q.clone_owned(), &self.reference);
        let n = out.len();
        for a in 0..n {
            let mut g = 0.0;
            for i in 0..n {
                g += jac[(i, a)] * self.weight[i] * r[i];
            }
            out[a] += dtau * g;
        }
    }

    fn add_hessian<R: RobotModel>(
        &self,
        dtau: f64,
        robot: &R,
        q: &nalgebra::DVectorView<'_, f64>,
        mut out: nalgebra::DMatrixViewMut<'_, f64>,
    ) {
        let jac = robot.d_subtract_dq_a(&q.clone_owned(), &self.reference);
        let n = out.nrows();
        for row in 0..n {
            for col in 0..n {
                let mut h = 0.0;
                for i in 0..n {
                    h += jac[(i, row)] * self.weight[i] * jac[(i, col)];
                }
                out[(row, col)] += dtau * h;
            }
        }
    }
}

/// The weighted-quadratic cost over `(q, v, a, u, f)`. Terminal weights
/// apply to `(q, v)` only. `q`/`q_terminal` live in the tangent space
/// (`dimv`), not the configuration space (`dimq`), since their gradient and
/// Hessian are read out of `residual.lq`/`matrix.qqq`, which are themselves
/// tangent-space blocks.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    pub q: ConfigurationCostTerm,
    pub v: QuadraticTerm,
    pub a: QuadraticTerm,
    pub u: QuadraticTerm,
    pub f: QuadraticTerm,
    pub q_terminal: ConfigurationCostTerm,
    pub v_terminal: QuadraticTerm,
}

impl QuadraticCost {
    /// Builds a cost with zero references and the given scalar weights
    /// broadcast over `q`/`v`/`a`/`u`. `f` starts at zero weight
    /// until [`set_f_weight`](Self::set_f_weight) or
    /// [`set_contact_status`](Self::set_contact_status) is called.
    pub fn uniform(nq: usize, nv: usize, max_dimf: usize, q: f64, v: f64, a: f64, u: f64) -> Self {
        Self {
            q: ConfigurationCostTerm::new(DVector::from_element(nv, q), DVector::zeros(nq)),
            v: QuadraticTerm::new(DVector::from_element(nv, v), DVector::zeros(nv)),
            a: QuadraticTerm::new(DVector::from_element(nv, a), DVector::zeros(nv)),
            u: QuadraticTerm::new(DVector::from_element(nv, u), DVector::zeros(nv)),
            f: QuadraticTerm::zero(max_dimf),
            q_terminal: ConfigurationCostTerm::new(DVector::from_element(nv, q), DVector::zeros(nq)),
            v_terminal: QuadraticTerm::new(DVector::from_element(nv, v), DVector::zeros(nv)),
        }
    }

    pub fn set_f_weight(&mut self, weight: DVector<f64>) {
        self.f = QuadraticTerm::new(weight, DVector::zeros(self.f.weight.len()));
    }

    /// Truncates the contact-force term's active length to the currently
    /// active contacts, mirroring `ContactCost::setContactStatus`. Since
    /// [`QuadraticTerm::add_gradient`]/[`add_hessian`](QuadraticTerm::add_hessian)
    /// are already bounded by the destination block's active length rather
    /// than `weight.len()`, this call is not required for correctness — it
    /// only keeps `f.weight`/`f.reference` from reporting stale trailing
    /// entries to a caller that reads them directly (e.g. [`set_f_weight`](Self::set_f_weight)).
    pub fn set_contact_status(&mut self, cs: &ContactStatus) {
        let dimf = cs.dimf();
        self.f.weight = self.f.weight.rows(0, dimf).into_owned();
        self.f.reference = self.f.reference.rows(0, dimf).into_owned();
    }

    /// Stage cost value `l(dtau, s)`.
    pub fn l<R: RobotModel>(&self, dtau: f64, robot: &R, s: &SplitSolution) -> f64 {
        self.q.value(dtau, robot, &s.q.as_view())
            + self.v.value(dtau, &s.v.as_view())
            + self.a.value(dtau, &s.a.as_view())
            + self.u.value(dtau, &s.u.as_view())
            + self.f.value(dtau, &s.f.as_view())
    }

    /// Terminal cost value `phi(q, v)`.
    pub fn phi<R: RobotModel>(&self, robot: &R, q: &nalgebra::DVectorView<'_, f64>, v: &nalgebra::DVectorView<'_, f64>) -> f64 {
        self.q_terminal.value(1.0, robot, q) + self.v_terminal.value(1.0, v)
    }

    /// Adds `lq, lv, la, lu, lf` into `residual`. `residual.lu`
    /// receives the contribution before torque condensation in
    /// [`RobotDynamics`](crate::robot_dynamics::RobotDynamics); this method
    /// does not condense anything itself.
    pub fn add_gradient<R: RobotModel>(&self, dtau: f64, robot: &R, s: &SplitSolution, residual: &mut KktResidual) {
        self.q.add_gradient(dtau, robot, &s.q.as_view(), residual.lq.as_view_mut());
        self.v.add_gradient(dtau, &s.v.as_view(), residual.lv.as_view_mut());
        self.a.add_gradient(dtau, &s.a.as_view(), residual.la.as_view_mut());
        self.u.add_gradient(dtau, &s.u.as_view(), residual.lu.as_view_mut());
        self.f.add_gradient(dtau, &s.f.as_view(), residual.lf.as_view_mut());
    }

    /// Adds `phiq, phiv` into the terminal residual segments.
    pub fn add_terminal_gradient<R: RobotModel>(
        &self,
        robot: &R,
        q: &nalgebra::DVectorView<'_, f64>,
        v: &nalgebra::DVectorView<'_, f64>,
        lq_out: nalgebra::DVectorViewMut<'_, f64>,
        lv_out: nalgebra::DVectorViewMut<'_, f64>,
    ) {
        self.q_terminal.add_gradient(1.0, robot, q, lq_out);
        self.v_terminal.add_gradient(1.0, v, lv_out);
    }

    /// Adds `lqq, lvv, laa, luu, lff` into `matrix`. Diagonal
    /// weights give diagonal Hessian blocks for the Euclidean terms; the
    /// configuration term is the exception, since its Jacobian makes
    /// `q.add_hessian` accumulate into the full `qqq` block instead, which
    /// is why `Block::view_mut` (not a diagonal-only setter) is the
    /// contract here.
    pub fn add_hessian<R: RobotModel>(&self, dtau: f64, robot: &R, q: &nalgebra::DVectorView<'_, f64>, matrix: &mut KktMatrix) {
        self.q.add_hessian(dtau, robot, q, matrix.qqq.view_mut());
        self.v.add_hessian(dtau, matrix.qvv.view_mut());
        self.a.add_hessian(dtau, matrix.qaa.view_mut());
        self.f.add_hessian(dtau, matrix.qff.view_mut());
    }

    /// `luu` is not stored on [`KktMatrix`] directly: it is condensed out
    /// alongside `u` by [`RobotDynamics`](crate::robot_dynamics::RobotDynamics),
    /// which calls this to get the diagonal weight it needs.
    pub fn u_weight(&self) -> &DVector<f64> {
        &self.u.weight
    }

    pub fn add_terminal_hessian<R: RobotModel>(
        &self,
        robot: &R,
        q: &nalgebra::DVectorView<'_, f64>,
        qqq_out: nalgebra::DMatrixViewMut<'_, f64>,
        qvv_out: nalgebra::DMatrixViewMut<'_, f64>,
    ) {
        self.q_terminal.add_hessian(1.0, robot, q, qqq_out);
        self.v_terminal.add_hessian(1.0, qvv_out);
    }
}
