//! Recovers the stage's `(da, df, dmu)` Newton step from the Riccati gain
//! and the already-known `(dq, dv)`, then propagates `(dq, dv)` to the next
//! stage. `A_t = [[Fqq, Fqv], [0, I]]`, `B_t = [[0], [dtau*I]]`,
//! `b_t = -[Fq; Fv]` are exactly the matrices
//! [`backward_riccati_recursion`](crate::riccati::backward_pass::backward_riccati_recursion)
//! builds to propagate `(P_t, s_t)`; this is the dual half of that same
//! linearization, read forward instead of backward.

use nalgebra::{DVector, DVectorView};

use crate::kkt::KktMatrix;
use crate::kkt::KktResidual;
use crate::riccati::{RiccatiFactorization, RiccatiGain};
use crate::solution::SplitDirection;

/// Writes `da, df, dmu, dlmd, dgmm` into `d` (whose `dq, dv` the caller must
/// have already set) and returns `(dq_next, dv_next)` for the next stage.
/// `p` is this stage's own propagated factorization (not `p_next`): the
/// costate direction is the value function's own gradient,
/// `dlmd = Pqq*dq + Pqv*dv + sq`, `dgmm = Pqv^T*dq + Pvv*dv + sv`, since
/// `(P_t, s_t)` parameterize `V_t(dq, dv) = 0.5*(dq,dv)^T P_t (dq,dv) +
/// s_t^T (dq,dv)` at this stage's own linearization point. No forward-pass
/// source survives in the corpus to confirm this literally; it is the
/// standard Riccati/DDP costate-recovery identity applied to the `(P_t,
/// s_t)` this port already builds.
pub fn forward_step(
    dtau: f64,
    matrix: &KktMatrix,
    residual: &KktResidual,
    gain: &RiccatiGain,
    p: &RiccatiFactorization,
    dq: DVectorView<'_, f64>,
    dv: DVectorView<'_, f64>,
    d: &mut SplitDirection,
) -> (DVector<f64>, DVector<f64>) {
    let nv = dq.len();
    let dimf = gain.kf.len();
    let dq = dq.clone_owned();
    let dv = dv.clone_owned();

    let mut da = gain.ka.as_view().clone_owned();
    da += gain.kaq.view().clone_owned() * &dq;
    da += gain.kav.view().clone_owned() * &dv;
    d.da.as_view_mut().copy_from(&da);

    if dimf > 0 {
        let mut df = gain.kf.as_view().clone_owned();
        df += gain.kfq.view().clone_owned() * &dq;
        df += gain.kfv.view().clone_owned() * &dv;
        d.df.as_view_mut().copy_from(&df);
    }

    let nc = gain.kmu.len();
    if nc > 0 {
        let mut dmu = gain.kmu.as_view().clone_owned();
        dmu += gain.kmuq.view().clone_owned() * &dq;
        dmu += gain.kmuv.view().clone_owned() * &dv;
        d.dmu.as_view_mut().copy_from(&dmu);
    }

    let (dlmd, dgmm) = recover_costate_direction(p, dq.rows(0, nv), dv.rows(0, nv));
    d.dlmd.as_view_mut().copy_from(&dlmd);
    d.dgmm.as_view_mut().copy_from(&dgmm);

    let fqq = matrix.fqq.view().clone_owned();
    let fqv = matrix.fqv.view().clone_owned();
    let fq = residual.fq.as_view();
    let fv = residual.fv.as_view();

    let mut dq_next = DVector::zeros(nv);
    dq_next += &fqq * &dq;
    dq_next += &fqv * &dv;
    dq_next -= fq;

    let mut dv_next = dv.clone();
    dv_next += dtau * &da;
    dv_next -= fv;

    (dq_next, dv_next)
}

/// `dlmd = Pqq*dq + Pqv*dv + sq`, `dgmm = Pqv^T*dq + Pvv*dv + sv`, shared by
/// [`forward_step`] (interior stages) and the terminal stage, which has no
/// `(a, f, mu)` block of its own but still needs its costate direction
/// recovered from `(P_N, s_N)`.
pub fn recover_costate_direction(p: &RiccatiFactorization, dq: DVectorView<'_, f64>, dv: DVectorView<'_, f64>) -> (DVector<f64>, DVector<f64>) {
    let nv = dq.len();
    let p_mat = p.p();
    let s_vec = p.s();
    let pqq = p_mat.view((0, 0), (nv, nv));
    let pqv = p_mat.view((0, nv), (nv, nv));
    let pvv = p_mat.view((nv, nv), (nv, nv));
    let sq = s_vec.rows(0, nv);
    let sv = s_vec.rows(nv, nv);

    let mut dlmd = sq.clone_owned();
    dlmd += pqq.clone_owned() * &dq;
    dlmd += pqv.clone_owned() * &dv;

    let mut dgmm = sv.clone_owned();
    dgmm += pqv.transpose() * &dq;
    dgmm += pvv.clone_owned() * &dv;

    (dlmd, dgmm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riccati::RiccatiGain;
    use nalgebra::DMatrix;

    #[test]
    fn forward_step_reduces_to_affine_map_without_contacts() {
        let nv = 2;
        let mut matrix = KktMatrix::new(nv, 0, 0);
        let mut residual = KktResidual::new(nv, 0, 0);
        matrix.fqq.view_mut().copy_from(&DMatrix::identity(nv, nv));
        matrix.fqv.view_mut().copy_from(&(DMatrix::<f64>::identity(nv, nv) * 0.1));

        let mut gain = RiccatiGain::new(nv, 0, 0);
        gain.kaq.view_mut().copy_from(&DMatrix::<f64>::zeros(nv, nv));
        gain.kav.view_mut().copy_from(&DMatrix::<f64>::zeros(nv, nv));

        let mut terminal_matrix = KktMatrix::new(nv, 0, 0);
        let mut terminal_residual = KktResidual::new(nv, 0, 0);
        terminal_matrix.qqq.view_mut().copy_from(&DMatrix::identity(nv, nv));
        terminal_matrix.qvv.view_mut().copy_from(&(DMatrix::<f64>::identity(nv, nv) * 2.0));
        let mut p = RiccatiFactorization::new(nv);
        p.set_terminal(&terminal_matrix, &terminal_residual);

        let dq = DVector::from_vec(vec![1.0, 0.0]);
        let dv = DVector::from_vec(vec![0.0, 1.0]);
        let mut d = SplitDirection::new(nv, nv, 0, 0);

        let (dq_next, dv_next) = forward_step(0.1, &matrix, &residual, &gain, &p, dq.rows(0, nv), dv.rows(0, nv), &mut d);

        assert!((dq_next[0] - 1.0).abs() < 1e-12);
        assert!((dq_next[1] - 0.1).abs() < 1e-12);
        assert!((dv_next[0] - 0.0).abs() < 1e-12);
        assert!((dv_next[1] - 1.0).abs() < 1e-12);

        assert!((d.dlmd.as_view()[0] - 1.0).abs() < 1e-12);
        assert!((d.dgmm.as_view()[1] - 2.0).abs() < 1e-12);
    }
}
