//! The single-stage backward Riccati step. No backward-pass source file
//! survives in the corpus (only the inverter/gain unit test does); the
//! propagation formulas below are the stage-wise LQR value-function
//! recursion, built on top of the `RiccatiMatrixInverter`/`RiccatiGain`
//! pair the corpus does ground.

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::kkt::{KktMatrix, KktResidual};
use crate::riccati::factorization::RiccatiFactorization;
use crate::riccati::gain::RiccatiGain;
use crate::riccati::inverter::RiccatiMatrixInverter;

/// Assembles `G`/`Caf` from `matrix`, inverts the saddle block, recovers
/// the feedback/feedforward gain, and propagates `(P_t, s_t)` from
/// `(P_{t+1}, s_{t+1})`. `dimf`/`dim_passive` give the active contact and
/// passive-DoF dimensions for this stage; `dtau` is the stage's own
/// duration (may vary per stage).
#[allow(clippy::too_many_arguments)]
pub fn backward_riccati_recursion(
    nv: usize,
    dim_passive: usize,
    dimf: usize,
    dtau: f64,
    matrix: &KktMatrix,
    residual: &KktResidual,
    p_next: &RiccatiFactorization,
    inverter: &mut RiccatiMatrixInverter,
    gain: &mut RiccatiGain,
    p: &mut RiccatiFactorization,
    epsilon: f64,
    stage: usize,
) -> Result<()> {
    let naf = nv + dimf;
    let nc = dim_passive + dimf;
    let _ = dtau; // B_t/b_t fold dtau in through Fqv/Fv already; kept for the forward pass's own use of B_t

    let mut g = DMatrix::zeros(naf, naf);
    g.view_mut((0, 0), (nv, nv)).copy_from(&matrix.qaa.view());
    if dimf > 0 {
        g.view_mut((0, nv), (nv, dimf)).copy_from(&matrix.qaf.view());
        g.view_mut((nv, 0), (dimf, nv)).copy_from(&matrix.qaf.view().transpose());
        g.view_mut((nv, nv), (dimf, dimf)).copy_from(&matrix.qff.view());
    }

    let mut caf = DMatrix::zeros(nc, naf);
    caf.view_mut((0, 0), (nc, nv)).copy_from(&matrix.ca.view());
    if dimf > 0 {
        caf.view_mut((0, nv), (nc, dimf)).copy_from(&matrix.cf.view());
    }

    inverter.invert(&g, &caf.view((0, 0), (nc, naf)), dimf, epsilon, stage)?;

    let mut qafqv = DMatrix::zeros(naf, 2 * nv);
    qafqv.view_mut((0, 0), (nv, nv)).copy_from(&matrix.qqa.view().transpose());
    qafqv.view_mut((0, nv), (nv, nv)).copy_from(&matrix.qva.view().transpose());
    if dimf > 0 {
        qafqv.view_mut((nv, 0), (dimf, nv)).copy_from(&matrix.qqf.view().transpose());
        qafqv.view_mut((nv, nv), (dimf, nv)).copy_from(&matrix.qvf.view().transpose());
    }

    let mut cqv = DMatrix::zeros(nc, 2 * nv);
    cqv.view_mut((0, 0), (nc, nv)).copy_from(&matrix.cq.view());
    cqv.view_mut((0, nv), (nc, nv)).copy_from(&matrix.cv.view());

    gain.compute_feedback_gain(inverter.ginv(), qafqv.view((0, 0), (naf, 2 * nv)), cqv.view((0, 0), (nc, 2 * nv)));

    let mut laf = DVector::zeros(naf);
    laf.rows_mut(0, nv).copy_from(&residual.la.as_view());
    if dimf > 0 {
        laf.rows_mut(nv, dimf).copy_from(&residual.lf.as_view());
    }
    let c = residual.c.as_view().clone_owned();
    gain.compute_feedforward(inverter.ginv(), laf.rows(0, naf), c.rows(0, nc));

    // A_t = [[Fqq, Fqv], [0, I]], B_t = [[0], [dtau*I]], b_t = -[Fq; Fv].
    let mut a_t = DMatrix::zeros(2 * nv, 2 * nv);
    a_t.view_mut((0, 0), (nv, nv)).copy_from(&matrix.fqq.view());
    a_t.view_mut((0, nv), (nv, nv)).copy_from(&matrix.fqv.view());
    a_t.view_mut((nv, nv), (nv, nv)).copy_from(&DMatrix::identity(nv, nv));

    let mut b_t = DVector::zeros(2 * nv);
    b_t.rows_mut(0, nv).copy_from(&(-residual.fq.as_view()));
    b_t.rows_mut(nv, nv).copy_from(&(-residual.fv.as_view()));

    // K_t = [[Kaq, Kav], [Kfq, Kfv]], the (a,f) feedback only (mu excluded).
    let mut k_t = DMatrix::zeros(naf, 2 * nv);
    k_t.view_mut((0, 0), (nv, nv)).copy_from(&gain.kaq.view());
    k_t.view_mut((0, nv), (nv, nv)).copy_from(&gain.kav.view());
    if dimf > 0 {
        k_t.view_mut((nv, 0), (dimf, nv)).copy_from(&gain.kfq.view());
        k_t.view_mut((nv, nv), (dimf, nv)).copy_from(&gain.kfv.view());
    }

    let mut q_t = DMatrix::zeros(2 * nv, 2 * nv);
    q_t.view_mut((0, 0), (nv, nv)).copy_from(&matrix.qqq.view());
    q_t.view_mut((nv, nv), (nv, nv)).copy_from(&matrix.qvv.view());

    let mut q_t_vec = DVector::zeros(2 * nv);
    q_t_vec.rows_mut(0, nv).copy_from(&residual.lq.as_view());
    q_t_vec.rows_mut(nv, nv).copy_from(&residual.lv.as_view());

    let p_next_mat = p_next.p().clone_owned();
    let s_next_vec = p_next.s().clone_owned();

    let p_t = a_t.transpose() * &p_next_mat * &a_t - k_t.transpose() * &g * &k_t + &q_t;
    let s_t = a_t.transpose() * (&s_next_vec - &p_next_mat * &b_t) - k_t.transpose() * &laf + &q_t_vec;

    p.p_mut().view_mut().copy_from(&p_t);
    p.s_mut().as_view_mut().copy_from(&s_t);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_to_terminal_step_reduces_to_unconstrained_lqr() {
        let nv = 2;
        let mut matrix = KktMatrix::new(nv, 0, 0);
        let mut residual = KktResidual::new(nv, 0, 0);
        matrix.qaa.view_mut().copy_from(&DMatrix::identity(nv, nv));
        matrix.fqq.view_mut().copy_from(&DMatrix::identity(nv, nv));
        matrix.fqv.view_mut().copy_from(&(DMatrix::<f64>::identity(nv, nv) * 0.1));

        let mut p_next = RiccatiFactorization::new(nv);
        p_next.set_terminal(&matrix, &residual);

        let mut inverter = RiccatiMatrixInverter::new(nv, 0, 0);
        let mut gain = RiccatiGain::new(nv, 0, 0);
        let mut p = RiccatiFactorization::new(nv);

        backward_riccati_recursion(nv, 0, 0, 0.1, &matrix, &residual, &p_next, &mut inverter, &mut gain, &mut p, 1e-8, 0).unwrap();

        let p_mat = p.p().clone_owned();
        assert!((&p_mat - p_mat.transpose()).abs().max() < 1e-9, "propagated P must stay symmetric");
        assert_eq!(gain.kaq.view().nrows(), nv);
    }
}
