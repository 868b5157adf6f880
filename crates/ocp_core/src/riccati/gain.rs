//! Feedback/feedforward gain recovery from the saddle inverse.
//! Grounded on the `Kaq`/`Kav`/`Kfq`/`Kfv`/`Kmuq`/`Kmuv`/`ka`/`kf`/`kmu`
//! naming and block layout asserted against directly in
//! `original_source/test/ocp/riccati_recursion_test.cpp`.

use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};

use crate::contact_status::ContactStatus;
use crate::kkt::Block;
use crate::solution::Segment;

/// `[Ka; Kf; Kmu] = -Ginv * [Qafqv; Cqv]`, `[ka; kf; kmu] = -Ginv * [la,lf; C]`.
#[derive(Debug, Clone)]
pub struct RiccatiGain {
    pub kaq: Block,
    pub kav: Block,
    pub kfq: Block,
    pub kfv: Block,
    pub kmuq: Block,
    pub kmuv: Block,
    pub ka: Segment,
    pub kf: Segment,
    pub kmu: Segment,
}

impl RiccatiGain {
    pub fn new(nv: usize, max_dimf: usize, dim_passive: usize) -> Self {
        let max_nc = dim_passive + max_dimf;
        Self {
            kaq: Block::new(nv, nv),
            kav: Block::new(nv, nv),
            kfq: Block::new(max_dimf, nv),
            kfv: Block::new(max_dimf, nv),
            kmuq: Block::new(max_nc, nv),
            kmuv: Block::new(max_nc, nv),
            ka: Segment::new(nv),
            kf: Segment::new(max_dimf),
            kmu: Segment::new(max_nc),
        }
    }

    pub fn set_contact_status(&mut self, nv: usize, dim_passive: usize, cs: &ContactStatus) {
        let dimf = cs.dimf();
        let nc = dim_passive + dimf;
        self.kfq.resize(dimf, nv);
        self.kfv.resize(dimf, nv);
        self.kmuq.resize(nc, nv);
        self.kmuv.resize(nc, nv);
        self.kf.resize(dimf);
        self.kmu.resize(nc);
    }

    /// `ginv` is the `(naf+nc) x (naf+nc)` saddle inverse from
    /// [`crate::riccati::RiccatiMatrixInverter`]; `qafqv` is `(naf) x (2nv)`
    /// (rows over `(a,f)`, cols over `(q,v)`); `cqv` is `(nc) x (2nv)`.
    pub fn compute_feedback_gain(&mut self, ginv: DMatrixView<'_, f64>, qafqv: DMatrixView<'_, f64>, cqv: DMatrixView<'_, f64>) {
        let nv = self.kaq.view().ncols();
        let dimf = self.kfq.view().nrows();
        let naf = nv + dimf;
        let nc = cqv.nrows();

        let mut stacked = DMatrix::zeros(naf + nc, 2 * nv);
        stacked.view_mut((0, 0), (naf, 2 * nv)).copy_from(&qafqv);
        stacked.view_mut((naf, 0), (nc, 2 * nv)).copy_from(&cqv);

        let k_all = -(ginv.clone_owned() * &stacked);

        self.kaq.view_mut().copy_from(&k_all.view((0, 0), (nv, nv)));
        self.kav.view_mut().copy_from(&k_all.view((0, nv), (nv, nv)));
        if dimf > 0 {
            self.kfq.view_mut().copy_from(&k_all.view((nv, 0), (dimf, nv)));
            self.kfv.view_mut().copy_from(&k_all.view((nv, nv), (dimf, nv)));
        }
        if nc > 0 {
            self.kmuq.view_mut().copy_from(&k_all.view((naf, 0), (nc, nv)));
            self.kmuv.view_mut().copy_from(&k_all.view((naf, nv), (nc, nv)));
        }
    }

    /// `laf` stacks `[la; lf]` (`naf`); `c` is the equality residual (`nc`).
    pub fn compute_feedforward(&mut self, ginv: DMatrixView<'_, f64>, laf: DVectorView<'_, f64>, c: DVectorView<'_, f64>) {
        let nv = self.ka.len();
        let dimf = self.kf.len();
        let naf = nv + dimf;
        let nc = c.len();

        let mut stacked = DVector::zeros(naf + nc);
        stacked.rows_mut(0, naf).copy_from(&laf);
        stacked.rows_mut(naf, nc).copy_from(&c);

        let k_all = -(ginv.clone_owned() * &stacked);

        self.ka.as_view_mut().copy_from(&k_all.rows(0, nv));
        if dimf > 0 {
            self.kf.as_view_mut().copy_from(&k_all.rows(nv, dimf));
        }
        if nc > 0 {
            self.kmu.as_view_mut().copy_from(&k_all.rows(naf, nc));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_gain_matches_direct_solve_without_contacts() {
        let nv = 2;
        let mut gain = RiccatiGain::new(nv, 0, 0);
        let ginv = DMatrix::<f64>::identity(nv, nv) * 0.5;
        let qafqv = DMatrix::from_row_slice(nv, 2 * nv, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let cqv = DMatrix::<f64>::zeros(0, 2 * nv);
        gain.compute_feedback_gain(ginv.view((0, 0), (nv, nv)), qafqv.view((0, 0), (nv, 2 * nv)), cqv.view((0, 0), (0, 2 * nv)));
        let expected_kaq = -0.5 * qafqv.view((0, 0), (nv, nv));
        assert!((gain.kaq.view().clone_owned() - expected_kaq).abs().max() < 1e-12);
    }

    #[test]
    fn feedforward_negates_scaled_stack() {
        let nv = 2;
        let mut gain = RiccatiGain::new(nv, 0, 0);
        let ginv = DMatrix::<f64>::identity(nv, nv);
        let laf = DVector::from_vec(vec![1.0, -2.0]);
        let c = DVector::<f64>::zeros(0);
        gain.compute_feedforward(ginv.view((0, 0), (nv, nv)), laf.rows(0, nv), c.rows(0, 0));
        assert!((gain.ka.as_view()[0] - (-1.0)).abs() < 1e-12);
        assert!((gain.ka.as_view()[1] - 2.0).abs() < 1e-12);
    }
}
